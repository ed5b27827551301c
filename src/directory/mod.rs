//! Directory Module
//!
//! A directory of shards written by one job: shard N lives in `part-N`
//! (zero padded), so the lexicographic order of file names is the partition
//! ordinal order.
//!
//! ## Responsibilities
//! - Name shard files so sorting by name equals sorting by ordinal
//! - List shards in canonical order, skipping bookkeeping files
//! - Open one reader per shard and route each lookup to exactly one shard
//! - Route records to shard writers at write time with the same policy

mod coordinator;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use coordinator::{lookup, lookup_with, open_all, ShardSet};
pub use writer::DirectoryWriter;

/// Prefix of every shard file name
pub const SHARD_FILE_PREFIX: &str = "part-";

/// Most shards a directory may hold; ordinals stay within the five digits
/// `shard_file_name` pads to, so name order stays ordinal order
pub const MAX_SHARDS: usize = 100_000;

/// Marker written once every shard of a directory is sealed
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// File name of shard `ordinal`: `part-00000`, `part-00001`, ...
pub fn shard_file_name(ordinal: usize) -> String {
    format!("{}{:05}", SHARD_FILE_PREFIX, ordinal)
}

/// Hidden and bookkeeping entries (`_SUCCESS`, `.part-00000.inprogress`)
fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// Shard files of `dir` in canonical (lexicographic) order
///
/// Subdirectories and names starting with `_` or `.` are skipped.
pub fn list_shards(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if is_hidden(&name.to_string_lossy()) {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
