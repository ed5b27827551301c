//! Shard Module
//!
//! One sealed, sorted, indexed key-value file per partition.
//!
//! ## File Format (version 1)
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (10 + N bytes)                                        │
//! │   Magic: "MSHD" (4) | Version: u16 (2) | MetaLen: u32 (4)    │
//! │   Metadata (N, bincode): key schema, value schema, codec     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Block (repeated)                                             │
//! │   RawLen: u32 | StoredLen: u32 | CRC32(stored): u32          │
//! │   Payload (StoredLen, optionally compressed):                │
//! │     [KeyLen: u32][ValLen: u32][Key][Value] ... per record    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Index Block (one entry per data block, ascending keys)       │
//! │   [KeyLen: u32][Offset: u64][BlockLen: u32][FirstKey]        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Footer (32 bytes)                                            │
//! │   IndexOffset: u64 | IndexLen: u64 | RecordCount: u64        │
//! │   IndexCRC: u32 | Magic: "MSHD" (4)                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian.

mod block;
mod iterator;
mod reader;
mod writer;

use std::fs::File;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Compression;
use crate::schema::{Schema, Value};

pub use iterator::ShardIterator;
pub use reader::ShardReader;
pub use writer::ShardWriter;

// =============================================================================
// Shared Constants (used by writer, reader, iterator)
// =============================================================================

/// Magic bytes identifying a shard file (header and footer)
pub(crate) const MAGIC: &[u8; 4] = b"MSHD";

/// Current shard format version
pub const FORMAT_VERSION: u16 = 1;

/// Header prefix: Magic (4) + Version (2) + MetaLen (4) = 10 bytes
pub(crate) const HEADER_PREFIX_SIZE: u64 = 10;

/// Footer size: IndexOffset (8) + IndexLen (8) + RecordCount (8) + CRC (4) + Magic (4)
pub(crate) const FOOTER_SIZE: u64 = 32;

/// Block header: RawLen (4) + StoredLen (4) + CRC (4)
pub(crate) const BLOCK_HEADER_SIZE: usize = 12;

/// Index entry fixed part: KeyLen (4) + Offset (8) + BlockLen (4)
pub(crate) const INDEX_ENTRY_FIXED_SIZE: usize = 16;

/// Record header: KeyLen (4) + ValLen (4)
pub(crate) const RECORD_HEADER_SIZE: usize = 8;

// =============================================================================
// Header / Footer
// =============================================================================

/// Metadata stored in the shard header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ShardHeader {
    pub key_schema: Schema,
    pub value_schema: Schema,
    pub compression: Compression,
}

/// Fixed-size trailer locating the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub index_offset: u64,
    pub index_len: u64,
    pub record_count: u64,
    pub index_crc: u32,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE as usize] {
        let mut out = [0u8; FOOTER_SIZE as usize];
        out[0..8].copy_from_slice(&self.index_offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.index_len.to_le_bytes());
        out[16..24].copy_from_slice(&self.record_count.to_le_bytes());
        out[24..28].copy_from_slice(&self.index_crc.to_le_bytes());
        out[28..32].copy_from_slice(MAGIC);
        out
    }

    /// Parse a footer; `None` if the trailing magic is missing
    pub fn decode(raw: &[u8; FOOTER_SIZE as usize]) -> Option<Self> {
        if &raw[28..32] != MAGIC {
            return None;
        }
        Some(Self {
            index_offset: read_u64(&raw[0..8]),
            index_len: read_u64(&raw[8..16]),
            record_count: read_u64(&raw[16..24]),
            index_crc: read_u32(&raw[24..28]),
        })
    }
}

/// Index entry as written: first key of a block and where the block lives
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub key: Vec<u8>,
    pub offset: u64,
    pub len: u32,
}

// =============================================================================
// Shard Metadata
// =============================================================================

/// Summary of a sealed shard, returned by `ShardWriter::close`
#[derive(Debug, Clone)]
pub struct ShardMeta {
    /// Final path of the shard file
    pub path: PathBuf,
    /// Number of records written
    pub record_count: u64,
    /// Number of data blocks (and index entries)
    pub block_count: u64,
    /// File size in bytes
    pub file_size: u64,
    /// Smallest key, `None` for an empty shard
    pub first_key: Option<Value>,
    /// Largest key, `None` for an empty shard
    pub last_key: Option<Value>,
}

// =============================================================================
// Byte helpers
// =============================================================================

/// Callers always pass exactly 4 bytes
pub(crate) fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

/// Callers always pass exactly 8 bytes
pub(crate) fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}

/// Positioned read; does not touch the file cursor, so concurrent callers
/// sharing one handle cannot interleave.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
