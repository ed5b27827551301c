//! Directory Coordinator
//!
//! Opens every shard of a directory in canonical order and resolves a key
//! to the one shard the partitioner selects.
//!
//! A miss in the selected shard is authoritative: other shards are never
//! consulted. `ShardSet::scan_lookup` is the explicit opt-in for directories
//! whose routing cannot be trusted.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec;
use crate::config::Config;
use crate::error::{Result, ShardError};
use crate::partition::{HashPartitioner, Partitioner};
use crate::schema::{Datum, Schema, Value};
use crate::shard::ShardReader;

use super::list_shards;

// =============================================================================
// Free functions
// =============================================================================

/// Open one reader per shard of `dir`, ordered by shard file name
///
/// Listing failures surface as I/O errors; a shard that fails to open is
/// reported wrapped in `ShardError::Shard` naming its path. All shards must
/// share the same key schema.
pub fn open_all(dir: &Path, config: &Config) -> Result<Vec<ShardReader>> {
    let paths = list_shards(dir)?;

    let results: Vec<Result<ShardReader>> = if config.parallel_open && paths.len() > 1 {
        open_parallel(&paths, config)?
    } else {
        paths
            .iter()
            .map(|path| ShardReader::open(path, config))
            .collect()
    };

    // Results are in path order regardless of which open finished first
    let mut readers = Vec::with_capacity(results.len());
    for (path, result) in paths.iter().zip(results) {
        let reader = result.map_err(|e| ShardError::in_shard(path, e))?;
        if let Some(first) = readers.first() {
            check_key_schema(first, &reader)?;
        }
        readers.push(reader);
    }

    info!(dir = %dir.display(), shards = readers.len(), "opened shard directory");
    Ok(readers)
}

fn open_parallel(paths: &[PathBuf], config: &Config) -> Result<Vec<Result<ShardReader>>> {
    crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move |_| ShardReader::open(path, config)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|_| Err(open_panicked())))
            .collect()
    })
    .map_err(|_| open_panicked())
}

fn open_panicked() -> ShardError {
    ShardError::Io(io::Error::new(
        io::ErrorKind::Other,
        "shard open thread panicked",
    ))
}

fn check_key_schema(first: &ShardReader, reader: &ShardReader) -> Result<()> {
    if first.key_schema() != reader.key_schema() {
        return Err(ShardError::in_shard(
            reader.path(),
            ShardError::SchemaMismatch(format!(
                "key schema {} differs from {} in {}",
                reader.key_schema(),
                first.key_schema(),
                first.path().display()
            )),
        ));
    }
    Ok(())
}

/// Look up `key` with the default hash partitioner
pub fn lookup(readers: &[ShardReader], key: &Value) -> Result<Option<Value>> {
    lookup_with(readers, key, &HashPartitioner)
}

/// Look up `key` in the single shard `partitioner` selects
///
/// Use the partitioner the directory was written with. No readers means
/// absent.
pub fn lookup_with<P: Partitioner + ?Sized>(
    readers: &[ShardReader],
    key: &Value,
    partitioner: &P,
) -> Result<Option<Value>> {
    let Some(ordinal) = route(readers, key, partitioner)? else {
        return Ok(None);
    };
    let reader = &readers[ordinal];
    debug!(ordinal, shard = %reader.path().display(), "routed lookup");
    reader
        .lookup(key)
        .map_err(|e| ShardError::in_shard(reader.path(), e))
}

/// Ordinal of the shard holding `key`, `None` when there are no shards
fn route<P: Partitioner + ?Sized>(
    readers: &[ShardReader],
    key: &Value,
    partitioner: &P,
) -> Result<Option<usize>> {
    let Some(first) = readers.first() else {
        return Ok(None);
    };
    let key_bytes = codec::encode(key, first.key_schema())?;
    let shard_count = readers.len();
    let ordinal = partitioner.partition(&key_bytes, shard_count);
    if ordinal >= shard_count {
        return Err(ShardError::Partition {
            ordinal,
            shard_count,
        });
    }
    Ok(Some(ordinal))
}

// =============================================================================
// ShardSet
// =============================================================================

/// The opened shards of one directory
///
/// ## Concurrency:
/// - All methods take `&self`; readers support concurrent lookups
/// - `close` releases every file handle; later lookups fail with
///   `ReaderClosed`
#[derive(Debug)]
pub struct ShardSet {
    dir: PathBuf,
    readers: Vec<ShardReader>,
}

impl ShardSet {
    /// Open every shard in `dir`
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        let readers = open_all(dir, config)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            readers,
        })
    }

    /// Get a value by key using the default partitioner
    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        lookup(&self.readers, key)
    }

    /// Get a value by key using the partitioner the directory was written with
    pub fn get_with<P: Partitioner + ?Sized>(
        &self,
        key: &Value,
        partitioner: &P,
    ) -> Result<Option<Value>> {
        lookup_with(&self.readers, key, partitioner)
    }

    /// Typed variant of `get`
    pub fn get_datum<K: Datum, V: Datum>(&self, key: K) -> Result<Option<V>> {
        self.get(&key.into_value())?.map(V::from_value).transpose()
    }

    /// Ordinal of the shard the default partitioner assigns to `key`
    pub fn shard_for(&self, key: &Value) -> Result<Option<usize>> {
        route(&self.readers, key, &HashPartitioner)
    }

    /// Search every shard in ordinal order, returning the first hit and the
    /// ordinal it was found in
    ///
    /// Explicit opt-in for directories whose write-side routing is unknown;
    /// costs one lookup per shard.
    pub fn scan_lookup(&self, key: &Value) -> Result<Option<(usize, Value)>> {
        let Some(first) = self.readers.first() else {
            return Ok(None);
        };
        codec::encode(key, first.key_schema())?;
        for (ordinal, reader) in self.readers.iter().enumerate() {
            let found = reader
                .lookup(key)
                .map_err(|e| ShardError::in_shard(reader.path(), e))?;
            if let Some(value) = found {
                return Ok(Some((ordinal, value)));
            }
        }
        Ok(None)
    }

    /// Key schema shared by all shards, `None` for an empty directory
    pub fn key_schema(&self) -> Option<&Schema> {
        self.readers.first().map(|r| r.key_schema())
    }

    /// Readers in ordinal order
    pub fn readers(&self) -> &[ShardReader] {
        &self.readers
    }

    /// Get the number of shards
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Get the directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Total records across all shards
    pub fn record_count(&self) -> u64 {
        self.readers.iter().map(|r| r.record_count()).sum()
    }

    /// Release every shard's file handle
    pub fn close(&self) {
        for reader in &self.readers {
            reader.close();
        }
    }
}
