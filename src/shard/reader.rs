//! Shard Reader
//!
//! Opens a sealed shard, loads its sparse index into memory and resolves
//! point lookups with one block read: binary search for the block whose
//! first key is the greatest one ≤ the query, then a linear scan of that
//! block.
//!
//! ## Concurrency
//! `get` takes `&self`. The index is immutable after `open`, and block reads
//! are positioned reads on a shared handle, so any number of threads may
//! look up keys at once. `close` takes the write side of the handle lock.

use std::cmp::Ordering;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::codec;
use crate::config::{Compression, Config};
use crate::error::{Result, ShardError};
use crate::schema::{Datum, Schema, Value};

use super::block::{open_block, RecordCursor};
use super::iterator::ShardIterator;
use super::{
    read_exact_at, read_u32, read_u64, Footer, ShardHeader, FOOTER_SIZE, FORMAT_VERSION,
    HEADER_PREFIX_SIZE, INDEX_ENTRY_FIXED_SIZE, MAGIC,
};

/// One in-memory index entry: the first key of a block and its location
#[derive(Debug, Clone)]
pub(crate) struct BlockHandle {
    pub first_key: Value,
    pub offset: u64,
    pub len: u32,
}

/// Reader for a sealed shard file
pub struct ShardReader {
    path: PathBuf,
    /// File handle, `None` after `close()`
    file: RwLock<Option<File>>,
    header: ShardHeader,
    /// Sparse index, ascending by first key
    index: Vec<BlockHandle>,
    record_count: u64,
    verify_checksums: bool,
    /// Point lookups served (instrumentation)
    lookups: AtomicU64,
}

impl ShardReader {
    /// Open a shard for reading
    ///
    /// Fails with an I/O error on a missing or truncated file and with
    /// `FormatMismatch` on an unknown version or malformed header/index.
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_PREFIX_SIZE + FOOTER_SIZE {
            return Err(truncated(path, file_size));
        }

        // Read and validate header prefix
        let mut prefix = [0u8; HEADER_PREFIX_SIZE as usize];
        read_exact_at(&file, &mut prefix, 0)?;

        if &prefix[0..4] != MAGIC {
            return Err(ShardError::FormatMismatch(format!(
                "{}: invalid magic {:?}",
                path.display(),
                &prefix[0..4]
            )));
        }

        let version = u16::from_le_bytes([prefix[4], prefix[5]]);
        if version != FORMAT_VERSION {
            return Err(ShardError::FormatMismatch(format!(
                "{}: unsupported format version {} (expected {})",
                path.display(),
                version,
                FORMAT_VERSION
            )));
        }

        let meta_len = read_u32(&prefix[6..10]) as u64;
        let data_start = HEADER_PREFIX_SIZE + meta_len;
        if data_start + FOOTER_SIZE > file_size {
            return Err(truncated(path, file_size));
        }
        let mut meta = vec![0u8; meta_len as usize];
        read_exact_at(&file, &mut meta, HEADER_PREFIX_SIZE)?;
        let header: ShardHeader = bincode::deserialize(&meta).map_err(|e| {
            ShardError::FormatMismatch(format!("{}: unreadable header: {}", path.display(), e))
        })?;

        // Footer locates the index
        let mut raw_footer = [0u8; FOOTER_SIZE as usize];
        read_exact_at(&file, &mut raw_footer, file_size - FOOTER_SIZE)?;
        let footer = Footer::decode(&raw_footer).ok_or_else(|| truncated(path, file_size))?;

        let index_end = footer.index_offset.checked_add(footer.index_len);
        if footer.index_offset < data_start || index_end != Some(file_size - FOOTER_SIZE) {
            return Err(ShardError::FormatMismatch(format!(
                "{}: index range {}+{} inconsistent with file size {}",
                path.display(),
                footer.index_offset,
                footer.index_len,
                file_size
            )));
        }

        let mut index_data = vec![0u8; footer.index_len as usize];
        read_exact_at(&file, &mut index_data, footer.index_offset)?;
        if crc32fast::hash(&index_data) != footer.index_crc {
            return Err(ShardError::CorruptRecord(format!(
                "{}: index checksum mismatch",
                path.display()
            )));
        }

        let index = parse_index(
            path,
            &index_data,
            &header.key_schema,
            data_start,
            footer.index_offset,
        )?;

        debug!(
            path = %path.display(),
            records = footer.record_count,
            blocks = index.len(),
            "opened shard"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(Some(file)),
            header,
            index,
            record_count: footer.record_count,
            verify_checksums: config.verify_checksums,
            lookups: AtomicU64::new(0),
        })
    }

    /// Get the value stored under `key`
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key found (first match among duplicates)
    /// - `Ok(None)`: key not in this shard
    /// - `Err(SchemaMismatch)`: key does not fit the shard's key schema
    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        codec::encode(key, &self.header.key_schema)?;
        self.lookup(key)
    }

    /// Typed variant of `get`
    pub fn get_datum<K: Datum, V: Datum>(&self, key: K) -> Result<Option<V>> {
        self.get(&key.into_value())?.map(V::from_value).transpose()
    }

    /// Lookup for a key already validated against the key schema
    pub(crate) fn lookup(&self, key: &Value) -> Result<Option<Value>> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(ShardError::ReaderClosed)?;
        self.lookups.fetch_add(1, AtomicOrdering::Relaxed);

        // Greatest block whose first key ≤ key
        let slot = self.index.partition_point(|handle| handle.first_key <= *key);
        if slot == 0 {
            return Ok(None);
        }
        let data = self.read_block(file, &self.index[slot - 1])?;

        let mut cursor = RecordCursor::new(data);
        while let Some((key_bytes, value_bytes)) = cursor.next_record()? {
            let record_key = codec::decode(&key_bytes, &self.header.key_schema)?;
            match record_key.cmp(key) {
                Ordering::Less => continue,
                Ordering::Equal => {
                    return codec::decode(&value_bytes, &self.header.value_schema).map(Some)
                }
                Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Load and decompress one block
    fn read_block(&self, file: &File, handle: &BlockHandle) -> Result<Bytes> {
        let mut frame = vec![0u8; handle.len as usize];
        read_exact_at(file, &mut frame, handle.offset)?;
        open_block(&frame, self.header.compression, self.verify_checksums)
    }

    /// Block `n` in index order, or `Err(ReaderClosed)`
    pub(crate) fn load_block(&self, n: usize) -> Result<Bytes> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(ShardError::ReaderClosed)?;
        self.read_block(file, &self.index[n])
    }

    /// Iterate over all records in key order
    pub fn iter(&self) -> ShardIterator<'_> {
        ShardIterator::new(self)
    }

    /// Release the file handle; later lookups fail with `ReaderClosed`
    pub fn close(&self) {
        if self.file.write().take().is_some() {
            debug!(path = %self.path.display(), "closed shard");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_schema(&self) -> &Schema {
        &self.header.key_schema
    }

    pub fn value_schema(&self) -> &Schema {
        &self.header.value_schema
    }

    pub fn compression(&self) -> Compression {
        self.header.compression
    }

    /// Get entry count
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Number of data blocks (= sparse index entries)
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Smallest key in this shard
    pub fn first_key(&self) -> Option<&Value> {
        self.index.first().map(|handle| &handle.first_key)
    }

    /// Point lookups served since open
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(AtomicOrdering::Relaxed)
    }
}

impl std::fmt::Debug for ShardReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardReader")
            .field("path", &self.path)
            .field("records", &self.record_count)
            .field("blocks", &self.index.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn truncated(path: &Path, file_size: u64) -> ShardError {
    ShardError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!(
            "{}: truncated or unsealed shard ({} bytes)",
            path.display(),
            file_size
        ),
    ))
}

/// Parse entries: [KeyLen: u32][Offset: u64][BlockLen: u32][Key]
///
/// Keys and offsets must be strictly increasing and every block must lie
/// inside the data region.
fn parse_index(
    path: &Path,
    data: &[u8],
    key_schema: &Schema,
    data_start: u64,
    data_end: u64,
) -> Result<Vec<BlockHandle>> {
    let malformed = |reason: String| {
        ShardError::FormatMismatch(format!("{}: malformed index: {}", path.display(), reason))
    };

    let mut index: Vec<BlockHandle> = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + INDEX_ENTRY_FIXED_SIZE > data.len() {
            return Err(malformed(format!("partial entry at byte {}", pos)));
        }
        let key_len = read_u32(&data[pos..pos + 4]) as usize;
        let offset = read_u64(&data[pos + 4..pos + 12]);
        let len = read_u32(&data[pos + 12..pos + 16]);
        pos += INDEX_ENTRY_FIXED_SIZE;

        if key_len > data.len() - pos {
            return Err(malformed(format!("key of {} bytes overruns index", key_len)));
        }
        let first_key = codec::decode(&data[pos..pos + key_len], key_schema)?;
        pos += key_len;

        if offset < data_start || offset.saturating_add(len as u64) > data_end {
            return Err(malformed(format!(
                "block {}+{} outside data region",
                offset, len
            )));
        }
        if let Some(prev) = index.last() {
            if first_key <= prev.first_key || offset <= prev.offset {
                return Err(malformed(format!(
                    "entry {} not strictly after its predecessor",
                    first_key
                )));
            }
        }
        index.push(BlockHandle {
            first_key,
            offset,
            len,
        });
    }
    Ok(index)
}
