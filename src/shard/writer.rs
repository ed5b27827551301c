//! Shard Writer
//!
//! Appends key-ordered records to a new shard file, cutting blocks and
//! recording one sparse index entry per block.
//!
//! The file is written under a hidden `.<name>.inprogress` path and only
//! renamed to its destination once `close()` has written the index and
//! footer, so a shard is never visible half-written.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec;
use crate::config::Config;
use crate::error::{Result, ShardError};
use crate::schema::{Datum, Schema, SchemaSource, Value};

use super::block::BlockBuilder;
use super::{
    Footer, IndexEntry, ShardHeader, ShardMeta, FORMAT_VERSION, HEADER_PREFIX_SIZE,
    INDEX_ENTRY_FIXED_SIZE, MAGIC,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    /// A contract violation or I/O failure discarded the shard
    Aborted,
}

/// Writes one shard; keys must arrive in non-decreasing order
pub struct ShardWriter {
    /// Final destination path
    path: PathBuf,
    /// Hidden path written until commit
    temp_path: PathBuf,
    /// Buffered writer, `None` once closed or aborted
    writer: Option<BufWriter<File>>,
    state: WriterState,
    header: ShardHeader,
    config: Config,
    /// Block being filled
    block: BlockBuilder,
    /// Current write position (start of the next block)
    current_offset: u64,
    /// Index: first key of each block → block offset/length
    index: Vec<IndexEntry>,
    record_count: u64,
    first_key: Option<Value>,
    last_key: Option<Value>,
}

impl ShardWriter {
    /// Create a new shard at `path`
    ///
    /// Fails with an I/O error if `path` already exists; shards are
    /// write-once. A `.<name>.inprogress` file left by a writer that died
    /// before `close` also fails with `AlreadyExists` and must be removed
    /// by the caller.
    pub fn create(
        path: &Path,
        key_schema: Schema,
        value_schema: Schema,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;

        if path.exists() {
            return Err(ShardError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("shard {} already exists", path.display()),
            )));
        }
        let temp_path = temp_path_for(path)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => ShardError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "stale in-progress file {} from an unfinished writer",
                        temp_path.display()
                    ),
                )),
                _ => ShardError::Io(e),
            })?;

        let header = ShardHeader {
            key_schema,
            value_schema,
            compression: config.compression,
        };

        let mut writer = Self {
            path: path.to_path_buf(),
            temp_path,
            writer: Some(BufWriter::new(file)),
            state: WriterState::Open,
            header,
            config: config.clone(),
            block: BlockBuilder::new(config.block_size),
            current_offset: 0,
            index: Vec::new(),
            record_count: 0,
            first_key: None,
            last_key: None,
        };

        if let Err(e) = writer.write_header() {
            writer.abort();
            return Err(e);
        }

        debug!(
            path = %writer.path.display(),
            compression = ?writer.header.compression,
            "created shard"
        );
        Ok(writer)
    }

    /// Create a shard whose schemas come from explicit descriptors or from
    /// the datum types themselves
    pub fn create_for<K: Datum, V: Datum>(
        path: &Path,
        key_source: &SchemaSource,
        value_source: &SchemaSource,
        config: &Config,
    ) -> Result<Self> {
        Self::create(
            path,
            key_source.resolve::<K>(),
            value_source.resolve::<V>(),
            config,
        )
    }

    /// Header: Magic (4) | Version u16 | MetaLen u32 | bincode metadata
    fn write_header(&mut self) -> Result<()> {
        let meta = bincode::serialize(&self.header)?;
        let meta_len = u32::try_from(meta.len())
            .map_err(|_| ShardError::Serialization("shard metadata too large".to_string()))?;

        let writer = self.writer.as_mut().ok_or(ShardError::WriterClosed)?;
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&meta_len.to_le_bytes())?;
        writer.write_all(&meta)?;

        self.current_offset = HEADER_PREFIX_SIZE + meta.len() as u64;
        Ok(())
    }

    /// Append a record
    ///
    /// A key smaller than the previous one aborts the shard with
    /// `OutOfOrderKey`. A key or value that does not fit its schema is
    /// rejected with `SchemaMismatch` and nothing is written.
    pub fn append(&mut self, key: &Value, value: &Value) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(ShardError::WriterClosed);
        }

        let key_bytes = codec::encode(key, &self.header.key_schema)?;
        let value_bytes = codec::encode(value, &self.header.value_schema)?;

        if let Some(last) = &self.last_key {
            if key < last {
                let err = ShardError::OutOfOrderKey {
                    previous: last.to_string(),
                    current: key.to_string(),
                };
                warn!(path = %self.path.display(), error = %err, "aborting shard");
                self.abort();
                return Err(err);
            }
        }

        if let Err(e) = self.add_record(key, &key_bytes, &value_bytes) {
            warn!(path = %self.path.display(), error = %e, "aborting shard");
            self.abort();
            return Err(e);
        }
        Ok(())
    }

    /// Append a typed record
    pub fn append_datum<K: Datum, V: Datum>(&mut self, key: K, value: V) -> Result<()> {
        self.append(&key.into_value(), &value.into_value())
    }

    fn add_record(&mut self, key: &Value, key_bytes: &[u8], value_bytes: &[u8]) -> Result<()> {
        // Cut only between distinct keys so a run of duplicates stays in one
        // block and index keys remain strictly increasing.
        let full = self.block.records() >= self.config.index_interval
            || self.block.raw_len() >= self.config.block_size;
        if full && self.last_key.as_ref() != Some(key) {
            self.flush_block()?;
        }

        self.block.add(key_bytes, value_bytes)?;

        if self.first_key.is_none() {
            self.first_key = Some(key.clone());
        }
        self.last_key = Some(key.clone());
        self.record_count += 1;
        Ok(())
    }

    /// Write the current block and record its index entry
    fn flush_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let records = self.block.records();
        let (first_key, frame) = self.block.finish(self.header.compression)?;

        let writer = self.writer.as_mut().ok_or(ShardError::WriterClosed)?;
        writer.write_all(&frame)?;

        let len = u32::try_from(frame.len())
            .map_err(|_| ShardError::Serialization("block frame exceeds 4 GiB".to_string()))?;
        self.index.push(IndexEntry {
            key: first_key,
            offset: self.current_offset,
            len,
        });

        debug!(
            offset = self.current_offset,
            records,
            bytes = frame.len(),
            "flushed block"
        );
        self.current_offset += frame.len() as u64;
        Ok(())
    }

    /// Seal the shard: flush the last block, write index and footer, then
    /// move the file into place
    ///
    /// A second call fails with `WriterClosed`.
    pub fn close(&mut self) -> Result<ShardMeta> {
        if self.state != WriterState::Open {
            return Err(ShardError::WriterClosed);
        }
        match self.finish() {
            Ok(meta) => {
                self.state = WriterState::Closed;
                info!(
                    path = %meta.path.display(),
                    records = meta.record_count,
                    blocks = meta.block_count,
                    bytes = meta.file_size,
                    "sealed shard"
                );
                Ok(meta)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to seal shard");
                self.abort();
                Err(e)
            }
        }
    }

    fn finish(&mut self) -> Result<ShardMeta> {
        self.flush_block()?;

        // Index block: [key_len(4)][offset(8)][block_len(4)][key] per block
        let index_offset = self.current_offset;
        let mut index_data = Vec::with_capacity(
            self.index
                .iter()
                .map(|e| INDEX_ENTRY_FIXED_SIZE + e.key.len())
                .sum(),
        );
        for entry in &self.index {
            index_data.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
            index_data.extend_from_slice(&entry.offset.to_le_bytes());
            index_data.extend_from_slice(&entry.len.to_le_bytes());
            index_data.extend_from_slice(&entry.key);
        }

        let footer = Footer {
            index_offset,
            index_len: index_data.len() as u64,
            record_count: self.record_count,
            index_crc: crc32fast::hash(&index_data),
        };

        let mut writer = self.writer.take().ok_or(ShardError::WriterClosed)?;
        writer.write_all(&index_data)?;
        writer.write_all(&footer.encode())?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| ShardError::Io(e.into_error()))?;
        if self.config.sync_on_close {
            file.sync_all()?;
        }
        let file_size = file.metadata()?.len();
        drop(file);

        if self.path.exists() {
            return Err(ShardError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("shard {} appeared while writing", self.path.display()),
            )));
        }
        fs::rename(&self.temp_path, &self.path)?;

        Ok(ShardMeta {
            path: self.path.clone(),
            record_count: self.record_count,
            block_count: self.index.len() as u64,
            file_size,
            first_key: self.first_key.clone(),
            last_key: self.last_key.clone(),
        })
    }

    /// Discard the in-progress file; later calls fail with `WriterClosed`
    fn abort(&mut self) {
        self.writer = None;
        self.state = WriterState::Aborted;
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.temp_path.display(), error = %e, "failed to remove in-progress shard");
            }
        }
    }

    /// Destination path of this shard
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_schema(&self) -> &Schema {
        &self.header.key_schema
    }

    pub fn value_schema(&self) -> &Schema {
        &self.header.value_schema
    }

    /// Records accepted so far
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// True once `close()` succeeded or the writer aborted
    pub fn is_closed(&self) -> bool {
        self.state != WriterState::Open
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        if self.state == WriterState::Open {
            debug!(path = %self.path.display(), "dropping unsealed shard");
            self.abort();
        }
    }
}

/// `dir/name` → `dir/.name.inprogress`
fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        ShardError::Config(format!("shard path {} has no file name", path.display()))
    })?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(name);
    temp_name.push(".inprogress");
    Ok(path.with_file_name(temp_name))
}
