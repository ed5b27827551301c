//! Directory Writer
//!
//! Write-side router: owns one `ShardWriter` per ordinal and sends each
//! record to the shard its key partitions to. Appending keys in ascending
//! order keeps every shard sorted.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::codec;
use crate::config::Config;
use crate::error::{Result, ShardError};
use crate::partition::{HashPartitioner, Partitioner};
use crate::schema::{Datum, Schema, Value};
use crate::shard::{ShardMeta, ShardWriter};

use super::{shard_file_name, MAX_SHARDS, SUCCESS_MARKER};

/// Writes a partitioned shard directory
pub struct DirectoryWriter {
    dir: PathBuf,
    writers: Vec<ShardWriter>,
    partitioner: Box<dyn Partitioner>,
}

impl DirectoryWriter {
    /// Create `shard_count` shards in `dir`, routed by the default partitioner
    pub fn create(
        dir: &Path,
        shard_count: usize,
        key_schema: Schema,
        value_schema: Schema,
        config: &Config,
    ) -> Result<Self> {
        Self::create_with(
            dir,
            shard_count,
            key_schema,
            value_schema,
            config,
            Box::new(HashPartitioner),
        )
    }

    /// Create `shard_count` shards in `dir`, routed by `partitioner`
    ///
    /// Readers must later look keys up with the same partitioner.
    pub fn create_with(
        dir: &Path,
        shard_count: usize,
        key_schema: Schema,
        value_schema: Schema,
        config: &Config,
        partitioner: Box<dyn Partitioner>,
    ) -> Result<Self> {
        if shard_count == 0 {
            return Err(ShardError::Config(
                "a shard directory needs at least one shard".to_string(),
            ));
        }
        if shard_count > MAX_SHARDS {
            return Err(ShardError::Config(format!(
                "{} shards exceeds the limit of {}",
                shard_count, MAX_SHARDS
            )));
        }
        fs::create_dir_all(dir)?;

        let mut writers = Vec::with_capacity(shard_count);
        for ordinal in 0..shard_count {
            let path = dir.join(shard_file_name(ordinal));
            let writer = ShardWriter::create(&path, key_schema.clone(), value_schema.clone(), config)
                .map_err(|e| ShardError::in_shard(&path, e))?;
            writers.push(writer);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            writers,
            partitioner,
        })
    }

    /// Route one record to its shard, returning the shard ordinal
    pub fn append(&mut self, key: &Value, value: &Value) -> Result<usize> {
        let key_bytes = codec::encode(key, self.writers[0].key_schema())?;
        let shard_count = self.writers.len();
        let ordinal = self.partitioner.partition(&key_bytes, shard_count);
        if ordinal >= shard_count {
            return Err(ShardError::Partition {
                ordinal,
                shard_count,
            });
        }
        let writer = &mut self.writers[ordinal];
        writer
            .append(key, value)
            .map_err(|e| ShardError::in_shard(writer.path(), e))?;
        Ok(ordinal)
    }

    /// Typed variant of `append`
    pub fn append_datum<K: Datum, V: Datum>(&mut self, key: K, value: V) -> Result<usize> {
        self.append(&key.into_value(), &value.into_value())
    }

    /// Number of shards being written
    pub fn shard_count(&self) -> usize {
        self.writers.len()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Seal every shard, then write the `_SUCCESS` marker
    pub fn close(mut self) -> Result<Vec<ShardMeta>> {
        let mut metas = Vec::with_capacity(self.writers.len());
        for writer in &mut self.writers {
            let meta = writer
                .close()
                .map_err(|e| ShardError::in_shard(writer.path(), e))?;
            metas.push(meta);
        }
        File::create(self.dir.join(SUCCESS_MARKER))?;

        info!(
            dir = %self.dir.display(),
            shards = metas.len(),
            records = metas.iter().map(|m| m.record_count).sum::<u64>(),
            "sealed shard directory"
        );
        Ok(metas)
    }
}
