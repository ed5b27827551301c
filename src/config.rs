//! Configuration for shard writers, readers and directories
//!
//! Centralized configuration with sensible defaults. Passed explicitly to
//! every `create`/`open` call.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};

/// Main configuration for writing and reading shards
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Write Configuration
    // -------------------------------------------------------------------------
    /// Block compression codec (recorded in each shard header)
    pub compression: Compression,

    /// Records per block; one index entry is written per block
    pub index_interval: usize,

    /// Uncompressed bytes per block before a cut
    /// A block is cut at `index_interval` records or `block_size` bytes,
    /// whichever comes first.
    pub block_size: usize,

    /// fsync the shard before it is renamed into place
    pub sync_on_close: bool,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// Verify per-block CRC32 on every block load
    pub verify_checksums: bool,

    /// Open the shards of a directory concurrently
    pub parallel_open: bool,
}

/// Block compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Compression {
    /// Blocks stored as-is
    #[default]
    None,

    /// LZ4 block compression (no level)
    Lz4,

    /// Zstandard at the given level (1..=22)
    Zstd { level: i32 },
}

impl Compression {
    /// Default zstd level when enabling compression without a preference
    pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

    pub fn zstd() -> Self {
        Compression::Zstd {
            level: Self::DEFAULT_ZSTD_LEVEL,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            index_interval: 128,
            block_size: 64 * 1024, // 64 KB
            sync_on_close: true,
            verify_checksums: true,
            parallel_open: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the writer cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.index_interval == 0 {
            return Err(ShardError::Config(
                "index_interval must be at least 1".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(ShardError::Config(
                "block_size must be at least 1 byte".to_string(),
            ));
        }
        if let Compression::Zstd { level } = self.compression {
            if !(1..=22).contains(&level) {
                return Err(ShardError::Config(format!(
                    "zstd level {} out of range 1..=22",
                    level
                )));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the block compression codec
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the number of records per block (index granularity)
    pub fn index_interval(mut self, records: usize) -> Self {
        self.config.index_interval = records;
        self
    }

    /// Set the uncompressed block size limit (in bytes)
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.config.block_size = bytes;
        self
    }

    /// Enable or disable fsync before commit
    pub fn sync_on_close(mut self, sync: bool) -> Self {
        self.config.sync_on_close = sync;
        self
    }

    /// Enable or disable block checksum verification on read
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    /// Enable or disable concurrent shard opening
    pub fn parallel_open(mut self, parallel: bool) -> Self {
        self.config.parallel_open = parallel;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
