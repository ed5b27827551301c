//! Error types for mapshard
//!
//! Provides a unified error type for all operations. Key absence is never
//! an error: lookups return `Ok(None)`.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using ShardError
pub type Result<T> = std::result::Result<T, ShardError>;

/// Unified error type for mapshard operations
#[derive(Debug, Error)]
pub enum ShardError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Contract Violations
    // -------------------------------------------------------------------------
    #[error("Out of order key: {current} appended after {previous}")]
    OutOfOrderKey { previous: String, current: String },

    #[error("Writer is closed")]
    WriterClosed,

    #[error("Reader is closed")]
    ReaderClosed,

    #[error("Partitioner returned ordinal {ordinal} for {shard_count} shards")]
    Partition { ordinal: usize, shard_count: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Directory Errors
    // -------------------------------------------------------------------------
    #[error("Shard {}: {source}", path.display())]
    Shard {
        path: PathBuf,
        #[source]
        source: Box<ShardError>,
    },
}

impl ShardError {
    /// Wrap an error with the shard file it came from
    pub fn in_shard(path: impl Into<PathBuf>, source: ShardError) -> Self {
        ShardError::Shard {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through `Shard` wrappers
    pub fn root(&self) -> &ShardError {
        match self {
            ShardError::Shard { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self.root(), ShardError::Io(_))
    }

    pub fn is_format_mismatch(&self) -> bool {
        matches!(self.root(), ShardError::FormatMismatch(_))
    }

    pub fn is_corrupt_record(&self) -> bool {
        matches!(self.root(), ShardError::CorruptRecord(_))
    }
}

impl From<bincode::Error> for ShardError {
    fn from(err: bincode::Error) -> Self {
        ShardError::Serialization(err.to_string())
    }
}
