//! # mapshard
//!
//! Partitioned, sorted, indexed key-value files for the output of
//! distributed jobs:
//! - Schema-driven binary records (keys and values)
//! - Shard files sorted by key with a sparse block index and optional
//!   block compression
//! - Deterministic hash partitioning shared by writers and readers
//! - Directory lookups that consult exactly one shard
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Directory Coordinator                      │
//! │        open_all / lookup (routes to exactly one shard)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  partition(key_bytes, shard_count)
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ ShardWriter │          │ ShardReader │
//!   │  (append)   │          │ (index+get) │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          └──────────┬─────────────┘
//!                     ▼
//!             ┌──────────────┐
//!             │ Record Codec │
//!             │   (Schema)   │
//!             └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod codec;
pub mod directory;
pub mod partition;
pub mod schema;
pub mod shard;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Compression, Config};
pub use directory::{lookup, lookup_with, open_all, DirectoryWriter, ShardSet};
pub use error::{Result, ShardError};
pub use partition::{partition, HashPartitioner, Partitioner};
pub use schema::{Datum, Field, Schema, SchemaSource, Value};
pub use shard::{ShardMeta, ShardReader, ShardWriter};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mapshard
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
