//! Block compression
//!
//! The raw (uncompressed) length travels in the block header, so neither
//! codec prepends its own size.

use crate::config::Compression;
use crate::error::{Result, ShardError};

/// Compress a block payload
pub(crate) fn compress_block(compression: Compression, raw: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(raw.to_vec()),
        Compression::Lz4 => Ok(lz4_flex::block::compress(raw)),
        Compression::Zstd { level } => Ok(zstd::bulk::compress(raw, level)?),
    }
}

/// Decompress a block payload, checking it expands to exactly `raw_len` bytes
pub(crate) fn decompress_block(
    compression: Compression,
    stored: &[u8],
    raw_len: usize,
) -> Result<Vec<u8>> {
    let raw = match compression {
        Compression::None => stored.to_vec(),
        Compression::Lz4 => lz4_flex::block::decompress(stored, raw_len)
            .map_err(|e| ShardError::CorruptRecord(format!("lz4 block: {}", e)))?,
        Compression::Zstd { .. } => zstd::bulk::decompress(stored, raw_len)
            .map_err(|e| ShardError::CorruptRecord(format!("zstd block: {}", e)))?,
    };
    if raw.len() != raw_len {
        return Err(ShardError::CorruptRecord(format!(
            "block expanded to {} bytes, header says {}",
            raw.len(),
            raw_len
        )));
    }
    Ok(raw)
}
