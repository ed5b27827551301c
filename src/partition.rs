//! Partition Function
//!
//! Deterministic key → shard ordinal mapping. The same policy must be used
//! when routing records to shards at write time and when choosing the shard
//! to query at read time; a mismatch silently misses keys.
//!
//! The default policy hashes the key's encoded bytes with CRC32 (IEEE), a
//! fixed, platform-independent function, so ordinals are stable across
//! processes, hosts and releases.

/// Routing policy from encoded key bytes to a shard ordinal
pub trait Partitioner: Send + Sync {
    /// Ordinal in `0..shard_count` for `key_bytes`; `shard_count` is never 0
    fn partition(&self, key_bytes: &[u8], shard_count: usize) -> usize;
}

/// Hash of the encoded key modulo shard count
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn partition(&self, key_bytes: &[u8], shard_count: usize) -> usize {
        partition(key_bytes, shard_count)
    }
}

impl<F> Partitioner for F
where
    F: Fn(&[u8], usize) -> usize + Send + Sync,
{
    fn partition(&self, key_bytes: &[u8], shard_count: usize) -> usize {
        self(key_bytes, shard_count)
    }
}

/// Default partition: `crc32(key_bytes) % shard_count`
///
/// # Panics
/// Panics if `shard_count` is 0.
pub fn partition(key_bytes: &[u8], shard_count: usize) -> usize {
    assert!(shard_count > 0, "partition over zero shards");
    (crc32fast::hash(key_bytes) as u64 % shard_count as u64) as usize
}
