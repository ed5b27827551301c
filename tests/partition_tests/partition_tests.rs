//! Tests for the partition function
//!
//! These tests verify:
//! - Ordinals are stable (fixed known answers, not just same-process repeats)
//! - Every ordinal lies in 0..shard_count
//! - Keys spread across shards
//! - Custom partitioners plug in through the trait

use mapshard::codec::encode;
use mapshard::{partition, HashPartitioner, Partitioner, Schema, Value};

// =============================================================================
// Stability Tests
// =============================================================================

#[test]
fn test_known_answers() {
    // CRC32/IEEE("123456789") = 0xCBF43926 = 3421780262
    assert_eq!(partition(b"123456789", 4), 2);
    assert_eq!(partition(b"123456789", 10), 2);
    assert_eq!(partition(b"123456789", 1000), 262);
    assert_eq!(partition(b"", 7), 0);
}

#[test]
fn test_matches_crc32_of_encoded_key() {
    for key in [0i64, 1, -1, 42, i64::MAX, i64::MIN] {
        let bytes = encode(&Value::Long(key), &Schema::Long).unwrap();
        let expected = (crc32fast::hash(&bytes) % 13) as usize;
        assert_eq!(partition(&bytes, 13), expected);
    }
}

#[test]
fn test_hash_partitioner_matches_function() {
    let bytes = encode(&Value::from("user-17"), &Schema::String).unwrap();
    for shards in 1..32 {
        assert_eq!(HashPartitioner.partition(&bytes, shards), partition(&bytes, shards));
    }
}

// =============================================================================
// Range and Distribution Tests
// =============================================================================

#[test]
fn test_ordinal_always_in_range() {
    for shards in [1usize, 2, 3, 7, 64, 1_000] {
        for key in 0..500 {
            let bytes = encode(&Value::Int(key), &Schema::Int).unwrap();
            assert!(partition(&bytes, shards) < shards);
        }
    }
}

#[test]
fn test_keys_spread_across_shards() {
    let shards = 8;
    let mut counts = vec![0usize; shards];
    for key in 0..10_000i64 {
        let bytes = encode(&Value::Long(key), &Schema::Long).unwrap();
        counts[partition(&bytes, shards)] += 1;
    }
    for (ordinal, count) in counts.iter().enumerate() {
        assert!(
            (800..=1_700).contains(count),
            "shard {} received {} of 10000 keys",
            ordinal,
            count
        );
    }
}

#[test]
#[should_panic(expected = "zero shards")]
fn test_zero_shards_panics() {
    partition(b"key", 0);
}

// =============================================================================
// Custom Partitioner Tests
// =============================================================================

#[test]
fn test_closure_partitioner() {
    let by_first_byte = |key: &[u8], shards: usize| key.first().map_or(0, |b| *b as usize % shards);
    assert_eq!(by_first_byte.partition(&[5, 1, 1], 4), 1);
    assert_eq!(by_first_byte.partition(&[], 4), 0);
}

#[test]
fn test_boxed_partitioner() {
    let partitioners: Vec<Box<dyn Partitioner>> = vec![
        Box::new(HashPartitioner),
        Box::new(|_: &[u8], shards: usize| shards - 1),
    ];
    assert_eq!(partitioners[0].partition(b"123456789", 4), 2);
    assert_eq!(partitioners[1].partition(b"123456789", 4), 3);
}
