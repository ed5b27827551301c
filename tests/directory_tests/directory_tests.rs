//! Tests for the directory coordinator and directory writer
//!
//! These tests verify:
//! - Writing a partitioned directory and reading every key back
//! - A lookup consults exactly one shard, the one the partitioner picks
//! - Canonical shard ordering and skipping of bookkeeping files
//! - Error reporting for unreadable shards and mismatched key schemas
//! - Custom partitioners and the explicit full-scan lookup

use std::fs;
use std::path::{Path, PathBuf};

use mapshard::codec::encode;
use mapshard::directory::{list_shards, shard_file_name, MAX_SHARDS, SUCCESS_MARKER};
use mapshard::{
    lookup, lookup_with, open_all, partition, Config, DirectoryWriter, Schema, ShardError,
    ShardSet, ShardWriter, Value,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("output");
    (temp_dir, path)
}

/// Keys 0..count routed into `shards` shards, values "v{key}"
fn write_directory(dir: &Path, shards: usize, count: i32, config: &Config) {
    let mut writer =
        DirectoryWriter::create(dir, shards, Schema::Int, Schema::String, config).unwrap();
    for key in 0..count {
        writer
            .append(&Value::Int(key), &Value::from(format!("v{}", key)))
            .unwrap();
    }
    writer.close().unwrap();
}

/// Write one shard file directly, bypassing the router
fn write_shard(path: &Path, key_schema: Schema, records: &[(Value, Value)]) {
    let mut writer =
        ShardWriter::create(path, key_schema, Schema::String, &Config::default()).unwrap();
    for (key, value) in records {
        writer.append(key, value).unwrap();
    }
    writer.close().unwrap();
}

fn ordinal_of(key: i32, shards: usize) -> usize {
    partition(&encode(&Value::Int(key), &Schema::Int).unwrap(), shards)
}

// =============================================================================
// Write/Read Tests
// =============================================================================

#[test]
fn test_thousand_keys_four_shards() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 4, 1_000, &Config::default());

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    assert_eq!(shards.len(), 4);
    assert_eq!(shards.record_count(), 1_000);
    assert_eq!(shards.key_schema(), Some(&Schema::Int));

    for key in 0..1_000 {
        assert_eq!(
            shards.get(&Value::Int(key)).unwrap(),
            Some(Value::from(format!("v{}", key))),
            "key {}",
            key
        );
    }
    assert_eq!(shards.get(&Value::Int(1_000)).unwrap(), None);
    assert_eq!(shards.get(&Value::Int(-1)).unwrap(), None);
}

#[test]
fn test_records_land_in_partitioned_shard() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 4, 200, &Config::default());

    let readers = open_all(&dir, &Config::default()).unwrap();
    for key in 0..200 {
        let ordinal = ordinal_of(key, 4);
        for (n, reader) in readers.iter().enumerate() {
            let found = reader.get(&Value::Int(key)).unwrap();
            assert_eq!(found.is_some(), n == ordinal, "key {} in shard {}", key, n);
        }
    }
}

#[test]
fn test_directory_writer_returns_ordinal() {
    let (_temp, dir) = setup_temp_dir();
    let mut writer =
        DirectoryWriter::create(&dir, 3, Schema::Int, Schema::String, &Config::default()).unwrap();
    assert_eq!(writer.shard_count(), 3);
    for key in 0..20 {
        let ordinal = writer.append(&Value::Int(key), &Value::from("x")).unwrap();
        assert_eq!(ordinal, ordinal_of(key, 3));
    }

    let metas = writer.close().unwrap();
    assert_eq!(metas.len(), 3);
    assert_eq!(metas.iter().map(|m| m.record_count).sum::<u64>(), 20);
    assert!(dir.join(SUCCESS_MARKER).exists());
    for (ordinal, meta) in metas.iter().enumerate() {
        assert_eq!(meta.path, dir.join(shard_file_name(ordinal)));
    }
}

#[test]
fn test_directory_writer_rejects_zero_shards() {
    let (_temp, dir) = setup_temp_dir();
    let result = DirectoryWriter::create(&dir, 0, Schema::Int, Schema::String, &Config::default());
    assert!(matches!(result, Err(ShardError::Config(_))));
}

#[test]
fn test_directory_writer_rejects_too_many_shards() {
    let (_temp, dir) = setup_temp_dir();
    let result = DirectoryWriter::create(
        &dir,
        MAX_SHARDS + 1,
        Schema::Int,
        Schema::String,
        &Config::default(),
    );
    assert!(matches!(result, Err(ShardError::Config(_))));
    // rejected before anything touched the filesystem
    assert!(!dir.exists());
}

#[test]
fn test_listing_order_is_ordinal_order_at_width_boundary() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();
    let ordinals = [9_999, 10_000, 10_001, MAX_SHARDS - 1];
    for ordinal in ordinals.iter().rev() {
        fs::write(dir.join(shard_file_name(*ordinal)), b"").unwrap();
    }

    let expected: Vec<PathBuf> = ordinals
        .iter()
        .map(|ordinal| dir.join(shard_file_name(*ordinal)))
        .collect();
    assert_eq!(list_shards(&dir).unwrap(), expected);
}

#[test]
fn test_directory_writer_refuses_existing_shards() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 2, 10, &Config::default());

    let err = DirectoryWriter::create(&dir, 2, Schema::Int, Schema::String, &Config::default())
        .err()
        .unwrap();
    assert!(matches!(err, ShardError::Shard { .. }));
    assert!(err.root().is_io());
}

#[test]
fn test_typed_directory_round_trip() {
    let (_temp, dir) = setup_temp_dir();
    let config = Config::builder().compression(mapshard::Compression::Lz4).build();
    let mut writer =
        DirectoryWriter::create(&dir, 5, Schema::String, Schema::Long, &config).unwrap();
    let mut keys: Vec<String> = (0..300).map(|i| format!("user-{:04}", i)).collect();
    keys.sort();
    for (i, key) in keys.iter().enumerate() {
        writer.append_datum(key.clone(), i as i64).unwrap();
    }
    writer.close().unwrap();

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(
            shards.get_datum::<String, i64>(key.clone()).unwrap(),
            Some(i as i64)
        );
    }
    assert_eq!(
        shards.get_datum::<String, i64>("nobody".to_string()).unwrap(),
        None
    );
}

// =============================================================================
// Routing Exclusivity Tests
// =============================================================================

/// Every shard holds every key, tagged with its own ordinal, so the answer
/// reveals which shard served it
fn write_adversarial_directory(dir: &Path, shards: usize, keys: i32) {
    fs::create_dir_all(dir).unwrap();
    for ordinal in 0..shards {
        let records: Vec<(Value, Value)> = (0..keys)
            .map(|key| (Value::Int(key), Value::from(format!("shard {}", ordinal))))
            .collect();
        write_shard(&dir.join(shard_file_name(ordinal)), Schema::Int, &records);
    }
}

#[test]
fn test_lookup_consults_only_the_routed_shard() {
    let (_temp, dir) = setup_temp_dir();
    write_adversarial_directory(&dir, 4, 100);

    let readers = open_all(&dir, &Config::default()).unwrap();
    for key in 0..100 {
        let before: Vec<u64> = readers.iter().map(|r| r.lookup_count()).collect();
        let ordinal = ordinal_of(key, 4);

        assert_eq!(
            lookup(&readers, &Value::Int(key)).unwrap(),
            Some(Value::from(format!("shard {}", ordinal)))
        );

        for (n, reader) in readers.iter().enumerate() {
            let expected = before[n] + u64::from(n == ordinal);
            assert_eq!(reader.lookup_count(), expected, "key {} shard {}", key, n);
        }
    }
}

#[test]
fn test_miss_in_routed_shard_is_authoritative() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();

    // Key 7 is deliberately stored in a shard it does not partition to
    let home = ordinal_of(7, 2);
    let stray = 1 - home;
    write_shard(
        &dir.join(shard_file_name(stray)),
        Schema::Int,
        &[(Value::Int(7), Value::from("misplaced"))],
    );
    write_shard(&dir.join(shard_file_name(home)), Schema::Int, &[]);

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    assert_eq!(shards.shard_for(&Value::Int(7)).unwrap(), Some(home));
    assert_eq!(shards.get(&Value::Int(7)).unwrap(), None);
    assert_eq!(shards.readers()[stray].lookup_count(), 0);

    // Only the explicit scan finds it
    assert_eq!(
        shards.scan_lookup(&Value::Int(7)).unwrap(),
        Some((stray, Value::from("misplaced")))
    );
}

// =============================================================================
// Custom Partitioner Tests
// =============================================================================

#[test]
fn test_custom_partitioner_round_trip() {
    let (_temp, dir) = setup_temp_dir();
    let last_shard = |_: &[u8], shards: usize| shards - 1;

    let mut writer = DirectoryWriter::create_with(
        &dir,
        3,
        Schema::Int,
        Schema::String,
        &Config::default(),
        Box::new(last_shard),
    )
    .unwrap();
    for key in 0..30 {
        assert_eq!(writer.append(&Value::Int(key), &Value::from("x")).unwrap(), 2);
    }
    writer.close().unwrap();

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    assert_eq!(shards.readers()[0].record_count(), 0);
    assert_eq!(shards.readers()[2].record_count(), 30);
    for key in 0..30 {
        assert_eq!(
            shards.get_with(&Value::Int(key), &last_shard).unwrap(),
            Some(Value::from("x"))
        );
        assert_eq!(
            lookup_with(shards.readers(), &Value::Int(key), &last_shard).unwrap(),
            Some(Value::from("x"))
        );
    }
}

#[test]
fn test_out_of_range_partitioner_is_rejected() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 2, 10, &Config::default());

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    let broken = |_: &[u8], shards: usize| shards;
    assert!(matches!(
        shards.get_with(&Value::Int(1), &broken),
        Err(ShardError::Partition {
            ordinal: 2,
            shard_count: 2
        })
    ));
}

// =============================================================================
// Listing and Opening Tests
// =============================================================================

#[test]
fn test_empty_directory_is_absent() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    assert!(shards.is_empty());
    assert_eq!(shards.key_schema(), None);
    assert_eq!(shards.get(&Value::Int(1)).unwrap(), None);
    assert_eq!(shards.scan_lookup(&Value::Int(1)).unwrap(), None);
    assert_eq!(lookup(&[], &Value::from("anything")).unwrap(), None);
}

#[test]
fn test_missing_directory_is_io_error() {
    let (_temp, dir) = setup_temp_dir();
    let err = open_all(&dir, &Config::default()).unwrap_err();
    assert!(err.is_io());
}

#[test]
fn test_bookkeeping_entries_are_skipped() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 2, 50, &Config::default());
    fs::write(dir.join(".part-00007.inprogress"), b"partial").unwrap();
    fs::write(dir.join("_logs"), b"not a shard").unwrap();
    fs::create_dir(dir.join("part-00009")).unwrap();

    let paths = list_shards(&dir).unwrap();
    assert_eq!(
        paths,
        vec![dir.join("part-00000"), dir.join("part-00001")]
    );

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    assert_eq!(shards.len(), 2);
    assert_eq!(shards.get(&Value::Int(49)).unwrap(), Some(Value::from("v49")));
}

#[test]
fn test_parallel_and_sequential_open_agree() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 12, 600, &Config::default());

    let parallel = open_all(&dir, &Config::default()).unwrap();
    let sequential = open_all(&dir, &Config::builder().parallel_open(false).build()).unwrap();
    assert_eq!(parallel.len(), 12);

    for (ordinal, (a, b)) in parallel.iter().zip(&sequential).enumerate() {
        assert_eq!(a.path(), dir.join(shard_file_name(ordinal)));
        assert_eq!(a.path(), b.path());
        assert_eq!(a.record_count(), b.record_count());
    }
    for key in 0..600 {
        let key = Value::Int(key);
        assert_eq!(
            lookup(&parallel, &key).unwrap(),
            lookup(&sequential, &key).unwrap()
        );
    }
}

#[test]
fn test_unreadable_shard_names_its_path() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 3, 30, &Config::default());
    let bad = dir.join(shard_file_name(1));
    fs::write(&bad, vec![0u8; 128]).unwrap();

    let err = open_all(&dir, &Config::default()).unwrap_err();
    match &err {
        ShardError::Shard { path, source } => {
            assert_eq!(path, &bad);
            assert!(source.is_format_mismatch());
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("part-00001"));
}

#[test]
fn test_mixed_key_schemas_are_rejected() {
    let (_temp, dir) = setup_temp_dir();
    fs::create_dir_all(&dir).unwrap();
    write_shard(
        &dir.join(shard_file_name(0)),
        Schema::Int,
        &[(Value::Int(1), Value::from("a"))],
    );
    write_shard(
        &dir.join(shard_file_name(1)),
        Schema::Long,
        &[(Value::Long(1), Value::from("b"))],
    );

    let err = ShardSet::open(&dir, &Config::default()).unwrap_err();
    assert!(matches!(err.root(), ShardError::SchemaMismatch(_)));
}

#[test]
fn test_key_of_wrong_type_is_schema_mismatch() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 2, 10, &Config::default());

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    assert!(matches!(
        shards.get(&Value::from("1")),
        Err(ShardError::SchemaMismatch(_))
    ));
}

#[test]
fn test_closed_set_rejects_lookups() {
    let (_temp, dir) = setup_temp_dir();
    write_directory(&dir, 2, 10, &Config::default());

    let shards = ShardSet::open(&dir, &Config::default()).unwrap();
    shards.close();
    let err = shards.get(&Value::Int(3)).unwrap_err();
    assert!(matches!(err.root(), ShardError::ReaderClosed));
}
