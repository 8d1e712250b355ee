use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use anyhow::Result;
use rand::Rng;

use siltdb::index::hash::{ExtendibleHashTable, HashTableConfig};

mod common;
use common::{scratch_pool, tiny_hash_table};

#[test]
fn test_insert_and_get() -> Result<()> {
    let (table, _db_file) = tiny_hash_table(8)?;

    assert!(table.insert(1, 100)?);
    assert!(table.insert(1, 101)?);
    assert!(table.insert(2, 200)?);

    assert_eq!(table.get(1)?, vec![100, 101]);
    assert_eq!(table.get(2)?, vec![200]);
    assert!(table.get(3)?.is_empty());

    Ok(())
}

#[test]
fn test_duplicate_pair_rejected() -> Result<()> {
    let (table, _db_file) = tiny_hash_table(8)?;

    assert!(table.insert(1, 100)?);
    assert!(!table.insert(1, 100)?);
    assert_eq!(table.get(1)?, vec![100]);

    Ok(())
}

#[test]
fn test_remove() -> Result<()> {
    let (table, _db_file) = tiny_hash_table(8)?;

    assert!(table.insert(1, 100)?);
    assert!(table.insert(1, 101)?);

    assert!(table.remove(1, 100)?);
    assert!(!table.remove(1, 100)?);
    assert!(!table.remove(9, 900)?);

    assert_eq!(table.get(1)?, vec![101]);
    Ok(())
}

#[test]
fn test_split_grows_directory() -> Result<()> {
    // Identity hash, two-slot buckets: keys land on their low bits
    let (table, _db_file) = tiny_hash_table(2)?;

    for key in 0..4u32 {
        assert!(table.insert(key, 100 + key)?);
    }
    // Both depth-1 buckets are now full; the next even key forces a split
    assert!(table.insert(4, 104)?);

    assert!(table.global_depth()? >= 2);
    assert_eq!(table.get(0)?, vec![100]);
    assert_eq!(table.get(2)?, vec![102]);
    assert_eq!(table.get(4)?, vec![104]);
    table.verify_integrity()?;

    Ok(())
}

#[test]
fn test_merge_collapses_empty_buckets() -> Result<()> {
    let (table, _db_file) = tiny_hash_table(2)?;

    // Drive the directory to depth 2 with every local depth at 2
    for key in 0..6u32 {
        assert!(table.insert(key, 100 + key)?);
    }
    assert_eq!(table.global_depth()?, 2);
    table.verify_integrity()?;

    // Emptying one bucket merges it with its split image, but the
    // directory cannot shrink while any bucket still uses both bits
    assert!(table.remove(2, 102)?);
    assert_eq!(table.global_depth()?, 2);
    table.verify_integrity()?;

    // Emptying the second deep bucket lets the directory halve
    assert!(table.remove(3, 103)?);
    assert_eq!(table.global_depth()?, 1);
    table.verify_integrity()?;

    for key in [0u32, 1, 4, 5] {
        assert_eq!(table.get(key)?, vec![100 + key]);
    }

    Ok(())
}

#[test]
fn test_repeated_split_on_colliding_keys() -> Result<()> {
    // Keys congruent mod 32 keep colliding until the directory has five
    // bits, exercising the split retry loop
    let (table, _db_file) = tiny_hash_table(2)?;

    for i in 0..3u32 {
        assert!(table.insert(i * 32, 500 + i)?);
    }

    assert!(table.global_depth()? >= 5);
    for i in 0..3u32 {
        assert_eq!(table.get(i * 32)?, vec![500 + i]);
    }
    table.verify_integrity()?;

    Ok(())
}

#[test]
fn test_invariants_hold_after_every_mutation() -> Result<()> {
    let (table, _db_file) = tiny_hash_table(2)?;

    for key in 0..16u32 {
        table.insert(key, key)?;
        table.verify_integrity()?;
    }
    for key in 0..16u32 {
        table.remove(key, key)?;
        table.verify_integrity()?;
    }
    for key in 0..16u32 {
        assert!(table.get(key)?.is_empty());
    }

    Ok(())
}

#[test]
fn test_randomized_round_trip() -> Result<()> {
    // Capacity has to comfortably exceed the expected per-key multiplicity:
    // values sharing one key always hash together, so no split can separate
    // them
    let (table, _db_file) = tiny_hash_table(64)?;
    let mut rng = rand::thread_rng();
    let mut model: HashMap<u32, Vec<u32>> = HashMap::new();

    for value in 0..300u32 {
        let key = rng.gen_range(0..40);
        assert!(table.insert(key, value)?);
        model.entry(key).or_default().push(value);
    }

    for (key, values) in &model {
        let mut found = table.get(*key)?;
        found.sort_unstable();
        assert_eq!(&found, values);
    }

    Ok(())
}

#[test]
fn test_concurrent_inserts() -> Result<()> {
    let (buffer_pool, _db_file) = scratch_pool(16)?;
    let table = Arc::new(ExtendibleHashTable::with_config(
        buffer_pool,
        HashTableConfig {
            bucket_capacity: 4,
            hash_fn: |key| key,
        },
    )?);

    // Interleaved key ranges so threads split the same buckets
    let mut handles = Vec::new();
    for worker in 0..4u32 {
        let table = table.clone();
        handles.push(thread::spawn(move || -> Result<()> {
            for i in 0..32u32 {
                let key = worker + i * 4;
                assert!(table.insert(key, key)?);
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().unwrap()?;
    }

    table.verify_integrity()?;
    let mut seen = HashSet::new();
    for key in 0..128u32 {
        let values = table.get(key)?;
        assert_eq!(values, vec![key]);
        seen.insert(key);
    }
    assert_eq!(seen.len(), 128);

    Ok(())
}
