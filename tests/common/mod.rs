use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;
use siltdb::index::hash::{ExtendibleHashTable, HashTableConfig};
use siltdb::storage::buffer::{BufferPoolManager, ParallelBufferPoolManager};

/// Scratch database file; keep the handle alive for the duration of the
/// test or the file disappears under the pool
#[allow(dead_code)]
pub fn scratch_db() -> Result<(NamedTempFile, String)> {
    let db_file = NamedTempFile::new()?;
    let path = db_file.path().to_string_lossy().into_owned();
    Ok((db_file, path))
}

/// Standalone buffer pool over a scratch database
#[allow(dead_code)]
pub fn scratch_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (db_file, path) = scratch_db()?;
    let pool = BufferPoolManager::new(pool_size, path)?;
    Ok((Arc::new(pool), db_file))
}

/// Sharded buffer pool over a scratch database
#[allow(dead_code)]
pub fn scratch_parallel_pool(
    num_instances: usize,
    pool_size: usize,
) -> Result<(Arc<ParallelBufferPoolManager>, NamedTempFile)> {
    let (db_file, path) = scratch_db()?;
    let pool = ParallelBufferPoolManager::new(num_instances, pool_size, path)?;
    Ok((Arc::new(pool), db_file))
}

/// Hash table with an identity hash and tiny buckets, so splits and merges
/// happen after a handful of inserts instead of hundreds
#[allow(dead_code)]
pub fn tiny_hash_table(bucket_capacity: usize) -> Result<(ExtendibleHashTable, NamedTempFile)> {
    let (pool, db_file) = scratch_pool(32)?;
    let table = ExtendibleHashTable::with_config(
        pool,
        HashTableConfig {
            bucket_capacity,
            hash_fn: |key| key,
        },
    )?;
    Ok((table, db_file))
}
