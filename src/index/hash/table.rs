use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::types::{IndexKey, Page, PageId, Rid};
use crate::index::hash::error::HashTableError;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{BucketPage, HashDirectoryPage, BUCKET_ARRAY_SIZE, MAX_GLOBAL_DEPTH};

/// Default key hash, a 32-bit avalanche mix
fn mix_hash(key: IndexKey) -> u32 {
    let mut h = key;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Tuning knobs for the hash table. Tests shrink the bucket capacity to
/// exercise splits without hundreds of inserts, and swap the hash function
/// for an identity to make bucket placement predictable.
pub struct HashTableConfig {
    pub bucket_capacity: usize,
    pub hash_fn: fn(IndexKey) -> u32,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: BUCKET_ARRAY_SIZE,
            hash_fn: mix_hash,
        }
    }
}

/// Disk-backed extendible hash table.
///
/// The directory and every bucket live in buffer pool pages; nothing is
/// cached outside of them. A table-level reader/writer latch serializes
/// structural changes (split, merge) against ordinary reads and writes,
/// and each bucket's page latch guards its contents.
pub struct ExtendibleHashTable {
    buffer_pool: Arc<BufferPoolManager>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    bucket_capacity: usize,
    hash_fn: fn(IndexKey) -> u32,
}

impl ExtendibleHashTable {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HashTableError> {
        Self::with_config(buffer_pool, HashTableConfig::default())
    }

    /// Create a table with one directory page and two depth-1 buckets
    pub fn with_config(
        buffer_pool: Arc<BufferPoolManager>,
        config: HashTableConfig,
    ) -> Result<Self, HashTableError> {
        assert!(
            config.bucket_capacity > 0 && config.bucket_capacity <= BUCKET_ARRAY_SIZE,
            "bucket capacity must fit the bucket page"
        );

        let (directory_page, directory_page_id) = buffer_pool.new_page()?;
        let (_, bucket0_page_id) = buffer_pool.new_page()?;
        let (_, bucket1_page_id) = buffer_pool.new_page()?;

        let mut directory = HashDirectoryPage::new(directory_page_id);
        directory.incr_global_depth();
        directory.set_bucket_page_id(0, bucket0_page_id);
        directory.set_local_depth(0, 1);
        directory.set_bucket_page_id(1, bucket1_page_id);
        directory.set_local_depth(1, 1);
        {
            let mut page_guard = directory_page.write();
            directory.write_to(&mut page_guard);
        }

        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket0_page_id, false)?;
        buffer_pool.unpin_page(bucket1_page_id, false)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            bucket_capacity: config.bucket_capacity,
            hash_fn: config.hash_fn,
        })
    }

    fn dir_index(&self, directory: &HashDirectoryPage, key: IndexKey) -> usize {
        ((self.hash_fn)(key) & directory.global_depth_mask()) as usize
    }

    fn is_bucket_full(&self, page: &Page) -> bool {
        BucketPage::num_readable(page) >= self.bucket_capacity
    }

    /// Look up every value stored under a key
    pub fn get(&self, key: IndexKey) -> Result<Vec<Rid>, HashTableError> {
        let _table_guard = self.table_latch.read();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectoryPage::from_page(&directory_page.read());

        let bucket_idx = self.dir_index(&directory, key);
        let bucket_page_id = directory.bucket_page_id(bucket_idx);
        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

        let result = BucketPage::get_value(&bucket_page.read(), key);

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(result)
    }

    /// Insert a (key, value) pair, splitting the target bucket as needed.
    /// Returns false when the exact pair is already present.
    pub fn insert(&self, key: IndexKey, value: Rid) -> Result<bool, HashTableError> {
        {
            let _table_guard = self.table_latch.read();

            let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let directory = HashDirectoryPage::from_page(&directory_page.read());

            let bucket_idx = self.dir_index(&directory, key);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut bucket_guard = bucket_page.write();
            if !self.is_bucket_full(&bucket_guard) {
                let inserted = BucketPage::insert(&mut bucket_guard, key, value);
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Ok(inserted);
            }

            // Full bucket: drop the shared latch and retry structurally
            drop(bucket_guard);
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        }

        self.split_insert(key, value)
    }

    /// Insert under the exclusive table latch, splitting the target bucket
    /// until the pair fits. One split may not be enough when many keys
    /// collide in the low bits, so the loop re-resolves the target each
    /// round; the directory depth ceiling bounds it.
    fn split_insert(&self, key: IndexKey, value: Rid) -> Result<bool, HashTableError> {
        let _table_guard = self.table_latch.write();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory = HashDirectoryPage::from_page(&directory_page.read());
        let mut directory_dirty = false;

        let inserted = loop {
            let bucket_idx = self.dir_index(&directory, key);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut bucket_guard = bucket_page.write();
            if !self.is_bucket_full(&bucket_guard) {
                let inserted = BucketPage::insert(&mut bucket_guard, key, value);
                drop(bucket_guard);
                self.buffer_pool.unpin_page(bucket_page_id, inserted)?;
                break inserted;
            }

            if directory.local_depth(bucket_idx) == directory.global_depth() {
                if directory.global_depth() >= MAX_GLOBAL_DEPTH {
                    drop(bucket_guard);
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    if directory_dirty {
                        directory.write_to(&mut directory_page.write());
                    }
                    self.buffer_pool
                        .unpin_page(self.directory_page_id, directory_dirty)?;
                    return Err(HashTableError::DirectoryFull);
                }
                directory.incr_global_depth();
            }

            directory.incr_local_depth(bucket_idx);
            directory_dirty = true;

            let new_local_depth = directory.local_depth(bucket_idx);
            let split_idx = directory.split_image_index(bucket_idx);
            let (new_bucket_page, new_bucket_page_id) = self.buffer_pool.new_page()?;
            let mut new_bucket_guard = new_bucket_page.write();

            // Repoint every slot matching the split image's pattern at the
            // new page; the old bucket's slots keep their page but pick up
            // the deeper local depth.
            let mask = (1u32 << new_local_depth) - 1;
            let new_pattern = split_idx as u32 & mask;
            let old_pattern = bucket_idx as u32 & mask;
            for i in 0..directory.size() {
                if (i as u32 & mask) == new_pattern {
                    directory.set_bucket_page_id(i, new_bucket_page_id);
                    directory.set_local_depth(i, new_local_depth);
                } else if (i as u32 & mask) == old_pattern {
                    directory.set_local_depth(i, new_local_depth);
                }
            }

            // Rehash the old bucket under the deeper mask
            for slot in 0..BUCKET_ARRAY_SIZE {
                if !BucketPage::is_readable(&bucket_guard, slot) {
                    if !BucketPage::is_occupied(&bucket_guard, slot) {
                        break;
                    }
                    continue;
                }
                let slot_key = BucketPage::key_at(&bucket_guard, slot);
                if (self.hash_fn)(slot_key) & mask == new_pattern {
                    let slot_value = BucketPage::value_at(&bucket_guard, slot);
                    BucketPage::insert(&mut new_bucket_guard, slot_key, slot_value);
                    BucketPage::remove_at(&mut bucket_guard, slot);
                }
            }
            debug!(
                "split bucket page {} into page {} at local depth {}",
                bucket_page_id, new_bucket_page_id, new_local_depth
            );

            drop(new_bucket_guard);
            drop(bucket_guard);
            self.buffer_pool.unpin_page(new_bucket_page_id, true)?;
            self.buffer_pool.unpin_page(bucket_page_id, true)?;
        };

        if directory_dirty {
            directory.write_to(&mut directory_page.write());
        }
        self.buffer_pool
            .unpin_page(self.directory_page_id, directory_dirty)?;
        Ok(inserted)
    }

    /// Remove a (key, value) pair. Emptying a bucket triggers a merge scan.
    pub fn remove(&self, key: IndexKey, value: Rid) -> Result<bool, HashTableError> {
        let emptied;
        {
            let _table_guard = self.table_latch.read();

            let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let directory = HashDirectoryPage::from_page(&directory_page.read());

            let bucket_idx = self.dir_index(&directory, key);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;

            let mut bucket_guard = bucket_page.write();
            let removed = BucketPage::remove(&mut bucket_guard, key, value);
            emptied = removed && BucketPage::is_empty(&bucket_guard);
            drop(bucket_guard);

            self.buffer_pool.unpin_page(bucket_page_id, removed)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;

            if !removed {
                return Ok(false);
            }
        }

        if emptied {
            self.merge()?;
        }
        Ok(true)
    }

    /// Collapse empty buckets into their split images.
    ///
    /// Conservative: a pair merges only when both halves sit at the same
    /// local depth, and bucket pages are never handed back to the disk
    /// manager. The directory halves whenever every local depth drops below
    /// the global depth.
    fn merge(&self) -> Result<(), HashTableError> {
        let _table_guard = self.table_latch.write();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory = HashDirectoryPage::from_page(&directory_page.read());
        let mut directory_dirty = false;

        let mut i = 0;
        while i < directory.size() {
            if directory.local_depth(i) > 1 {
                let bucket_page_id = directory.bucket_page_id(i);
                let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
                let empty = BucketPage::is_empty(&bucket_page.read());
                self.buffer_pool.unpin_page(bucket_page_id, false)?;

                if empty {
                    let split_idx = directory.split_image_index(i);
                    let target_page_id = directory.bucket_page_id(split_idx);

                    if directory.local_depth(split_idx) == directory.local_depth(i)
                        && target_page_id != bucket_page_id
                    {
                        directory.decr_local_depth(i);
                        directory.decr_local_depth(split_idx);
                        directory.set_bucket_page_id(i, target_page_id);
                        let merged_depth = directory.local_depth(i);

                        for j in 0..directory.size() {
                            let page_id = directory.bucket_page_id(j);
                            if page_id == bucket_page_id || page_id == target_page_id {
                                directory.set_bucket_page_id(j, target_page_id);
                                directory.set_local_depth(j, merged_depth);
                            }
                        }
                        debug!(
                            "merged empty bucket page {} into page {}",
                            bucket_page_id, target_page_id
                        );
                        directory_dirty = true;

                        if directory.can_shrink() {
                            directory.decr_global_depth();
                        }
                    }
                }
            }
            i += 1;
        }

        if directory_dirty {
            directory.write_to(&mut directory_page.write());
        }
        self.buffer_pool
            .unpin_page(self.directory_page_id, directory_dirty)?;
        Ok(())
    }

    /// Current number of hash bits the directory uses
    pub fn global_depth(&self) -> Result<u32, HashTableError> {
        let _table_guard = self.table_latch.read();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let depth = HashDirectoryPage::from_page(&directory_page.read()).global_depth();
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(depth)
    }

    /// Assert the directory invariants; panics on violation
    pub fn verify_integrity(&self) -> Result<(), HashTableError> {
        let _table_guard = self.table_latch.read();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectoryPage::from_page(&directory_page.read());
        directory.verify_integrity();
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(())
    }
}
