use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;

use crate::common::types::{Page, PageId, INVALID_PAGE_ID};

/// Number of directory slots; the directory always occupies a single page,
/// so it grows in powers of two up to this bound.
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Depth ceiling implied by the directory size (2^9 = 512)
pub const MAX_GLOBAL_DEPTH: u32 = 9;

const GLOBAL_DEPTH_OFFSET: usize = 0;
const LOCAL_DEPTHS_OFFSET: usize = 4;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;
const PAGE_ID_OFFSET: usize = BUCKET_PAGE_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE;

/// Directory page of the extendible hash table.
///
/// Deserialized from its page for manipulation and written back before the
/// page is unpinned dirty. Layout:
/// `global_depth (u32) | local_depths ([u8; 512]) | bucket_page_ids ([u32; 512]) | page_id (u32)`.
pub struct HashDirectoryPage {
    page_id: PageId,
    global_depth: u32,
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
}

impl HashDirectoryPage {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            global_depth: 0,
            local_depths: [0; DIRECTORY_ARRAY_SIZE],
            bucket_page_ids: [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE],
        }
    }

    pub fn from_page(page: &Page) -> Self {
        let data = &page.data;
        let global_depth = LittleEndian::read_u32(&data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]);

        let mut local_depths = [0u8; DIRECTORY_ARRAY_SIZE];
        local_depths.copy_from_slice(&data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE]);

        let mut bucket_page_ids = [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE];
        for (i, id) in bucket_page_ids.iter_mut().enumerate() {
            let at = BUCKET_PAGE_IDS_OFFSET + 4 * i;
            *id = LittleEndian::read_u32(&data[at..at + 4]);
        }

        let page_id = LittleEndian::read_u32(&data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]);

        Self {
            page_id,
            global_depth,
            local_depths,
            bucket_page_ids,
        }
    }

    pub fn write_to(&self, page: &mut Page) {
        let data = &mut page.data;
        LittleEndian::write_u32(&mut data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4], self.global_depth);
        data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE].copy_from_slice(&self.local_depths);
        for (i, &id) in self.bucket_page_ids.iter().enumerate() {
            let at = BUCKET_PAGE_IDS_OFFSET + 4 * i;
            LittleEndian::write_u32(&mut data[at..at + 4], id);
        }
        LittleEndian::write_u32(&mut data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4], self.page_id);
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Mask selecting the low `global_depth` bits of a hash
    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth) - 1
    }

    /// Current number of addressable slots
    pub fn size(&self) -> usize {
        1 << self.global_depth
    }

    /// Double the directory, duplicating each existing slot into its image
    /// in the upper half.
    pub fn incr_global_depth(&mut self) {
        assert!(self.global_depth < MAX_GLOBAL_DEPTH, "directory page is full");
        let old_size = self.size();
        for i in 0..old_size {
            self.bucket_page_ids[old_size + i] = self.bucket_page_ids[i];
            self.local_depths[old_size + i] = self.local_depths[i];
        }
        self.global_depth += 1;
    }

    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth > 0, "cannot shrink an empty directory");
        self.global_depth -= 1;
    }

    /// The directory may halve only when every bucket uses strictly fewer
    /// bits than the directory does.
    pub fn can_shrink(&self) -> bool {
        self.global_depth > 0
            && (0..self.size()).all(|i| (self.local_depths[i] as u32) < self.global_depth)
    }

    pub fn local_depth(&self, bucket_idx: usize) -> u32 {
        self.local_depths[bucket_idx] as u32
    }

    pub fn set_local_depth(&mut self, bucket_idx: usize, depth: u32) {
        debug_assert!(depth <= self.global_depth);
        self.local_depths[bucket_idx] = depth as u8;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: usize) {
        let depth = self.local_depth(bucket_idx) + 1;
        self.set_local_depth(bucket_idx, depth);
    }

    pub fn decr_local_depth(&mut self, bucket_idx: usize) {
        let depth = self.local_depth(bucket_idx);
        debug_assert!(depth > 0);
        self.local_depths[bucket_idx] = (depth - 1) as u8;
    }

    /// Mask selecting the low `local_depth` bits for a slot
    pub fn local_depth_mask(&self, bucket_idx: usize) -> u32 {
        (1 << self.local_depth(bucket_idx)) - 1
    }

    pub fn bucket_page_id(&self, bucket_idx: usize) -> PageId {
        self.bucket_page_ids[bucket_idx]
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: usize, page_id: PageId) {
        self.bucket_page_ids[bucket_idx] = page_id;
    }

    /// The slot reached by flipping bit `local_depth - 1` of the index
    pub fn split_image_index(&self, bucket_idx: usize) -> usize {
        let depth = self.local_depth(bucket_idx);
        debug_assert!(depth > 0);
        bucket_idx ^ (1 << (depth - 1))
    }

    /// Check the directory invariants; panics on violation.
    ///
    /// 1. Every local depth is at most the global depth.
    /// 2. All slots that point at one bucket page agree on its local depth.
    /// 3. Each bucket page is referenced by exactly `2^(global - local)`
    ///    slots.
    pub fn verify_integrity(&self) {
        let mut page_id_count: HashMap<PageId, u32> = HashMap::new();
        let mut page_id_depth: HashMap<PageId, u32> = HashMap::new();

        for i in 0..self.size() {
            let depth = self.local_depth(i);
            assert!(
                depth <= self.global_depth,
                "local depth {} at slot {} exceeds global depth {}",
                depth,
                i,
                self.global_depth
            );

            let page_id = self.bucket_page_id(i);
            *page_id_count.entry(page_id).or_insert(0) += 1;

            match page_id_depth.get(&page_id) {
                Some(&known) => assert_eq!(
                    known, depth,
                    "slots sharing bucket page {} disagree on local depth",
                    page_id
                ),
                None => {
                    page_id_depth.insert(page_id, depth);
                }
            }
        }

        for (page_id, count) in page_id_count {
            let depth = page_id_depth[&page_id];
            let expected = 1u32 << (self.global_depth - depth);
            assert_eq!(
                count, expected,
                "bucket page {} referenced by {} slots, expected {}",
                page_id, count, expected
            );
        }
    }
}
