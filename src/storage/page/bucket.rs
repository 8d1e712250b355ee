use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{IndexKey, Page, Rid, PAGE_SIZE};

/// Bytes of one (key, value) pair
const PAIR_SIZE: usize = 8;

/// Number of (key, value) pairs a bucket page can hold. Each pair also
/// needs one occupied bit and one readable bit, hence the /(4*pair + 1).
pub const BUCKET_ARRAY_SIZE: usize = (4 * PAGE_SIZE) / (4 * PAIR_SIZE + 1);

const BITMAP_SIZE: usize = (BUCKET_ARRAY_SIZE + 7) / 8;
const OCCUPIED_OFFSET: usize = 0;
const READABLE_OFFSET: usize = BITMAP_SIZE;
const ARRAY_OFFSET: usize = 2 * BITMAP_SIZE;

/// Accessors over a hash bucket page.
///
/// Layout: `occupied bitmap | readable bitmap | array of (key, value)`.
/// The occupied bit stays set after a removal so probes know not to stop
/// at the tombstone; the readable bit marks live pairs.
pub struct BucketPage;

impl BucketPage {
    /// Collect the values stored under a key. The scan stops at the first
    /// never-occupied slot.
    pub fn get_value(page: &Page, key: IndexKey) -> Vec<Rid> {
        let mut result = Vec::new();
        for i in 0..BUCKET_ARRAY_SIZE {
            if !Self::is_readable(page, i) {
                if !Self::is_occupied(page, i) {
                    break;
                }
                continue;
            }
            if Self::key_at(page, i) == key {
                result.push(Self::value_at(page, i));
            }
        }
        result
    }

    /// Insert a pair into the first free slot. Returns false when the page
    /// is full or the exact (key, value) pair is already present.
    pub fn insert(page: &mut Page, key: IndexKey, value: Rid) -> bool {
        if Self::is_full(page) {
            return false;
        }
        if Self::get_value(page, key).contains(&value) {
            return false;
        }

        for i in 0..BUCKET_ARRAY_SIZE {
            if !Self::is_readable(page, i) {
                let at = ARRAY_OFFSET + PAIR_SIZE * i;
                LittleEndian::write_u32(&mut page.data[at..at + 4], key);
                LittleEndian::write_u32(&mut page.data[at + 4..at + 8], value);
                Self::set_occupied(page, i, true);
                Self::set_readable(page, i, true);
                return true;
            }
        }
        false
    }

    /// Remove the slot holding the exact (key, value) pair
    pub fn remove(page: &mut Page, key: IndexKey, value: Rid) -> bool {
        for i in 0..BUCKET_ARRAY_SIZE {
            if !Self::is_readable(page, i) {
                if !Self::is_occupied(page, i) {
                    break;
                }
                continue;
            }
            if Self::key_at(page, i) == key && Self::value_at(page, i) == value {
                Self::set_readable(page, i, false);
                return true;
            }
        }
        false
    }

    /// Clear a slot by index, leaving the occupied bit as a tombstone
    pub fn remove_at(page: &mut Page, bucket_idx: usize) {
        Self::set_occupied(page, bucket_idx, true);
        Self::set_readable(page, bucket_idx, false);
    }

    pub fn key_at(page: &Page, bucket_idx: usize) -> IndexKey {
        let at = ARRAY_OFFSET + PAIR_SIZE * bucket_idx;
        LittleEndian::read_u32(&page.data[at..at + 4])
    }

    pub fn value_at(page: &Page, bucket_idx: usize) -> Rid {
        let at = ARRAY_OFFSET + PAIR_SIZE * bucket_idx;
        LittleEndian::read_u32(&page.data[at + 4..at + 8])
    }

    pub fn is_occupied(page: &Page, bucket_idx: usize) -> bool {
        page.data[OCCUPIED_OFFSET + bucket_idx / 8] >> (bucket_idx % 8) & 1 == 1
    }

    pub fn is_readable(page: &Page, bucket_idx: usize) -> bool {
        page.data[READABLE_OFFSET + bucket_idx / 8] >> (bucket_idx % 8) & 1 == 1
    }

    pub fn num_readable(page: &Page) -> usize {
        page.data[READABLE_OFFSET..READABLE_OFFSET + BITMAP_SIZE]
            .iter()
            .map(|byte| byte.count_ones() as usize)
            .sum()
    }

    pub fn is_full(page: &Page) -> bool {
        Self::num_readable(page) == BUCKET_ARRAY_SIZE
    }

    pub fn is_empty(page: &Page) -> bool {
        Self::num_readable(page) == 0
    }

    fn set_occupied(page: &mut Page, bucket_idx: usize, bit: bool) {
        let byte = &mut page.data[OCCUPIED_OFFSET + bucket_idx / 8];
        if bit {
            *byte |= 1 << (bucket_idx % 8);
        } else {
            *byte &= !(1 << (bucket_idx % 8));
        }
    }

    fn set_readable(page: &mut Page, bucket_idx: usize, bit: bool) {
        let byte = &mut page.data[READABLE_OFFSET + bucket_idx / 8];
        if bit {
            *byte |= 1 << (bucket_idx % 8);
        } else {
            *byte &= !(1 << (bucket_idx % 8));
        }
    }
}
