use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Page, PageId, PagePtr, Frame, FrameId, FramePtr, INVALID_PAGE_ID};
use crate::storage::disk::DiskManager;
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;

/// Bookkeeping shared by every operation; the mutex around it makes all
/// buffer pool operations linearizable, including the disk I/O they issue.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
    next_page_id: PageId,
}

/// A single buffer pool instance.
///
/// When used standalone it manages every page; as one shard of a
/// `ParallelBufferPoolManager` it only allocates page ids congruent to its
/// instance index modulo the instance count.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    frames: Vec<FramePtr>,
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Create a standalone buffer pool backed by the given database file
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_instance(pool_size, 1, 0, disk_manager))
    }

    /// Create one instance of a parallel buffer pool sharing a disk manager
    pub fn with_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "buffer pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
            frames.push(Arc::new(RwLock::new(Frame::new(frame_id, page))));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
                next_page_id: instance_index,
            }),
            disk_manager,
        }
    }

    /// Allocate a fresh page and pin it in a frame.
    ///
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self
            .find_fresh_frame(&mut state)?
            .ok_or(BufferPoolError::BufferPoolFull)?;
        let page_id = Self::allocate_page_id(&mut state, self.num_instances, self.instance_index);

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            page_guard.reset(page_id);
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        state.page_table.insert(page_id, frame_id);
        Ok((frame_guard.page.clone(), page_id))
    }

    /// Fetch a page from the buffer pool or disk, pinning it
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "cannot fetch the invalid page id".to_string(),
            ));
        }

        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.get(&page_id).copied() {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            state.replacer.pin(frame_id);
            return Ok(frame_guard.page.clone());
        }

        let frame_id = self
            .find_fresh_frame(&mut state)?
            .ok_or(BufferPoolError::BufferPoolFull)?;

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let mut page_guard = frame_guard.page.write();
            self.disk_manager.read_page(page_id, &mut page_guard)?;
        }
        frame_guard.pin_count = 1;
        frame_guard.is_dirty = false;

        state.page_table.insert(page_id, frame_id);
        Ok(frame_guard.page.clone())
    }

    /// Drop one pin on a page. The dirty hint ORs into the frame's dirty
    /// flag; only a flush clears it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();

        if frame_guard.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        frame_guard.pin_count -= 1;
        if is_dirty {
            frame_guard.is_dirty = true;
        }

        if frame_guard.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Write a page to disk unconditionally and mark it clean
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &self.frames[frame_id as usize];
        let mut frame_guard = frame.write();
        {
            let page_guard = frame_guard.page.read();
            self.disk_manager.write_page(&page_guard)?;
        }
        frame_guard.is_dirty = false;
        Ok(())
    }

    /// Flush every resident page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        for &frame_id in state.page_table.values() {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();
            {
                let page_guard = frame_guard.page.read();
                self.disk_manager.write_page(&page_guard)?;
            }
            frame_guard.is_dirty = false;
        }
        Ok(())
    }

    /// Remove a page from the pool and hand its storage back to the disk
    /// manager. Succeeds trivially when the page is not resident; fails when
    /// the page is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        if let Some(frame_id) = state.page_table.get(&page_id).copied() {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();

            if frame_guard.pin_count > 0 {
                return Err(BufferPoolError::PagePinned(page_id));
            }

            state.page_table.remove(&page_id);
            state.replacer.pin(frame_id);
            {
                let mut page_guard = frame_guard.page.write();
                page_guard.reset(INVALID_PAGE_ID);
            }
            frame_guard.is_dirty = false;
            state.free_list.push_back(frame_id);
        }

        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Whether the page currently occupies a frame
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id as usize].read().pin_count)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Claim a frame: free list first, then an eviction victim. The victim
    /// is flushed if dirty and dropped from the page table before reuse.
    fn find_fresh_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        if let Some(frame_id) = state.replacer.victim() {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();

            let old_page_id = frame_guard.page.read().page_id;
            if frame_guard.is_dirty {
                let page_guard = frame_guard.page.read();
                self.disk_manager.write_page(&page_guard)?;
            }
            frame_guard.is_dirty = false;

            if old_page_id != INVALID_PAGE_ID {
                state.page_table.remove(&old_page_id);
                debug!("evicted page {} from frame {}", old_page_id, frame_id);
            }
            return Ok(Some(frame_id));
        }

        Ok(None)
    }

    /// Per-instance page id sequence: instance `k` of `N` hands out ids
    /// congruent to `k` modulo `N`.
    fn allocate_page_id(state: &mut PoolState, num_instances: u32, instance_index: u32) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += num_instances;
        assert_eq!(
            page_id % num_instances,
            instance_index,
            "allocated page id must shard back to this instance"
        );
        page_id
    }
}
