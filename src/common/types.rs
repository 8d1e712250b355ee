use std::sync::Arc;
use parking_lot::RwLock;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel for a frame that holds no page. Page ids are allocated from 0
/// upward per buffer pool instance, so the sentinel sits at the top of the
/// range.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Transaction ID type; smaller ids belong to older transactions
pub type TxnId = u32;

/// Record ID type
pub type Rid = u32;

/// Index key type stored by the extendible hash table
pub type IndexKey = u32;

/// Buffer pool frame ID type
pub type FrameId = u32;

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    /// Zero the byte buffer and retag the page
    pub fn reset(&mut self, page_id: PageId) {
        self.data = [0; PAGE_SIZE];
        self.page_id = page_id;
    }
}

/// Smart pointer to a page; the RwLock doubles as the page latch
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub frame_id: FrameId,
    pub is_dirty: bool,
    pub pin_count: u32,
}

impl Frame {
    pub fn new(frame_id: FrameId, page: PagePtr) -> Self {
        Self {
            page,
            frame_id,
            is_dirty: false,
            pin_count: 0,
        }
    }
}

/// Smart pointer to a frame
pub type FramePtr = Arc<RwLock<Frame>>;
