mod heap_page;

pub use heap_page::{header_size, slots_per_page, HeapPage, MAX_SLOTS_PER_PAGE};

use bytes::Bytes;

use crate::common::{PageId, Result};
use crate::transaction::TransactionId;

/// A page resident in the buffer pool.
///
/// The pool only needs identity, dirty state, encoding and the
/// before-image; layout-specific operations go through the variant.
#[derive(Debug, Clone)]
pub enum Page {
    Heap(HeapPage),
}

impl Page {
    pub fn id(&self) -> PageId {
        match self {
            Page::Heap(p) => p.id(),
        }
    }

    pub fn page_data(&self) -> Bytes {
        match self {
            Page::Heap(p) => p.page_data(),
        }
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        match self {
            Page::Heap(p) => p.is_dirty(),
        }
    }

    pub fn mark_dirty(&mut self, txn: TransactionId) {
        match self {
            Page::Heap(p) => p.mark_dirty(txn),
        }
    }

    pub fn mark_clean(&mut self) {
        match self {
            Page::Heap(p) => p.mark_clean(),
        }
    }

    pub fn before_image(&self) -> Result<Page> {
        match self {
            Page::Heap(p) => p.before_image().map(Page::Heap),
        }
    }

    pub fn set_before_image(&mut self) {
        match self {
            Page::Heap(p) => p.set_before_image(),
        }
    }

    pub fn as_heap(&self) -> &HeapPage {
        match self {
            Page::Heap(p) => p,
        }
    }

    pub fn as_heap_mut(&mut self) -> &mut HeapPage {
        match self {
            Page::Heap(p) => p,
        }
    }
}

impl From<HeapPage> for Page {
    fn from(page: HeapPage) -> Self {
        Page::Heap(page)
    }
}
