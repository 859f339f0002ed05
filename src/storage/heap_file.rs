use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::{BufferPool, PageRef};
use crate::common::{page_size, PageId, RecordId, Result, StrataError, TableId};
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::page::{HeapPage, Page};
use crate::transaction::{Permissions, TransactionId};
use crate::tuple::{Schema, Tuple};

/// An unordered collection of tuples stored as a sequence of heap pages in
/// one backing file.
///
/// Page geometry is fixed when the file is opened: the process-wide page
/// size at that moment is used for every read, write and append.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    page_size: usize,
    scheduler: DiskScheduler,
}

impl HeapFile {
    /// Opens (or creates) the heap file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, table_id: TableId, schema: Arc<Schema>) -> Result<Self> {
        let page_size = page_size();
        let disk_manager = Arc::new(DiskManager::new(path, page_size)?);
        debug!(
            %table_id,
            pages = disk_manager.num_pages(),
            page_size,
            "opened heap file"
        );
        Ok(Self {
            table_id,
            schema,
            page_size,
            scheduler: DiskScheduler::new(disk_manager),
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> u32 {
        self.scheduler.disk_manager().num_pages()
    }

    /// Disk manager behind this file, for I/O statistics.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.scheduler.disk_manager()
    }

    fn check_page(&self, page_id: PageId) -> Result<()> {
        if page_id.table_id() != self.table_id {
            return Err(StrataError::TableNotFound(page_id.table_id()));
        }
        let num_pages = self.num_pages();
        if page_id.page_no() >= num_pages {
            return Err(StrataError::PageOutOfRange { page_id, num_pages });
        }
        Ok(())
    }

    /// Reads and decodes a page from disk, bypassing the buffer pool.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        self.check_page(page_id)?;
        let data = self.scheduler.read_page(page_id.page_no())?;
        HeapPage::decode(page_id, self.schema.clone(), &data, self.page_size).map(Page::Heap)
    }

    /// Writes a page's current contents to disk.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        let page_id = page.id();
        self.check_page(page_id)?;
        self.scheduler.write_page(page_id.page_no(), page.page_data())
    }

    /// Forces written pages to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.scheduler.disk_manager().sync()
    }

    /// Appends a zero-initialized page and returns its id.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_no = self.scheduler.disk_manager().allocate_page()?;
        let page_id = PageId::new(self.table_id, page_no);
        debug!(%page_id, "appended page");
        Ok(page_id)
    }

    /// Inserts `tuple` into the first page with a free slot, appending a page
    /// when every existing page is full. Returns the new location and the
    /// pages that were modified.
    ///
    /// Pages are inspected under a shared lock and only upgraded once a free
    /// slot is confirmed. Shared locks on full pages are dropped again unless
    /// the transaction already held them.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: Tuple,
    ) -> Result<(RecordId, Vec<PageRef>)> {
        if **tuple.schema() != *self.schema {
            return Err(StrataError::SchemaMismatch(PageId::new(self.table_id, 0)));
        }

        for page_no in 0..self.num_pages() {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(txn, page_id);

            let page = pool.fetch_page(txn, page_id, Permissions::ReadOnly)?;
            let has_room = page.read().as_heap().num_empty_slots() > 0;
            if !has_room {
                if !held_before {
                    pool.release_page(txn, page_id);
                }
                continue;
            }

            let page = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
            let record_id = Self::insert_into(&page, txn, tuple)?;
            return Ok((record_id, vec![page]));
        }

        let page_id = self.allocate_page()?;
        let page = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
        let record_id = Self::insert_into(&page, txn, tuple)?;
        Ok((record_id, vec![page]))
    }

    fn insert_into(page: &PageRef, txn: TransactionId, tuple: Tuple) -> Result<RecordId> {
        let mut guard = page.write();
        let record_id = guard.as_heap_mut().insert_tuple(tuple)?;
        guard.mark_dirty(txn);
        Ok(record_id)
    }

    /// Deletes `tuple` from the page its record id points at. Returns the
    /// modified pages.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(StrataError::MissingRecordId)?;
        let page_id = record_id.page_id;
        if page_id.table_id() != self.table_id {
            return Err(StrataError::TupleNotOnPage {
                record_id,
                page_id: PageId::new(self.table_id, 0),
            });
        }

        let page = pool.fetch_page(txn, page_id, Permissions::ReadOnly)?;
        {
            let guard = page.read();
            let heap = guard.as_heap();
            let slot = record_id.slot_id.as_usize();
            if slot >= heap.num_slots() {
                return Err(StrataError::TupleNotOnPage { record_id, page_id });
            }
            if !heap.is_slot_used(slot) {
                return Err(StrataError::SlotAlreadyEmpty {
                    page_id,
                    slot_id: record_id.slot_id,
                });
            }
        }

        let page = pool.fetch_page(txn, page_id, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.as_heap_mut().delete_tuple(tuple)?;
            guard.mark_dirty(txn);
        }
        Ok(vec![page])
    }

    /// Iterates over the file's tuples in page and slot order. Pages are
    /// fetched under shared locks one at a time, as the iterator reaches
    /// them.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, txn: TransactionId) -> HeapFileIter<'a> {
        HeapFileIter {
            file: self,
            pool,
            txn,
            next_page: 0,
            current: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// Reads every tuple of the file under shared locks.
    pub fn scan(&self, pool: &BufferPool, txn: TransactionId) -> Result<Vec<Tuple>> {
        self.iter(pool, txn).collect()
    }
}

/// Lazy scan over a [`HeapFile`], returned by [`HeapFile::iter`].
///
/// Holds the tuples of one page at a time. After an error the iterator is
/// exhausted until [`rewind`](HeapFileIter::rewind) is called.
pub struct HeapFileIter<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    txn: TransactionId,
    next_page: u32,
    current: std::vec::IntoIter<Tuple>,
    failed: bool,
}

impl HeapFileIter<'_> {
    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = Vec::new().into_iter();
        self.failed = false;
    }
}

impl Iterator for HeapFileIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.current.next() {
                return Some(Ok(tuple));
            }
            // Pages appended during the scan are picked up.
            if self.failed || self.next_page >= self.file.num_pages() {
                return None;
            }

            let page_id = PageId::new(self.file.table_id, self.next_page);
            self.next_page += 1;
            match self.pool.fetch_page(self.txn, page_id, Permissions::ReadOnly) {
                Ok(page) => {
                    let tuples: Vec<Tuple> = page.read().as_heap().iter().cloned().collect();
                    self.current = tuples.into_iter();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
