use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::common::{BufferPoolConfig, PageId, RecordId, Result, StrataError, TableId};
use crate::storage::{HeapFile, Page};
use crate::transaction::{LockManager, Permissions, TransactionId};
use crate::tuple::Tuple;

use super::LruKReplacer;

/// Shared handle to a resident page.
pub type PageRef = Arc<RwLock<Page>>;

/// Hook invoked before a dirty page is written back to its file.
///
/// The log receives the page as of its last snapshot and its current
/// contents. An error from the log stops the write.
pub trait PageLog: Send + Sync {
    fn log_write(&self, txn: TransactionId, before: &Page, after: &Page) -> Result<()>;
}

/// BufferPool caches table pages in memory and mediates all transactional
/// access to them.
///
/// Every fetch first takes the page lock for the requesting transaction
/// through the [`LockManager`], then returns the resident page, loading it
/// from its [`HeapFile`] on a miss. The pool is no-steal: a dirty page is
/// never evicted and never written back before its transaction commits.
/// A clean page that a transaction has locked for writing is not evicted
/// either. When the pool is full and no page is evictable, loading another
/// page fails with [`StrataError::CacheExhausted`].
///
/// Lock order: the resident-page mutex may be taken while holding no page
/// guard; page guards are never held while taking it.
pub struct BufferPool {
    /// Maximum number of resident pages
    capacity: usize,
    /// Resident pages
    pages: Mutex<HashMap<PageId, PageRef>>,
    /// Victim selection among clean pages
    replacer: LruKReplacer,
    /// Backing file of every registered table
    tables: RwLock<HashMap<TableId, Arc<HeapFile>>>,
    /// Page locks
    lock_manager: LockManager,
    /// Optional write-ahead hook
    log: Option<Arc<dyn PageLog>>,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig) -> Self {
        Self {
            capacity: config.capacity,
            pages: Mutex::new(HashMap::with_capacity(config.capacity)),
            replacer: LruKReplacer::new(config.lru_k),
            tables: RwLock::new(HashMap::new()),
            lock_manager: LockManager::with_wait_timeout(config.lock_wait_timeout),
            log: None,
        }
    }

    /// Installs a log that sees every page write.
    pub fn with_log(mut self, log: Arc<dyn PageLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Registers a table's backing file.
    pub fn add_table(&self, file: HeapFile) -> Result<Arc<HeapFile>> {
        let table_id = file.table_id();
        let mut tables = self.tables.write();
        if tables.contains_key(&table_id) {
            return Err(StrataError::TableAlreadyExists(table_id));
        }
        let file = Arc::new(file);
        tables.insert(table_id, file.clone());
        debug!(%table_id, "registered table");
        Ok(file)
    }

    pub fn table(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.tables
            .read()
            .get(&table_id)
            .cloned()
            .ok_or(StrataError::TableNotFound(table_id))
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.pages.lock().contains_key(&page_id)
    }

    /// Pages `txn` currently holds locks on.
    pub fn held_pages(&self, txn: TransactionId) -> Vec<PageId> {
        self.lock_manager.locks_held(txn)
    }

    /// Locks `page_id` for `txn` with `perm` and returns the page.
    ///
    /// Blocks while another transaction holds a conflicting lock. Fails with
    /// [`StrataError::TransactionAborted`] if waiting would deadlock; the
    /// caller must then abort the transaction.
    pub fn fetch_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<PageRef> {
        let file = self.table(page_id.table_id())?;
        self.lock_manager.acquire(txn, page_id, perm)?;

        if let Some(page) = self.pages.lock().get(&page_id).cloned() {
            self.replacer.record_access(page_id);
            return Ok(page);
        }

        let loaded = file.read_page(page_id)?;

        let mut pages = self.pages.lock();
        if let Some(page) = pages.get(&page_id).cloned() {
            // Another reader loaded it first.
            self.replacer.record_access(page_id);
            return Ok(page);
        }
        if pages.len() >= self.capacity {
            self.evict_locked(&mut pages)?;
        }

        let page = Arc::new(RwLock::new(loaded));
        pages.insert(page_id, page.clone());
        self.replacer.record_access(page_id);
        Ok(page)
    }

    /// Drops `txn`'s lock on `page_id` before the transaction ends.
    ///
    /// Only safe for pages the transaction has not modified and whose
    /// contents it does not depend on.
    pub fn release_page(&self, txn: TransactionId, page_id: PageId) {
        self.lock_manager.release(txn, page_id);
    }

    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_lock(txn, page_id)
    }

    /// Inserts `tuple` into `table_id` on behalf of `txn`.
    pub fn insert_tuple(
        &self,
        txn: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> Result<RecordId> {
        let file = self.table(table_id)?;
        let (record_id, dirtied) = file.insert_tuple(self, txn, tuple)?;
        for page in dirtied {
            self.put_dirty(txn, page)?;
        }
        Ok(record_id)
    }

    /// Deletes `tuple` (located by its record id) on behalf of `txn`.
    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(StrataError::MissingRecordId)?;
        let file = self.table(record_id.page_id.table_id())?;
        let dirtied = file.delete_tuple(self, txn, tuple)?;
        for page in dirtied {
            self.put_dirty(txn, page)?;
        }
        Ok(())
    }

    /// Marks a modified page dirty and makes it the resident copy, replacing
    /// any stale one.
    fn put_dirty(&self, txn: TransactionId, page: PageRef) -> Result<()> {
        let page_id = {
            let mut guard = page.write();
            guard.mark_dirty(txn);
            guard.id()
        };

        let mut pages = self.pages.lock();
        match pages.get(&page_id) {
            Some(resident) if Arc::ptr_eq(resident, &page) => {}
            Some(_) => {
                pages.insert(page_id, page);
            }
            None => {
                if pages.len() >= self.capacity {
                    self.evict_locked(&mut pages)?;
                }
                pages.insert(page_id, page);
            }
        }
        self.replacer.record_access(page_id);
        Ok(())
    }

    /// Writes back every page `txn` dirtied, then releases all of its locks.
    ///
    /// If a write fails the error is returned and the locks stay held; the
    /// caller is expected to abort.
    pub fn commit(&self, txn: TransactionId) -> Result<()> {
        let mut flushed = 0;
        for page_id in self.lock_manager.locks_held(txn) {
            let Some(page) = self.pages.lock().get(&page_id).cloned() else {
                continue;
            };
            let mut guard = page.write();
            if guard.is_dirty().is_some() {
                self.write_back(txn, &mut guard)?;
                flushed += 1;
            }
        }

        self.lock_manager.release_all(txn);
        debug!(%txn, flushed, "committed");
        Ok(())
    }

    /// Restores every page `txn` dirtied from disk, then releases all of its
    /// locks. Locks are released even if a restore fails; a page that could
    /// not be reloaded is dropped from the pool instead.
    pub fn abort(&self, txn: TransactionId) -> Result<()> {
        let mut first_error = None;
        let mut restored = 0;

        for page_id in self.lock_manager.locks_held(txn) {
            let Some(page) = self.pages.lock().get(&page_id).cloned() else {
                continue;
            };
            if page.read().is_dirty().is_none() {
                continue;
            }

            match self
                .table(page_id.table_id())
                .and_then(|file| file.read_page(page_id))
            {
                Ok(fresh) => {
                    *page.write() = fresh;
                    restored += 1;
                }
                Err(e) => {
                    warn!(%txn, %page_id, error = %e, "could not reload page during abort");
                    self.discard_page(page_id);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.lock_manager.release_all(txn);
        debug!(%txn, restored, "aborted");
        first_error.map_or(Ok(()), Err)
    }

    /// Commits or aborts `txn`.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> Result<()> {
        if commit {
            self.commit(txn)
        } else {
            self.abort(txn)
        }
    }

    /// Removes a page from the pool without writing it back.
    pub fn discard_page(&self, page_id: PageId) {
        if self.pages.lock().remove(&page_id).is_some() {
            self.replacer.remove(page_id);
            debug!(%page_id, "discarded page");
        }
    }

    /// Writes a resident page back if it is dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let Some(page) = self.pages.lock().get(&page_id).cloned() else {
            return Ok(());
        };
        let mut guard = page.write();
        if let Some(txn) = guard.is_dirty() {
            self.write_back(txn, &mut guard)?;
        }
        Ok(())
    }

    /// Writes back every dirty resident page, regardless of which
    /// transaction dirtied it, and syncs every table file. Meant for
    /// checkpoints and tests; it bypasses the no-steal rule.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.pages.lock().keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }

        let files: Vec<Arc<HeapFile>> = self.tables.read().values().cloned().collect();
        for file in files {
            file.sync()?;
        }
        Ok(())
    }

    /// Evicts one clean page and returns its id.
    pub fn evict_page(&self) -> Result<PageId> {
        let mut pages = self.pages.lock();
        self.evict_locked(&mut pages)
    }

    fn write_back(&self, txn: TransactionId, page: &mut Page) -> Result<()> {
        let page_id = page.id();
        let file = self.table(page_id.table_id())?;
        if let Some(log) = &self.log {
            let before = page.before_image()?;
            log.log_write(txn, &before, page)?;
        }
        file.write_page(page)?;
        page.mark_clean();
        page.set_before_image();
        debug!(%txn, %page_id, "flushed page");
        Ok(())
    }

    /// Chooses a clean victim and drops it. Pages whose guard is held right
    /// now are skipped, and so are pages some transaction holds exclusively:
    /// the holder may still modify its handle and expects commit to find it.
    ///
    /// Takes the lock table's mutex while the page map is locked; the lock
    /// manager never touches the page map, so the order is fixed.
    fn evict_locked(&self, pages: &mut HashMap<PageId, PageRef>) -> Result<PageId> {
        let victim = self.replacer.evict_where(|page_id| {
            if self.lock_manager.page_mode(page_id) == Some(Permissions::ReadWrite) {
                return false;
            }
            pages
                .get(&page_id)
                .and_then(|page| page.try_read().map(|guard| guard.is_dirty().is_none()))
                .unwrap_or(false)
        });

        match victim {
            Some(page_id) => {
                pages.remove(&page_id);
                debug!(%page_id, "evicted page");
                Ok(page_id)
            }
            None => {
                warn!(
                    capacity = self.capacity,
                    resident = pages.len(),
                    "no evictable page"
                );
                Err(StrataError::CacheExhausted {
                    capacity: self.capacity,
                })
            }
        }
    }
}
