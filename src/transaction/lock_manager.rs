use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::{DeadlockDetector, PageLock, Permissions, TransactionId};
use crate::common::{PageId, Result, StrataError};

/// Lock table state, guarded by one mutex.
#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, PageLock>,
    held: HashMap<TransactionId, HashSet<PageId>>,
    detector: DeadlockDetector,
}

impl LockTable {
    fn held_mode(&self, txn: TransactionId, page_id: PageId) -> Option<Permissions> {
        self.locks.get(&page_id).and_then(|lock| lock.held_by(txn))
    }

    /// Releases `txn`'s hold on `page_id`. Returns true if something was held.
    fn release_one(&mut self, txn: TransactionId, page_id: PageId) -> bool {
        let released = match self.locks.get_mut(&page_id) {
            Some(lock) => {
                let released = lock.release(txn);
                if lock.is_free() && lock.queue_len() == 0 {
                    self.locks.remove(&page_id);
                }
                released
            }
            None => None,
        };
        self.detector.release(txn, page_id);
        if let Some(pages) = self.held.get_mut(&txn) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&txn);
            }
        }
        if let Some(perm) = released {
            trace!(%txn, %page_id, %perm, "lock released");
        }
        released.is_some()
    }
}

/// Grants page-granularity shared and exclusive locks to transactions.
///
/// A transaction that already holds a covering permission returns at once.
/// Otherwise the request is first checked by the [`DeadlockDetector`]; if
/// admitting it would close a wait-for cycle the requester gets
/// [`StrataError::TransactionAborted`] and nothing changes. Admitted requests
/// block until the page's [`PageLock`] can grant them.
///
/// Locks are held until [`release_all`](LockManager::release_all) (strict
/// two-phase locking), except where a caller deliberately drops a shared
/// lock it did not need with [`release`](LockManager::release).
pub struct LockManager {
    state: Mutex<LockTable>,
    released: Condvar,
    wait_timeout: Option<Duration>,
}

impl LockManager {
    /// Creates a lock manager whose waits never time out.
    pub fn new() -> Self {
        Self::with_wait_timeout(None)
    }

    /// Creates a lock manager. With `Some(timeout)` a request that waits
    /// longer than `timeout` fails with [`StrataError::LockWaitTimeout`].
    pub fn with_wait_timeout(wait_timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            wait_timeout,
        }
    }

    /// Blocks until `txn` holds at least `perm` on `page_id`.
    pub fn acquire(&self, txn: TransactionId, page_id: PageId, perm: Permissions) -> Result<()> {
        let mut table = self.state.lock();

        if table
            .held_mode(txn, page_id)
            .is_some_and(|held| held.covers(perm))
        {
            return Ok(());
        }

        let registered = table.detector.request(txn, page_id, perm)?;
        let deadline = self.wait_timeout.map(|t| Instant::now() + t);
        let mut waited = false;

        loop {
            let lock = table.locks.entry(page_id).or_default();
            if lock.can_grant(txn, perm) {
                lock.grant(txn, perm);
                table.held.entry(txn).or_default().insert(page_id);
                trace!(%txn, %page_id, %perm, waited, "lock granted");
                return Ok(());
            }

            if !waited {
                trace!(%txn, %page_id, %perm, "lock busy, waiting");
            }
            lock.enqueue(txn, perm);
            waited = true;

            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut table, deadline).timed_out() {
                        // A grant may have become possible right at the deadline.
                        let lock = table.locks.entry(page_id).or_default();
                        if lock.can_grant(txn, perm) {
                            continue;
                        }
                        lock.dequeue(txn);
                        if lock.is_free() && lock.queue_len() == 0 {
                            table.locks.remove(&page_id);
                        }
                        if registered {
                            table.detector.withdraw(txn, page_id);
                        }
                        // Requests queued behind this one may now be grantable.
                        self.released.notify_all();
                        debug!(%txn, %page_id, %perm, "lock wait timed out");
                        return Err(StrataError::LockWaitTimeout { txn, page_id });
                    }
                }
                None => self.released.wait(&mut table),
            }
        }
    }

    /// Releases `txn`'s lock on `page_id`, if any.
    pub fn release(&self, txn: TransactionId, page_id: PageId) {
        let mut table = self.state.lock();
        if table.release_one(txn, page_id) {
            self.released.notify_all();
        }
    }

    /// Releases every lock `txn` holds and forgets its wait-for entries.
    pub fn release_all(&self, txn: TransactionId) {
        let mut table = self.state.lock();
        let pages: Vec<PageId> = table
            .held
            .get(&txn)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();

        for page_id in &pages {
            table.release_one(txn, *page_id);
        }
        table.detector.remove_transaction(txn);

        if !pages.is_empty() {
            debug!(%txn, count = pages.len(), "released all locks");
        }
        self.released.notify_all();
    }

    /// Returns true if `txn` holds any lock on `page_id`.
    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.state.lock().held_mode(txn, page_id).is_some()
    }

    /// Returns the permission `txn` holds on `page_id`, if any.
    pub fn granted_permission(&self, txn: TransactionId, page_id: PageId) -> Option<Permissions> {
        self.state.lock().held_mode(txn, page_id)
    }

    /// Pages `txn` holds locks on.
    pub fn locks_held(&self, txn: TransactionId) -> Vec<PageId> {
        self.state
            .lock()
            .held
            .get(&txn)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of requests currently blocked, across all pages.
    pub fn pending_waits(&self) -> usize {
        self.state.lock().locks.values().map(PageLock::queue_len).sum()
    }

    /// The strongest permission currently granted on `page_id` to anyone.
    pub fn page_mode(&self, page_id: PageId) -> Option<Permissions> {
        self.state.lock().locks.get(&page_id).and_then(PageLock::mode)
    }

    /// Reader and writer counts on `page_id`.
    pub fn lock_counts(&self, page_id: PageId) -> (usize, usize) {
        self.state
            .lock()
            .locks
            .get(&page_id)
            .map_or((0, 0), |lock| (lock.reader_count(), lock.writer_count()))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
