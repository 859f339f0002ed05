use std::collections::{HashSet, VecDeque};

use super::{Permissions, TransactionId};

/// A request parked on a [`PageLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRequest {
    txn: TransactionId,
    perm: Permissions,
}

/// Reader/writer lock state for one page.
///
/// States: free, shared by one or more readers, or held exclusively by a
/// single writer. Requests that cannot be granted wait in a FIFO queue; a
/// request is granted only if it is compatible with the current holders
/// *and* with every request queued ahead of it. A queued writer therefore
/// blocks every later reader even while the lock is momentarily free.
///
/// The lock does not block by itself; the [`LockManager`](super::LockManager)
/// parks callers on its condition variable and re-checks [`can_grant`].
///
/// [`can_grant`]: PageLock::can_grant
#[derive(Debug, Default)]
pub struct PageLock {
    readers: HashSet<TransactionId>,
    writer: Option<TransactionId>,
    queue: VecDeque<PendingRequest>,
}

impl PageLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mode currently granted, or None if the lock is free.
    pub fn mode(&self) -> Option<Permissions> {
        if self.writer.is_some() {
            Some(Permissions::ReadWrite)
        } else if !self.readers.is_empty() {
            Some(Permissions::ReadOnly)
        } else {
            None
        }
    }

    pub fn is_free(&self) -> bool {
        self.mode().is_none()
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn writer_count(&self) -> usize {
        usize::from(self.writer.is_some())
    }

    /// Number of requests waiting on this lock.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns the mode `txn` holds on this lock, if any.
    pub fn held_by(&self, txn: TransactionId) -> Option<Permissions> {
        if self.writer == Some(txn) {
            Some(Permissions::ReadWrite)
        } else if self.readers.contains(&txn) {
            Some(Permissions::ReadOnly)
        } else {
            None
        }
    }

    /// Returns true if `txn` may be granted `perm` right now.
    ///
    /// For an upgrade (`txn` holds shared, asks for exclusive) the caller's
    /// own shared hold does not count as a conflict.
    pub fn can_grant(&self, txn: TransactionId, perm: Permissions) -> bool {
        let holders_ok = match perm {
            Permissions::ReadOnly => self.writer.map_or(true, |w| w == txn),
            Permissions::ReadWrite => {
                self.writer.map_or(true, |w| w == txn) && self.readers.iter().all(|&r| r == txn)
            }
        };
        if !holders_ok {
            return false;
        }

        self.queue
            .iter()
            .take_while(|req| req.txn != txn)
            .all(|req| req.perm.is_compatible_with(perm))
    }

    /// Parks a request at the back of the queue. Idempotent per transaction.
    pub fn enqueue(&mut self, txn: TransactionId, perm: Permissions) {
        if !self.queue.iter().any(|req| req.txn == txn) {
            self.queue.push_back(PendingRequest { txn, perm });
        }
    }

    /// Drops any queued request of `txn`.
    pub fn dequeue(&mut self, txn: TransactionId) {
        self.queue.retain(|req| req.txn != txn);
    }

    /// Records the grant. An exclusive grant to a reader converts its shared
    /// hold in place, so nothing can be granted between the two halves of an
    /// upgrade.
    pub fn grant(&mut self, txn: TransactionId, perm: Permissions) {
        self.dequeue(txn);
        match perm {
            Permissions::ReadOnly => {
                self.readers.insert(txn);
            }
            Permissions::ReadWrite => {
                self.readers.remove(&txn);
                self.writer = Some(txn);
            }
        }
    }

    /// Releases whatever `txn` holds. Returns the released mode.
    pub fn release(&mut self, txn: TransactionId) -> Option<Permissions> {
        if self.writer == Some(txn) {
            self.writer = None;
            Some(Permissions::ReadWrite)
        } else if self.readers.remove(&txn) {
            Some(Permissions::ReadOnly)
        } else {
            None
        }
    }
}
