use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use super::{Permissions, TransactionId};
use crate::common::{PageId, Result, StrataError};

/// One registered request: `txn` wants (or holds) `perm` on `page_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WaitEntry {
    txn: TransactionId,
    perm: Permissions,
}

/// Detects deadlocks among page lock requests.
///
/// Every request is registered per page in arrival order and stays
/// registered until the transaction releases the page, so the table models
/// holders as well as waiters. On each new request a wait-for graph is
/// rebuilt from scratch: for every page, each entry gets an edge from every
/// earlier conflicting entry of a different transaction (conflicting means
/// at least one side is exclusive). Kahn's algorithm then topologically
/// sorts the graph; any node left unsorted sits on a cycle.
///
/// Nodes are arena indices into a scratch vector, so the graph owns no
/// references and is dropped after each check.
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    by_page: HashMap<PageId, Vec<WaitEntry>>,
}

impl DeadlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `txn`'s request for `perm` on `page_id` and checks the
    /// resulting graph.
    ///
    /// Returns `Ok(true)` if a new entry was recorded, `Ok(false)` if an
    /// existing entry already covered the request. If the request closes a
    /// cycle, the entry it added is withdrawn and the requester is told to
    /// abort.
    pub fn request(
        &mut self,
        txn: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<bool> {
        let added = self.register(txn, page_id, perm);
        if !added {
            return Ok(false);
        }

        if self.has_cycle() {
            self.unregister_last(txn, page_id);
            warn!(%txn, %page_id, %perm, "deadlock detected, aborting requester");
            return Err(StrataError::TransactionAborted { txn, page_id });
        }

        Ok(true)
    }

    fn register(&mut self, txn: TransactionId, page_id: PageId, perm: Permissions) -> bool {
        let entries = self.by_page.entry(page_id).or_default();
        if entries.iter().any(|e| e.txn == txn && e.perm.covers(perm)) {
            return false;
        }
        entries.push(WaitEntry { txn, perm });
        true
    }

    fn unregister_last(&mut self, txn: TransactionId, page_id: PageId) {
        if let Some(entries) = self.by_page.get_mut(&page_id) {
            if let Some(pos) = entries.iter().rposition(|e| e.txn == txn) {
                entries.remove(pos);
            }
            if entries.is_empty() {
                self.by_page.remove(&page_id);
            }
        }
    }

    /// Withdraws the most recent entry of `txn` on `page_id`. Used when a
    /// wait is abandoned without the lock being granted.
    pub fn withdraw(&mut self, txn: TransactionId, page_id: PageId) {
        self.unregister_last(txn, page_id);
    }

    /// Drops every entry of `txn` on `page_id`.
    pub fn release(&mut self, txn: TransactionId, page_id: PageId) {
        if let Some(entries) = self.by_page.get_mut(&page_id) {
            entries.retain(|e| e.txn != txn);
            if entries.is_empty() {
                self.by_page.remove(&page_id);
            }
        }
    }

    /// Drops every entry of `txn` on every page.
    pub fn remove_transaction(&mut self, txn: TransactionId) {
        self.by_page.retain(|_, entries| {
            entries.retain(|e| e.txn != txn);
            !entries.is_empty()
        });
    }

    /// Total number of registered entries.
    pub fn len(&self) -> usize {
        self.by_page.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_page.is_empty()
    }

    /// Number of entries `txn` has registered.
    pub fn entries_of(&self, txn: TransactionId) -> usize {
        self.by_page
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|e| e.txn == txn)
            .count()
    }

    fn has_cycle(&self) -> bool {
        let mut index: HashMap<TransactionId, usize> = HashMap::new();
        let mut edges: Vec<Vec<usize>> = Vec::new();

        for entries in self.by_page.values() {
            for e in entries {
                if !index.contains_key(&e.txn) {
                    index.insert(e.txn, edges.len());
                    edges.push(Vec::new());
                }
            }
        }

        let mut in_degree = vec![0usize; edges.len()];
        for entries in self.by_page.values() {
            for (i, later) in entries.iter().enumerate() {
                for earlier in &entries[..i] {
                    if earlier.txn == later.txn || earlier.perm.is_compatible_with(later.perm) {
                        continue;
                    }
                    let from = index[&earlier.txn];
                    let to = index[&later.txn];
                    edges[from].push(to);
                    in_degree[to] += 1;
                }
            }
        }

        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(n, _)| n)
            .collect();
        let mut visited = 0;

        while let Some(node) = ready.pop_front() {
            visited += 1;
            for &next in &edges[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        let cyclic = visited < edges.len();
        if cyclic {
            debug!(
                nodes = edges.len(),
                visited, "wait-for graph has a cycle"
            );
        }
        cyclic
    }
}
