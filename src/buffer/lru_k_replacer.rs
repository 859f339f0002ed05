use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Timestamp};

/// Tracks access history for a single resident page
#[derive(Debug)]
struct PageAccessInfo {
    /// History of access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
}

impl PageAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
        }
    }

    /// Records an access at the given timestamp
    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        // Keep only the last k accesses
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from `current_timestamp`, or None if
    /// the page has fewer than k accesses (meaning +inf distance)
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    /// Returns the earliest timestamp in the history
    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// LRU-K Replacement Policy
///
/// The LRU-K algorithm evicts the page whose backward k-distance is the maximum
/// of all candidate pages. Backward k-distance is computed as the difference
/// in time between the current timestamp and the timestamp of kth previous access.
///
/// A page with fewer than k historical accesses is given +inf as its backward k-distance.
/// If multiple pages have +inf backward k-distance, the replacer evicts the page
/// with the earliest overall timestamp.
///
/// Which pages are candidates is decided by the caller on every eviction:
/// the buffer pool only offers clean pages.
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Current timestamp (monotonically increasing)
    current_timestamp: AtomicU64,
    /// Access information for each tracked page
    page_info: Mutex<HashMap<PageId, PageAccessInfo>>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value.
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            current_timestamp: AtomicU64::new(0),
            page_info: Mutex::new(HashMap::new()),
        }
    }

    /// Picks the page with the largest backward k-distance among tracked
    /// pages for which `is_candidate` returns true, and stops tracking it.
    /// Returns None if no tracked page is a candidate.
    pub fn evict_where<F>(&self, mut is_candidate: F) -> Option<PageId>
    where
        F: FnMut(PageId) -> bool,
    {
        let mut page_info = self.page_info.lock();
        let current_ts = self.current_timestamp.load(Ordering::Relaxed);

        let mut victim: Option<PageId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Option<Timestamp> = None;

        for (page_id, info) in page_info.iter() {
            let k_dist = info.k_distance(current_ts, self.k);
            let earliest_ts = info.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // Current victim has +inf, candidate has finite -> don't replace
                (None, Some(_)) => false,
                // Current victim has finite, candidate has +inf -> replace
                (Some(_), None) => true,
                // Both have +inf -> compare earliest timestamps
                (None, None) => match (victim_earliest_ts, earliest_ts) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (None, Some(_)) => true,
                    _ => false,
                },
                // Both have finite k-distance -> pick larger one
                (Some(v_dist), Some(c_dist)) => c_dist > v_dist,
            };

            if (victim.is_none() || should_replace) && is_candidate(*page_id) {
                victim = Some(*page_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(page_id) = victim {
            page_info.remove(&page_id);
        }

        victim
    }

    /// Records that the given page was accessed at the current timestamp.
    pub fn record_access(&self, page_id: PageId) {
        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut page_info = self.page_info.lock();

        page_info
            .entry(page_id)
            .or_insert_with(PageAccessInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Stops tracking a page that left the pool.
    pub fn remove(&self, page_id: PageId) {
        self.page_info.lock().remove(&page_id);
    }

    /// Returns the number of tracked pages.
    pub fn size(&self) -> usize {
        self.page_info.lock().len()
    }

    /// Returns the k value.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TableId;

    fn page(n: u32) -> PageId {
        PageId::new(TableId::new(1), n)
    }

    #[test]
    fn test_lru_k_basic() {
        let replacer = LruKReplacer::new(2);

        for i in 1..=6 {
            replacer.record_access(page(i));
        }
        assert_eq!(replacer.size(), 6);

        // All pages have +inf distance, so the earliest access goes first.
        assert_eq!(replacer.evict_where(|_| true), Some(page(1)));
        assert_eq!(replacer.evict_where(|_| true), Some(page(2)));
        assert_eq!(replacer.size(), 4);
    }

    #[test]
    fn test_lru_k_prefers_infinite_distance() {
        let replacer = LruKReplacer::new(2);

        // page 1: accessed twice (finite distance)
        replacer.record_access(page(1));
        replacer.record_access(page(1));
        // page 2: accessed once (+inf distance)
        replacer.record_access(page(2));

        assert_eq!(replacer.evict_where(|_| true), Some(page(2)));
        assert_eq!(replacer.evict_where(|_| true), Some(page(1)));
        assert_eq!(replacer.evict_where(|_| true), None);
    }

    #[test]
    fn test_lru_k_largest_k_distance() {
        let replacer = LruKReplacer::new(2);

        replacer.record_access(page(1)); // ts 0
        replacer.record_access(page(2)); // ts 1
        replacer.record_access(page(1)); // ts 2
        replacer.record_access(page(2)); // ts 3

        // page 1's 2nd most recent access is older.
        assert_eq!(replacer.evict_where(|_| true), Some(page(1)));
    }

    #[test]
    fn test_evict_skips_non_candidates() {
        let replacer = LruKReplacer::new(2);
        replacer.record_access(page(1));
        replacer.record_access(page(2));
        replacer.record_access(page(3));

        assert_eq!(replacer.evict_where(|p| p != page(1)), Some(page(2)));
        assert_eq!(replacer.evict_where(|p| p == page(9)), None);
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_remove() {
        let replacer = LruKReplacer::new(2);
        replacer.record_access(page(1));
        replacer.record_access(page(2));

        replacer.remove(page(1));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict_where(|_| true), Some(page(2)));
    }
}
