use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of resident pages in the buffer pool
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Capacity of each disk scheduler's request queue
pub const DISK_REQUEST_QUEUE_DEPTH: usize = 128;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Returns the process-wide page size.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Acquire)
}

/// Overrides the process-wide page size. Test harnesses only.
///
/// Heap files capture the page size when they are opened, so files that are
/// already open keep their geometry; pages cached under the old size must be
/// discarded by the caller.
pub fn set_page_size(size: usize) {
    assert!(size > 0, "page size must be positive");
    PAGE_SIZE.store(size, Ordering::Release);
}

/// Restores the default page size.
pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::Release);
}

/// Tuning knobs for a [`BufferPool`](crate::buffer::BufferPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Maximum number of resident pages
    pub capacity: usize,
    /// K used by the LRU-K replacer when choosing among clean pages
    pub lru_k: usize,
    /// Upper bound on a single lock wait. Deadlocks are found by the
    /// detector; this only bounds pathological waits.
    pub lock_wait_timeout: Option<Duration>,
}

impl BufferPoolConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_lru_k(mut self, k: usize) -> Self {
        self.lru_k = k;
        self
    }

    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = Some(timeout);
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_POOL_PAGES,
            lru_k: DEFAULT_LRUK_K,
            lock_wait_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_config_defaults() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.capacity, DEFAULT_BUFFER_POOL_PAGES);
        assert_eq!(config.lru_k, DEFAULT_LRUK_K);
        assert_eq!(config.lock_wait_timeout, None);
    }

    #[test]
    fn test_buffer_pool_config_builder() {
        let config = BufferPoolConfig::new(8)
            .with_lru_k(3)
            .with_lock_wait_timeout(Duration::from_secs(1));
        assert_eq!(config.capacity, 8);
        assert_eq!(config.lru_k, 3);
        assert_eq!(config.lock_wait_timeout, Some(Duration::from_secs(1)));
    }
}
