//! Transactions and page-level locking.
//!
//! Transactions lock pages through the [`LockManager`]; each page has a
//! [`PageLock`] and every request is vetted by the [`DeadlockDetector`]
//! before it is allowed to block.

mod deadlock;
mod lock_manager;
mod page_lock;
mod transaction_id;

pub use deadlock::DeadlockDetector;
pub use lock_manager::LockManager;
pub use page_lock::PageLock;
pub use transaction_id::{Permissions, TransactionId};
