//! Strata - a transactional page cache for a disk-oriented storage engine
//!
//! This crate provides the component that mediates all access to on-disk
//! table pages under concurrent transactions. Isolation comes from strict
//! two-phase page locking with deadlock detection; the buffer pool follows a
//! no-steal policy so uncommitted changes never reach disk, and commit and
//! abort work page by page from the transaction's held locks.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Tuples** (`tuple`): Fixed-width typed tuples and their schemas
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Reads and writes pages to/from disk
//!   - `DiskScheduler`: Background disk I/O worker
//!   - `HeapPage`: Bitmap-slotted page of fixed-width tuples with a before-image
//!   - `HeapFile`: A table stored as a sequence of heap pages
//!
//! - **Transactions** (`transaction`): Page locking
//!   - `PageLock`: Per-page reader/writer lock state with FIFO anti-starvation
//!   - `DeadlockDetector`: Wait-for graph with Kahn's algorithm
//!   - `LockManager`: Acquire, upgrade and release of page locks
//!
//! - **Buffer Pool** (`buffer`): Memory management for table pages
//!   - `BufferPool`: Fetch under lock, tuple insert/delete, commit, abort
//!   - `LruKReplacer`: LRU-K choice among clean pages
//!
//! # Example
//!
//! ```rust,no_run
//! use strata::buffer::BufferPool;
//! use strata::common::{BufferPoolConfig, TableId};
//! use strata::storage::HeapFile;
//! use strata::transaction::TransactionId;
//! use strata::tuple::{DataType, Schema, Tuple, Value};
//!
//! let schema = Schema::builder()
//!     .column("id", DataType::Integer)
//!     .column("name", DataType::VarChar(16))
//!     .build_arc();
//!
//! let pool = BufferPool::new(BufferPoolConfig::new(50));
//! let table = pool
//!     .add_table(HeapFile::open("users.dat", TableId::new(1), schema.clone()).unwrap())
//!     .unwrap();
//!
//! let txn = TransactionId::new();
//! let tuple = Tuple::new(schema, vec![Value::Integer(1), Value::from("alice")]);
//! pool.insert_tuple(txn, table.table_id(), tuple).unwrap();
//! pool.commit(txn).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod storage;
pub mod transaction;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError, TableId};
