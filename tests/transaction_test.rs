//! Transaction-level tests: deadlocks and lock waits through the buffer pool

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use strata::buffer::BufferPool;
use strata::common::{BufferPoolConfig, PageId, StrataError, TableId};
use strata::storage::HeapFile;
use strata::transaction::{Permissions, TransactionId};
use strata::tuple::{DataType, Schema, Tuple, Value};
use tempfile::TempDir;

const TABLE: TableId = TableId(4);

fn create_pool(config: BufferPoolConfig, pages: u32) -> (Arc<BufferPool>, TempDir) {
    let dir = TempDir::new().unwrap();
    let schema = Schema::builder().column("v", DataType::Integer).build_arc();
    let file = HeapFile::open(dir.path().join("t.dat"), TABLE, schema).unwrap();
    for _ in 0..pages {
        file.allocate_page().unwrap();
    }
    let pool = BufferPool::new(config);
    pool.add_table(file).unwrap();
    (Arc::new(pool), dir)
}

fn page(n: u32) -> PageId {
    PageId::new(TABLE, n)
}

fn wait_for_waiters(pool: &BufferPool, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.lock_manager().pending_waits() < n {
        assert!(Instant::now() < deadline, "expected {} blocked requests", n);
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_deadlock_victim_aborts_and_survivor_commits() {
    let (pool, _dir) = create_pool(BufferPoolConfig::new(10), 2);
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    pool.fetch_page(t1, page(0), Permissions::ReadWrite).unwrap();
    pool.fetch_page(t2, page(1), Permissions::ReadWrite).unwrap();

    let survivor = {
        let pool = pool.clone();
        thread::spawn(move || -> strata::Result<()> {
            pool.fetch_page(t1, page(1), Permissions::ReadWrite)?;
            pool.commit(t1)
        })
    };
    wait_for_waiters(&pool, 1);

    let err = pool
        .fetch_page(t2, page(0), Permissions::ReadWrite)
        .unwrap_err();
    assert!(matches!(err, StrataError::TransactionAborted { txn, .. } if txn == t2));
    pool.abort(t2).unwrap();

    survivor.join().unwrap().unwrap();
    assert!(pool.held_pages(t1).is_empty());
    assert!(pool.held_pages(t2).is_empty());
    assert_eq!(pool.lock_manager().pending_waits(), 0);
}

#[test]
fn test_dual_upgrade_deadlock() {
    let (pool, _dir) = create_pool(BufferPoolConfig::new(10), 1);
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    pool.fetch_page(t1, page(0), Permissions::ReadOnly).unwrap();
    pool.fetch_page(t2, page(0), Permissions::ReadOnly).unwrap();

    let (done_tx, done_rx) = bounded(1);
    let upgrader = {
        let pool = pool.clone();
        thread::spawn(move || {
            let result = pool.fetch_page(t1, page(0), Permissions::ReadWrite).map(|_| ());
            done_tx.send(result.is_ok()).unwrap();
            result
        })
    };
    wait_for_waiters(&pool, 1);

    assert!(pool
        .fetch_page(t2, page(0), Permissions::ReadWrite)
        .unwrap_err()
        .is_transaction_abort());
    assert!(done_rx.try_recv().is_err(), "upgrade granted while t2 held shared");

    pool.abort(t2).unwrap();
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    upgrader.join().unwrap().unwrap();
    pool.commit(t1).unwrap();
}

#[test]
fn test_transaction_complete_dispatches() {
    let (pool, _dir) = create_pool(BufferPoolConfig::new(10), 0);
    let schema = pool.table(TABLE).unwrap().schema().clone();

    let t1 = TransactionId::new();
    pool.insert_tuple(t1, TABLE, Tuple::new(schema.clone(), vec![Value::Integer(1)]))
        .unwrap();
    pool.transaction_complete(t1, true).unwrap();

    let t2 = TransactionId::new();
    pool.insert_tuple(t2, TABLE, Tuple::new(schema, vec![Value::Integer(2)]))
        .unwrap();
    pool.transaction_complete(t2, false).unwrap();

    let rows = pool
        .table(TABLE)
        .unwrap()
        .scan(&pool, TransactionId::new())
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value(0), Some(&Value::Integer(1)));
}

#[test]
fn test_bounded_wait_gives_up() {
    let config = BufferPoolConfig::new(10).with_lock_wait_timeout(Duration::from_millis(30));
    let (pool, _dir) = create_pool(config, 1);
    let (holder, waiter) = (TransactionId::new(), TransactionId::new());

    pool.fetch_page(holder, page(0), Permissions::ReadWrite).unwrap();
    let err = pool
        .fetch_page(waiter, page(0), Permissions::ReadOnly)
        .unwrap_err();
    assert!(matches!(err, StrataError::LockWaitTimeout { .. }));
    assert!(err.is_transaction_abort());

    pool.abort(waiter).unwrap();
    pool.commit(holder).unwrap();
    pool.fetch_page(waiter, page(0), Permissions::ReadWrite).unwrap();
}
