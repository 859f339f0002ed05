use std::sync::Arc;
use std::thread;

use strata::buffer::BufferPool;
use strata::common::{BufferPoolConfig, PageId, TableId};
use strata::storage::HeapFile;
use strata::transaction::{Permissions, TransactionId};
use strata::tuple::{DataType, Schema, Tuple, Value};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Strata - a transactional page cache in Rust");
    println!("===========================================\n");

    let dir = std::env::temp_dir().join(format!("strata-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("Failed to create demo directory");

    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::VarChar(16))
        .build_arc();
    println!("Schema: {} ({} bytes per tuple)", schema, schema.tuple_size());

    let pool = Arc::new(BufferPool::new(BufferPoolConfig::new(10)));
    let file = HeapFile::open(dir.join("users.dat"), TableId::new(1), schema.clone())
        .expect("Failed to open heap file");
    let table = pool.add_table(file).expect("Failed to register table");
    println!("Created buffer pool with {} pages\n", pool.capacity());

    // Committed inserts
    let txn = TransactionId::new();
    for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
        let tuple = Tuple::new(schema.clone(), vec![Value::Integer(id), Value::from(name)]);
        let rid = pool
            .insert_tuple(txn, table.table_id(), tuple)
            .expect("Failed to insert tuple");
        println!("{} inserted ({}, {}) at {}", txn, id, name, rid);
    }
    pool.commit(txn).expect("Failed to commit");
    println!("{} committed\n", txn);

    // Aborted insert
    let txn = TransactionId::new();
    let tuple = Tuple::new(schema.clone(), vec![Value::Integer(4), Value::from("mallory")]);
    pool.insert_tuple(txn, table.table_id(), tuple)
        .expect("Failed to insert tuple");
    pool.abort(txn).expect("Failed to abort");
    println!("{} inserted (4, mallory) and aborted\n", txn);

    let reader = TransactionId::new();
    let rows = table.scan(&pool, reader).expect("Failed to scan");
    println!("{} sees {} rows:", reader, rows.len());
    for row in &rows {
        println!("  {}", row);
    }
    pool.commit(reader).expect("Failed to commit");

    // Provoke a deadlock between two transactions on two pages
    println!();
    let second = table.allocate_page().expect("Failed to allocate page");
    let first = PageId::new(table.table_id(), 0);
    let (t1, t2) = (TransactionId::new(), TransactionId::new());

    pool.fetch_page(t1, first, Permissions::ReadWrite)
        .expect("Failed to lock page");
    pool.fetch_page(t2, second, Permissions::ReadWrite)
        .expect("Failed to lock page");

    let pool1 = pool.clone();
    let handle = thread::spawn(move || pool1.fetch_page(t1, second, Permissions::ReadWrite).map(|_| ()));

    while pool.lock_manager().pending_waits() == 0 {
        thread::yield_now();
    }

    match pool.fetch_page(t2, first, Permissions::ReadWrite) {
        Ok(_) => println!("{} unexpectedly got {}", t2, first),
        Err(e) => {
            println!("{}: {}", t2, e);
            pool.abort(t2).expect("Failed to abort");
        }
    }

    handle
        .join()
        .expect("Worker panicked")
        .expect("Failed to lock page");
    println!("{} now holds {} pages", t1, pool.held_pages(t1).len());
    pool.commit(t1).expect("Failed to commit");

    drop(table);
    drop(pool);
    let _ = std::fs::remove_dir_all(&dir);
    println!("\nDone!");
}
