//! Opens a database, creates a table and an index on it, inserts a
//! handful of rows via the B-tree, and range-scans them back.

use std::time::Duration;

use relstore::common::{KeyType, RecordLocation};
use relstore::storage::layout::{ColumnDef, KeyValue};
use relstore::{DatabaseSystem, EngineConfig};

#[tokio::main]
async fn main() -> relstore::Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let data_dir = std::env::temp_dir().join("relstore-demo");
    let _ = std::fs::remove_dir_all(&data_dir);

    let config = EngineConfig {
        data_dir,
        buffer_pool_capacity: 64,
        cleaner_interval: Duration::from_secs(5),
        ..EngineConfig::default()
    };
    let system = DatabaseSystem::open(config).await?;

    let pool = system.create_tablespace("main")?;
    let columns = vec![
        ColumnDef {
            name: "id".to_string(),
            data_type: 0,
            max_length: 8,
            nullable: false,
        },
        ColumnDef {
            name: "label".to_string(),
            data_type: 2,
            max_length: 64,
            nullable: false,
        },
    ];
    system.catalog().create_table(&pool, "main", "widgets", &columns)?;

    let (_, tree) = system.catalog().create_index(
        pool.clone(),
        "main",
        "idx_widgets_id",
        "widgets",
        KeyType::Integer,
        64,
        true,
    )?;

    for id in 0..10i64 {
        tree.insert(KeyValue::Integer(id), RecordLocation::new(100, id as u32))?;
    }

    let hits = tree.range_scan(Some(&KeyValue::Integer(3)), Some(&KeyValue::Integer(7)))?;
    println!("widgets 3..=7: {} rows", hits.len());
    for (key, loc) in &hits {
        println!("  {key:?} -> page {} slot {}", loc.page_id, loc.slot);
    }

    println!("tablespaces: {:?}", system.tablespace_names());
    println!("tables: {:?}", system.catalog().table_names());

    let stats = system.buffer_pool_stats();
    for (name, cached, capacity) in &stats {
        println!("pool {name}: {cached}/{capacity} pages cached");
    }

    let errors = system.shutdown().await;
    if !errors.is_empty() {
        eprintln!("shutdown reported {} error(s)", errors.len());
    }

    Ok(())
}
