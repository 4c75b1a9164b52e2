//! End-to-end coverage through the public [`DatabaseSystem`] facade: open a
//! database, create a table and a unique index, insert rows, and confirm
//! both search and range-scan see them after a simulated restart.

use std::time::Duration;

use relstore::common::{KeyType, RecordLocation};
use relstore::storage::layout::{ColumnDef, KeyValue};
use relstore::{DatabaseSystem, EngineConfig};
use tempfile::tempdir;

fn config(dir: &tempfile::TempDir) -> EngineConfig {
    EngineConfig {
        data_dir: dir.path().to_path_buf(),
        page_size: 4096,
        buffer_pool_capacity: 64,
        cleaner_interval: Duration::from_secs(60),
        catalog_tablespace: "catalog".to_string(),
    }
}

fn widget_columns() -> Vec<ColumnDef> {
    vec![
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
            nullable: true,
        },
    ]
}

#[tokio::test]
async fn create_table_and_index_then_insert_and_search() {
    let dir = tempdir().unwrap();
    let system = DatabaseSystem::open(config(&dir)).await.unwrap();

    let pool = system.create_tablespace("main").unwrap();
    system.catalog().create_table(&pool, "main", "widgets", &widget_columns()).unwrap();
    let (_, tree) = system
        .catalog()
        .create_index(pool.clone(), "main", "idx_widgets_id", "widgets", KeyType::Integer, 8, true)
        .unwrap();

    for id in 0..25i64 {
        tree.insert(KeyValue::Integer(id), RecordLocation::new(1000, id as u32)).unwrap();
    }

    assert_eq!(tree.search(&KeyValue::Integer(17)).unwrap(), Some(RecordLocation::new(1000, 17)));
    assert_eq!(tree.search(&KeyValue::Integer(999)).unwrap(), None);

    let range = tree.range_scan(Some(&KeyValue::Integer(10)), Some(&KeyValue::Integer(14))).unwrap();
    assert_eq!(range.len(), 5);

    assert!(system.catalog().table("widgets").is_some());
    assert!(system.catalog().index("idx_widgets_id").is_some());
    let cols = system.catalog().columns("widgets").unwrap();
    assert_eq!(cols.len(), 2);
    assert_eq!(cols[0].column_name, "id");
    assert_eq!(cols[1].column_name, "label");

    let errors = system.shutdown().await;
    assert!(errors.is_empty());
}

#[tokio::test]
async fn catalog_survives_restart_without_a_persisted_cache() {
    let dir = tempdir().unwrap();
    {
        let system = DatabaseSystem::open(config(&dir)).await.unwrap();
        let pool = system.create_tablespace("main").unwrap();
        system.catalog().create_table(&pool, "main", "widgets", &widget_columns()).unwrap();
        let (_, tree) = system
            .catalog()
            .create_index(pool.clone(), "main", "idx_widgets_id", "widgets", KeyType::Integer, 8, true)
            .unwrap();
        tree.insert(KeyValue::Integer(1), RecordLocation::new(1, 0)).unwrap();
        system.shutdown().await;
    }

    // Fresh process: nothing but the on-disk pages is used to rebuild the
    // catalog and the index.
    let system = DatabaseSystem::open(config(&dir)).await.unwrap();
    let table = system.catalog().table("widgets").unwrap();
    assert_eq!(table.tablespace_name, "main");
    let index = system.catalog().index("idx_widgets_id").unwrap();
    assert!(index.unique);

    let pool = system.buffer_pool("main").unwrap();
    let tree = relstore::btree::BTree::open(pool, index.header_page).unwrap();
    assert_eq!(tree.search(&KeyValue::Integer(1)).unwrap(), Some(RecordLocation::new(1, 0)));

    system.shutdown().await;
}

#[tokio::test]
async fn duplicate_table_and_index_names_are_rejected() {
    let dir = tempdir().unwrap();
    let system = DatabaseSystem::open(config(&dir)).await.unwrap();
    let pool = system.create_tablespace("main").unwrap();
    system.catalog().create_table(&pool, "main", "widgets", &widget_columns()).unwrap();
    assert!(system.catalog().create_table(&pool, "main", "widgets", &widget_columns()).is_err());

    system
        .catalog()
        .create_index(pool.clone(), "main", "idx_widgets_id", "widgets", KeyType::Integer, 8, true)
        .unwrap();
    assert!(system
        .catalog()
        .create_index(pool.clone(), "main", "idx_widgets_id", "widgets", KeyType::Integer, 8, true)
        .is_err());

    system.shutdown().await;
}

#[tokio::test]
async fn non_unique_index_keeps_every_duplicate_insert() {
    let dir = tempdir().unwrap();
    let system = DatabaseSystem::open(config(&dir)).await.unwrap();
    let pool = system.create_tablespace("main").unwrap();
    system.catalog().create_table(&pool, "main", "widgets", &widget_columns()).unwrap();
    let (_, tree) = system
        .catalog()
        .create_index(pool.clone(), "main", "idx_widgets_label", "widgets", KeyType::Integer, 4, false)
        .unwrap();

    for slot in 0..3u32 {
        tree.insert(KeyValue::Integer(42), RecordLocation::new(5, slot)).unwrap();
    }
    let hits = tree.range_scan(Some(&KeyValue::Integer(42)), Some(&KeyValue::Integer(42))).unwrap();
    assert_eq!(hits.len(), 3);

    system.shutdown().await;
}
