//! Schema manager: the five `SYS_*` catalog tables, bootstrapped by
//! scanning every table-header page in the catalog tablespace rather than
//! trusting a cached index (spec §4.4, §9).
//!
//! A prior implementation of this idea kept an in-memory map of table name
//! to header-page number built once at startup and never refreshed; after
//! a crash mid-DDL the map and the on-disk page set could disagree and the
//! mismatch went undetected until a query hit a stale page number. This
//! one throws the map away: every `bootstrap` call re-derives it from the
//! page headers actually on disk.

pub mod encode;
pub mod tables;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::btree::BTree;
use crate::buffer::BufferPoolManager;
use crate::common::{header, KeyType, PageNumber, PageType, RecordLocation, NO_PAGE};
use crate::error::{Result, StorageError};
use crate::storage::layout::{table_data, table_header, ColumnDef, TableDataPage, TableHeaderPage};
use crate::storage::{StorageManager, Tablespace};
use crate::catalog::tables::{
    SysColumnsRow, SysIndexColumnsRow, SysIndexesRow, SysTablesRow, SysTablespacesRow, SYSTEM_TABLE_NAMES,
    SYS_COLUMNS, SYS_INDEXES, SYS_INDEX_COLUMNS, SYS_TABLES, SYS_TABLESPACES,
};

#[derive(Debug, Clone)]
pub struct TableMeta {
    pub name: String,
    pub tablespace_name: String,
    pub header_page: PageNumber,
}

#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub name: String,
    pub table_name: String,
    pub tablespace_name: String,
    pub header_page: PageNumber,
    pub unique: bool,
}

/// The catalog: an in-memory view over the five system tables, rebuilt
/// from disk on every bootstrap.
pub struct Catalog {
    catalog_pool: Arc<BufferPoolManager>,
    sys_header_pages: HashMap<&'static str, PageNumber>,
    tables: RwLock<HashMap<String, TableMeta>>,
    indexes: RwLock<HashMap<String, IndexMeta>>,
}

fn system_columns_for(name: &str) -> Vec<ColumnDef> {
    let col = |n: &str, dt: u8, len: u16| ColumnDef {
        name: n.to_string(),
        data_type: dt,
        max_length: len,
        nullable: false,
    };
    match name {
        SYS_TABLES => vec![col("table_name", 2, 128), col("tablespace_name", 2, 128), col("header_page_id", 0, 4)],
        SYS_COLUMNS => vec![
            col("table_name", 2, 128),
            col("column_name", 2, 128),
            col("ordinal", 0, 2),
            col("data_type", 0, 1),
            col("max_length", 0, 2),
            col("nullable", 0, 1),
        ],
        SYS_INDEXES => vec![
            col("index_name", 2, 128),
            col("table_name", 2, 128),
            col("tablespace_name", 2, 128),
            col("header_page_id", 0, 4),
            col("unique", 0, 1),
        ],
        SYS_INDEX_COLUMNS => vec![col("index_name", 2, 128), col("column_name", 2, 128), col("ordinal", 0, 2)],
        SYS_TABLESPACES => vec![col("tablespace_name", 2, 128), col("page_size", 0, 4)],
        other => unreachable!("not a system table: {other}"),
    }
}

impl Catalog {
    /// Attach the catalog to `catalog_tablespace` (created if this is a
    /// fresh data directory), scan it for the five system tables, create
    /// whichever are missing, and load every row currently on disk.
    pub fn bootstrap(storage: &StorageManager, catalog_tablespace: &str, buffer_capacity: usize) -> Result<Self> {
        let ts = storage.open_tablespace(catalog_tablespace)?;
        let catalog_pool = Arc::new(BufferPoolManager::new(ts.clone(), buffer_capacity));

        let mut found = scan_table_headers(&ts)?;
        let mut sys_header_pages = HashMap::new();
        let mut newly_created = Vec::new();
        for name in SYSTEM_TABLE_NAMES {
            match found.remove(name) {
                Some(header_page) => {
                    sys_header_pages.insert(name, header_page);
                }
                None => {
                    info!(table = name, "system table missing, creating");
                    let header_page = create_system_table(&catalog_pool, name)?;
                    sys_header_pages.insert(name, header_page);
                    newly_created.push(name);
                }
            }
        }

        let catalog = Self {
            catalog_pool,
            sys_header_pages,
            tables: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        };

        // Every system table's own header page now exists, so it's safe to
        // record each newly created one's descriptor in SYS_TABLES/
        // SYS_COLUMNS — including SYS_TABLES recording a row about itself.
        // Doing this here (rather than inside `create_system_table`) is what
        // lets the very first table in `SYSTEM_TABLE_NAMES` describe itself
        // without its own row table existing yet.
        for name in &newly_created {
            let row = SysTablesRow {
                table_name: (*name).to_string(),
                tablespace_name: catalog_tablespace.to_string(),
                header_page_id: catalog.sys_header_pages[*name],
            };
            catalog.append_row(SYS_TABLES, row.encode())?;
            for (i, col) in system_columns_for(name).iter().enumerate() {
                let col_row = SysColumnsRow {
                    table_name: (*name).to_string(),
                    column_name: col.name.clone(),
                    ordinal: i as u16,
                    data_type: col.data_type,
                    max_length: col.max_length,
                    nullable: col.nullable,
                };
                catalog.append_row(SYS_COLUMNS, col_row.encode())?;
            }
        }

        catalog.reload()?;
        Ok(catalog)
    }

    /// Re-derive the in-memory table/index maps from the system tables'
    /// rows as they currently stand on disk.
    pub fn reload(&self) -> Result<()> {
        let mut tables = HashMap::new();
        for bytes in self.scan_system_table(SYS_TABLES)? {
            match SysTablesRow::decode(&bytes) {
                Ok(row) => {
                    tables.insert(
                        row.table_name.clone(),
                        TableMeta {
                            name: row.table_name,
                            tablespace_name: row.tablespace_name,
                            header_page: row.header_page_id,
                        },
                    );
                }
                Err(e) => warn!(%e, "skipping corrupt SYS_TABLES row"),
            }
        }

        let mut indexes = HashMap::new();
        for bytes in self.scan_system_table(SYS_INDEXES)? {
            match SysIndexesRow::decode(&bytes) {
                Ok(row) => {
                    indexes.insert(
                        row.index_name.clone(),
                        IndexMeta {
                            name: row.index_name,
                            table_name: row.table_name,
                            tablespace_name: row.tablespace_name,
                            header_page: row.header_page_id,
                            unique: row.unique,
                        },
                    );
                }
                Err(e) => warn!(%e, "skipping corrupt SYS_INDEXES row"),
            }
        }

        *self.tables.write() = tables;
        *self.indexes.write() = indexes;
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<TableMeta> {
        self.tables.read().get(name).cloned()
    }

    pub fn index(&self, name: &str) -> Option<IndexMeta> {
        self.indexes.read().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    pub fn columns(&self, table_name: &str) -> Result<Vec<SysColumnsRow>> {
        let mut cols: Vec<SysColumnsRow> = self
            .scan_system_table(SYS_COLUMNS)?
            .into_iter()
            .filter_map(|b| SysColumnsRow::decode(&b).ok())
            .filter(|c| c.table_name == table_name)
            .collect();
        cols.sort_by_key(|c| c.ordinal);
        Ok(cols)
    }

    /// Every tablespace ever registered via [`Self::register_tablespace`],
    /// including ones whose container file may since have disappeared from
    /// disk. Corrupt rows are skipped, matching [`Self::reload`].
    pub fn tablespaces(&self) -> Result<Vec<SysTablespacesRow>> {
        Ok(self
            .scan_system_table(SYS_TABLESPACES)?
            .into_iter()
            .filter_map(|b| SysTablespacesRow::decode(&b).ok())
            .collect())
    }

    /// Register a fresh table: writes its table-header and first
    /// table-data page in `table_pool`'s tablespace, then records it (and
    /// its columns) in the catalog. `table_pool` must belong to
    /// `tablespace_name`.
    pub fn create_table(
        &self,
        table_pool: &BufferPoolManager,
        tablespace_name: &str,
        table_name: &str,
        columns: &[ColumnDef],
    ) -> Result<TableMeta> {
        if self.tables.read().contains_key(table_name) {
            return Err(StorageError::AlreadyExists(format!("table {table_name}")));
        }
        let header_page = table_pool.new_page()?;
        let data_page = table_pool.new_page()?;
        table_pool.write(header_page, |page| -> Result<()> {
            TableHeaderPage::initialize(page, table_name, columns)?;
            Ok(())
        })??;
        table_pool.write(data_page, |page| {
            TableDataPage::initialize(page);
        })?;
        table_pool.write(header_page, |page| {
            TableHeaderPage::new(page).set_first_data_page_id(data_page as i32)
        })?;
        table_pool.unpin(header_page, true)?;
        table_pool.unpin(data_page, true)?;

        let row = SysTablesRow {
            table_name: table_name.to_string(),
            tablespace_name: tablespace_name.to_string(),
            header_page_id: header_page,
        };
        self.append_row(SYS_TABLES, row.encode())?;
        for (i, col) in columns.iter().enumerate() {
            let col_row = SysColumnsRow {
                table_name: table_name.to_string(),
                column_name: col.name.clone(),
                ordinal: i as u16,
                data_type: col.data_type,
                max_length: col.max_length,
                nullable: col.nullable,
            };
            self.append_row(SYS_COLUMNS, col_row.encode())?;
        }

        let meta = TableMeta {
            name: table_name.to_string(),
            tablespace_name: tablespace_name.to_string(),
            header_page,
        };
        self.tables.write().insert(table_name.to_string(), meta.clone());
        Ok(meta)
    }

    /// Register a fresh, empty B-tree index and record it in SYS_INDEXES.
    pub fn create_index(
        &self,
        index_pool: Arc<BufferPoolManager>,
        tablespace_name: &str,
        index_name: &str,
        table_name: &str,
        key_type: KeyType,
        fanout: u16,
        unique: bool,
    ) -> Result<(IndexMeta, BTree)> {
        if self.indexes.read().contains_key(index_name) {
            return Err(StorageError::AlreadyExists(format!("index {index_name}")));
        }
        let tree = BTree::create(index_pool, index_name, key_type, fanout, unique)?;
        let row = SysIndexesRow {
            index_name: index_name.to_string(),
            table_name: table_name.to_string(),
            tablespace_name: tablespace_name.to_string(),
            header_page_id: tree.header_page(),
            unique,
        };
        self.append_row(SYS_INDEXES, row.encode())?;
        let meta = IndexMeta {
            name: index_name.to_string(),
            table_name: table_name.to_string(),
            tablespace_name: tablespace_name.to_string(),
            header_page: tree.header_page(),
            unique,
        };
        self.indexes.write().insert(index_name.to_string(), meta.clone());
        Ok((meta, tree))
    }

    pub fn register_tablespace(&self, tablespace: &Tablespace) -> Result<()> {
        let row = SysTablespacesRow {
            tablespace_name: tablespace.name().to_string(),
            page_size: tablespace.page_size() as u32,
        };
        self.append_row(SYS_TABLESPACES, row.encode())
    }

    fn append_row(&self, sys_table: &str, bytes: Vec<u8>) -> Result<RecordLocation> {
        let header_page = self.sys_header_pages[sys_table];
        append_row_to_chain(&self.catalog_pool, header_page, &bytes)
    }

    fn scan_system_table(&self, sys_table: &str) -> Result<Vec<Vec<u8>>> {
        let header_page = self.sys_header_pages[sys_table];
        scan_row_chain(&self.catalog_pool, header_page)
    }
}

/// Walk a table's data-page chain (page headers' `next_page` links),
/// collecting every live record's bytes.
fn scan_row_chain(pool: &BufferPoolManager, header_page: PageNumber) -> Result<Vec<Vec<u8>>> {
    pool.fetch(header_page)?;
    let first = pool.read(header_page, table_header::first_data_page_id)?;
    pool.unpin(header_page, false)?;

    let mut out = Vec::new();
    let mut current = first;
    while current != NO_PAGE {
        let page_number = current as u32;
        pool.fetch(page_number)?;
        let (rows, next) = pool.read(page_number, |page| {
            let rows: Vec<Vec<u8>> = table_data::iter_records(page).into_iter().map(|(_, _, bytes)| bytes).collect();
            (rows, header::next_page(page.data()))
        })?;
        pool.unpin(page_number, false)?;
        out.extend(rows);
        current = next;
    }
    Ok(out)
}

/// Append one row to a table's data-page chain, allocating and linking a
/// new data page if the current tail is full.
fn append_row_to_chain(pool: &BufferPoolManager, header_page: PageNumber, bytes: &[u8]) -> Result<RecordLocation> {
    pool.fetch(header_page)?;
    let first = pool.read(header_page, table_header::first_data_page_id)?;
    pool.unpin(header_page, false)?;

    let mut current = first;
    let mut prev: Option<PageNumber> = None;
    loop {
        if current == NO_PAGE {
            let new_page = pool.new_page()?;
            pool.write(new_page, |page| {
                TableDataPage::initialize(page);
            })?;
            if let Some(prev_page) = prev {
                pool.write(prev_page, |page| header::set_next_page(page.data_mut(), new_page as i32))?;
                pool.unpin(prev_page, true)?;
            } else {
                pool.write(header_page, |page| {
                    TableHeaderPage::new(page).set_first_data_page_id(new_page as i32)
                })?;
                pool.unpin(header_page, true)?;
            }
            current = new_page as i32;
        }

        let page_number = current as u32;
        pool.fetch(page_number)?;
        let fits = pool.read(page_number, |page| table_data::can_fit(page, bytes.len()))?;
        if fits {
            let slot = pool.write(page_number, |page| TableDataPage::new(page).insert(bytes))??;
            pool.unpin(page_number, true)?;
            return Ok(RecordLocation::new(page_number, slot));
        }
        let next = pool.read(page_number, |page| header::next_page(page.data()))?;
        pool.unpin(page_number, false)?;
        prev = Some(page_number);
        current = next;
    }
}

/// Full page-type scan of one tablespace, looking for table-header pages
/// and the name each one claims. This is the whole point of the bootstrap
/// redesign: it is run every time, never cached across restarts.
fn scan_table_headers(ts: &Tablespace) -> Result<HashMap<String, PageNumber>> {
    let mut found = HashMap::new();
    let total = ts.container().total_pages();
    for page_number in 2..total {
        let Some(bytes) = ts.container().read_page(page_number)? else {
            continue;
        };
        if bytes.len() < 32 {
            continue;
        }
        let tag = match PageType::from_byte(bytes[0]) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if tag != PageType::TableHeader {
            continue;
        }
        let mut page = crate::storage::Page::from_bytes(ts.name(), page_number, bytes);
        if header::validate_magic(page.data()).is_err() {
            continue;
        }
        match TableHeaderPage::new(&mut page).table_name() {
            Ok(name) => {
                found.insert(name, page_number);
            }
            Err(e) => warn!(tablespace = ts.name(), page_number, %e, "unreadable table-header page"),
        }
    }
    Ok(found)
}

/// Write `name`'s table-header and first table-data page. Does not record
/// a SYS_TABLES/SYS_COLUMNS row for `name` itself — `bootstrap` does that
/// once every system table's header page exists, so the first table in
/// `SYSTEM_TABLE_NAMES` can describe itself without its own row table
/// existing yet.
fn create_system_table(pool: &Arc<BufferPoolManager>, name: &str) -> Result<PageNumber> {
    let columns = system_columns_for(name);
    let header_page = pool.new_page()?;
    let data_page = pool.new_page()?;
    pool.write(header_page, |page| -> Result<()> {
        TableHeaderPage::initialize(page, name, &columns)?;
        Ok(())
    })??;
    pool.write(data_page, |page| {
        TableDataPage::initialize(page);
    })?;
    pool.write(header_page, |page| TableHeaderPage::new(page).set_first_data_page_id(data_page as i32))?;
    pool.unpin(header_page, true)?;
    pool.unpin(data_page, true)?;
    Ok(header_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_storage() -> (tempfile::TempDir, StorageManager) {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
        (dir, storage)
    }

    #[test]
    fn bootstrap_creates_all_five_system_tables() {
        let (_dir, storage) = new_storage();
        let catalog = Catalog::bootstrap(&storage, "catalog", 32).unwrap();
        for name in SYSTEM_TABLE_NAMES {
            assert!(catalog.sys_header_pages.contains_key(name));
        }
    }

    #[test]
    fn bootstrap_records_each_system_table_in_sys_tables_and_sys_columns() {
        let (_dir, storage) = new_storage();
        let catalog = Catalog::bootstrap(&storage, "catalog", 32).unwrap();

        let mut names = catalog.table_names();
        names.sort();
        let mut expected: Vec<&str> = SYSTEM_TABLE_NAMES.to_vec();
        expected.sort();
        assert_eq!(names, expected);

        for name in SYSTEM_TABLE_NAMES {
            let cols = catalog.columns(name).unwrap();
            assert_eq!(cols.len(), system_columns_for(name).len());
        }
    }

    #[test]
    fn bootstrap_is_idempotent_on_reopen() {
        let (dir, storage) = new_storage();
        {
            Catalog::bootstrap(&storage, "catalog", 32).unwrap();
        }
        let storage2 = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
        let catalog2 = Catalog::bootstrap(&storage2, "catalog", 32).unwrap();
        let mut names = catalog2.table_names();
        names.sort();
        let mut expected: Vec<&str> = SYSTEM_TABLE_NAMES.to_vec();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn create_table_is_visible_after_reload() {
        let (_dir, storage) = new_storage();
        let catalog = Catalog::bootstrap(&storage, "catalog", 32).unwrap();
        let user_ts = storage.create_tablespace("main", 4).unwrap();
        let pool = BufferPoolManager::new(user_ts, 32);
        let columns = vec![ColumnDef {
            name: "id".into(),
            data_type: 0,
            max_length: 4,
            nullable: false,
        }];
        catalog.create_table(&pool, "main", "orders", &columns).unwrap();

        assert!(catalog.table("orders").is_some());
        catalog.reload().unwrap();
        let meta = catalog.table("orders").unwrap();
        assert_eq!(meta.tablespace_name, "main");
        let cols = catalog.columns("orders").unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].column_name, "id");
    }

    #[test]
    fn bootstrap_survives_reopen_by_rescanning_pages() {
        let (dir, storage) = new_storage();
        {
            let catalog = Catalog::bootstrap(&storage, "catalog", 32).unwrap();
            let user_ts = storage.create_tablespace("main", 4).unwrap();
            let pool = BufferPoolManager::new(user_ts, 32);
            let columns = vec![ColumnDef {
                name: "id".into(),
                data_type: 0,
                max_length: 4,
                nullable: false,
            }];
            catalog.create_table(&pool, "main", "orders", &columns).unwrap();
        }
        let storage2 = StorageManager::new(dir.path().to_path_buf(), 4096).unwrap();
        let catalog2 = Catalog::bootstrap(&storage2, "catalog", 32).unwrap();
        assert!(catalog2.table("orders").is_some());
    }

    #[test]
    fn create_duplicate_table_errors() {
        let (_dir, storage) = new_storage();
        let catalog = Catalog::bootstrap(&storage, "catalog", 32).unwrap();
        let user_ts = storage.create_tablespace("main", 4).unwrap();
        let pool = BufferPoolManager::new(user_ts, 32);
        let columns = vec![ColumnDef {
            name: "id".into(),
            data_type: 0,
            max_length: 4,
            nullable: false,
        }];
        catalog.create_table(&pool, "main", "orders", &columns).unwrap();
        assert!(catalog.create_table(&pool, "main", "orders", &columns).is_err());
    }
}
