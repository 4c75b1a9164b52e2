//! Table header page. Spec §3 "Table Header Page": names the table, lists
//! its columns, and anchors the chain of table-data pages.

use crate::common::{header, PageType, PAGE_HEADER_SIZE};
use crate::error::{Result, StorageError};
use crate::storage::page::Page;

const FIRST_DATA_PAGE_OFF: usize = PAGE_HEADER_SIZE;
const NAME_LEN_OFF: usize = FIRST_DATA_PAGE_OFF + 4;
const NAME_OFF: usize = NAME_LEN_OFF + 2;

/// One column of a table, as stored in the table-header page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: u8,
    pub max_length: u16,
    pub nullable: bool,
}

pub struct TableHeaderPage<'a> {
    page: &'a mut Page,
}

impl<'a> TableHeaderPage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn initialize(page: &'a mut Page, table_name: &str, columns: &[ColumnDef]) -> Result<Self> {
        {
            let buf = page.data_mut();
            header::init(buf, PageType::TableHeader);
        }
        let body = Self::encode(table_name, columns)?;
        if NAME_OFF + body.len() > page.data().len() {
            return Err(StorageError::InvalidArgument(format!(
                "table {table_name:?} schema does not fit in one page"
            )));
        }
        {
            let buf = page.data_mut();
            buf[FIRST_DATA_PAGE_OFF..FIRST_DATA_PAGE_OFF + 4].copy_from_slice(&(-1i32).to_le_bytes());
            buf[NAME_OFF..NAME_OFF + body.len()].copy_from_slice(&body);
        }
        page.mark_dirty();
        Ok(Self { page })
    }

    fn encode(table_name: &str, columns: &[ColumnDef]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let name_units = crate::common::utf16::encode(table_name);
        buf.extend_from_slice(&(name_units.len() as u16).to_le_bytes());
        for unit in &name_units {
            buf.extend_from_slice(&unit.to_le_bytes());
        }
        buf.extend_from_slice(&(columns.len() as u16).to_le_bytes());
        for col in columns {
            let col_units = crate::common::utf16::encode(&col.name);
            buf.extend_from_slice(&(col_units.len() as u16).to_le_bytes());
            for unit in &col_units {
                buf.extend_from_slice(&unit.to_le_bytes());
            }
            buf.push(col.data_type);
            buf.extend_from_slice(&col.max_length.to_le_bytes());
            buf.push(if col.nullable { 1 } else { 0 });
        }
        Ok(buf)
    }

    pub fn first_data_page_id(&self) -> i32 {
        i32::from_le_bytes(
            self.page.data()[FIRST_DATA_PAGE_OFF..FIRST_DATA_PAGE_OFF + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_first_data_page_id(&mut self, v: i32) {
        self.page.data_mut()[FIRST_DATA_PAGE_OFF..FIRST_DATA_PAGE_OFF + 4].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    /// `table_name` alone, without walking the whole column list. Used by
    /// catalog bootstrap's "scan every table-header page" probe.
    pub fn table_name(&self) -> Result<String> {
        let buf = self.page.data();
        let len = u16::from_le_bytes(buf[NAME_LEN_OFF..NAME_LEN_OFF + 2].try_into().unwrap()) as usize;
        let end = NAME_OFF + len * 2;
        if end > buf.len() {
            return Err(StorageError::CatalogCorruption(
                "table header name length overruns page".into(),
            ));
        }
        let units: Vec<u16> = buf[NAME_OFF..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        crate::common::utf16::decode(&units).map_err(|e| StorageError::CatalogCorruption(e.to_string()))
    }

    pub fn columns(&self) -> Result<Vec<ColumnDef>> {
        let buf = self.page.data();
        let name_len = u16::from_le_bytes(buf[NAME_LEN_OFF..NAME_LEN_OFF + 2].try_into().unwrap()) as usize;
        let mut cursor = NAME_OFF + name_len * 2;
        let column_count =
            u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;
        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let col_name_len =
                u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap()) as usize;
            cursor += 2;
            let units: Vec<u16> = buf[cursor..cursor + col_name_len * 2]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            cursor += col_name_len * 2;
            let name = crate::common::utf16::decode(&units)
                .map_err(|e| StorageError::CatalogCorruption(e.to_string()))?;
            let data_type = buf[cursor];
            cursor += 1;
            let max_length = u16::from_le_bytes(buf[cursor..cursor + 2].try_into().unwrap());
            cursor += 2;
            let nullable = buf[cursor] != 0;
            cursor += 1;
            columns.push(ColumnDef {
                name,
                data_type,
                max_length,
                nullable,
            });
        }
        Ok(columns)
    }
}

/// Read `first_data_page_id` given only a shared borrow. Catalog bootstrap
/// reaches this through `BufferPoolManager::read`, which only ever hands
/// out `&Page`, so the owned-wrapper accessor above doesn't fit there.
pub fn first_data_page_id(page: &Page) -> i32 {
    i32::from_le_bytes(
        page.data()[FIRST_DATA_PAGE_OFF..FIRST_DATA_PAGE_OFF + 4]
            .try_into()
            .unwrap(),
    )
}
