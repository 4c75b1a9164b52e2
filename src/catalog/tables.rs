//! Row shapes of the five `SYS_*` catalog tables (spec §4.4 "Schema
//! Manager"). These live in the catalog tablespace as ordinary table-data
//! pages; nothing about their storage is special except that bootstrap
//! knows their names up front.

use crate::catalog::encode::{RowReader, RowWriter};
use crate::error::Result;

pub const SYS_TABLES: &str = "SYS_TABLES";
pub const SYS_COLUMNS: &str = "SYS_COLUMNS";
pub const SYS_INDEXES: &str = "SYS_INDEXES";
pub const SYS_INDEX_COLUMNS: &str = "SYS_INDEX_COLUMNS";
pub const SYS_TABLESPACES: &str = "SYS_TABLESPACES";

pub const SYSTEM_TABLE_NAMES: [&str; 5] = [SYS_TABLES, SYS_COLUMNS, SYS_INDEXES, SYS_INDEX_COLUMNS, SYS_TABLESPACES];

#[derive(Debug, Clone, PartialEq)]
pub struct SysTablesRow {
    pub table_name: String,
    pub tablespace_name: String,
    pub header_page_id: u32,
}

impl SysTablesRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RowWriter::new();
        w.write_string(&self.table_name);
        w.write_string(&self.tablespace_name);
        w.write_u32(self.header_page_id);
        w.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = RowReader::new(buf);
        Ok(Self {
            table_name: r.read_string()?,
            tablespace_name: r.read_string()?,
            header_page_id: r.read_u32(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SysColumnsRow {
    pub table_name: String,
    pub column_name: String,
    pub ordinal: u16,
    pub data_type: u8,
    pub max_length: u16,
    pub nullable: bool,
}

impl SysColumnsRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RowWriter::new();
        w.write_string(&self.table_name);
        w.write_string(&self.column_name);
        w.write_u16(self.ordinal);
        w.write_u8(self.data_type);
        w.write_u16(self.max_length);
        w.write_bool(self.nullable);
        w.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = RowReader::new(buf);
        Ok(Self {
            table_name: r.read_string()?,
            column_name: r.read_string()?,
            ordinal: r.read_u16(),
            data_type: r.read_u8(),
            max_length: r.read_u16(),
            nullable: r.read_bool(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SysIndexesRow {
    pub index_name: String,
    pub table_name: String,
    pub tablespace_name: String,
    pub header_page_id: u32,
    pub unique: bool,
}

impl SysIndexesRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RowWriter::new();
        w.write_string(&self.index_name);
        w.write_string(&self.table_name);
        w.write_string(&self.tablespace_name);
        w.write_u32(self.header_page_id);
        w.write_bool(self.unique);
        w.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = RowReader::new(buf);
        Ok(Self {
            index_name: r.read_string()?,
            table_name: r.read_string()?,
            tablespace_name: r.read_string()?,
            header_page_id: r.read_u32(),
            unique: r.read_bool(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SysIndexColumnsRow {
    pub index_name: String,
    pub column_name: String,
    pub ordinal: u16,
}

impl SysIndexColumnsRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RowWriter::new();
        w.write_string(&self.index_name);
        w.write_string(&self.column_name);
        w.write_u16(self.ordinal);
        w.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = RowReader::new(buf);
        Ok(Self {
            index_name: r.read_string()?,
            column_name: r.read_string()?,
            ordinal: r.read_u16(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SysTablespacesRow {
    pub tablespace_name: String,
    pub page_size: u32,
}

impl SysTablespacesRow {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RowWriter::new();
        w.write_string(&self.tablespace_name);
        w.write_u32(self.page_size);
        w.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = RowReader::new(buf);
        Ok(Self {
            tablespace_name: r.read_string()?,
            page_size: r.read_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_tables_row_round_trips() {
        let row = SysTablesRow {
            table_name: "orders".into(),
            tablespace_name: "main".into(),
            header_page_id: 12,
        };
        assert_eq!(SysTablesRow::decode(&row.encode()).unwrap(), row);
    }

    #[test]
    fn sys_indexes_row_round_trips() {
        let row = SysIndexesRow {
            index_name: "idx_orders_id".into(),
            table_name: "orders".into(),
            tablespace_name: "main".into(),
            header_page_id: 20,
            unique: true,
        };
        assert_eq!(SysIndexesRow::decode(&row.encode()).unwrap(), row);
    }
}
