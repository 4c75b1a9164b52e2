//! Shared identifiers and on-disk constants used across the storage
//! substrate: page identity, the fixed 32-byte page header layout, and the
//! page-type tag enumeration from the external file format.

use crate::error::{Result, StorageError};

/// Page number within a single container. Page 0 is container metadata,
/// page 1 is the free-space map; both are permanently reserved.
pub type PageNumber = u32;

/// Location of a row within a table's data pages: `(page, slot)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    pub page_id: PageNumber,
    pub slot: u32,
}

impl RecordLocation {
    pub fn new(page_id: PageNumber, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

/// Magic number stamped into every page header, little-endian on disk.
pub const MAGIC: u32 = 0xDADA_DADA;

/// Size in bytes of the fixed header present at the start of every page.
pub const PAGE_HEADER_SIZE: usize = 32;

/// Default page size when a tablespace is created without an explicit one.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Container metadata always lives on page 0.
pub const CONTAINER_METADATA_PAGE: PageNumber = 0;

/// The free-space bitmap always lives on page 1.
pub const FREE_SPACE_MAP_PAGE: PageNumber = 1;

/// Sentinel for "no page" in chain pointers (`next`/`prev`/`first_data_page_id`).
pub const NO_PAGE: i32 = -1;

/// Page-type tag, byte 0 of the page header. Values match the external
/// file-format interface in spec §6 exactly; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Unused = 0,
    TableHeader = 1,
    TableData = 2,
    IndexHeader = 3,
    IndexInternal = 4,
    IndexLeaf = 5,
    // 6 is intentionally unused in the external format.
    FreeSpaceMap = 7,
    TransactionLog = 8,
    ContainerMetadata = 9,
}

impl PageType {
    pub fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => PageType::Unused,
            1 => PageType::TableHeader,
            2 => PageType::TableData,
            3 => PageType::IndexHeader,
            4 => PageType::IndexInternal,
            5 => PageType::IndexLeaf,
            7 => PageType::FreeSpaceMap,
            8 => PageType::TransactionLog,
            9 => PageType::ContainerMetadata,
            other => return Err(StorageError::InvalidPage(format!("unknown page-type byte {other}"))),
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// The key type stored in a B-tree, also used to size index-page entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyType {
    Integer = 0,
    Float = 1,
    StringKey = 2,
}

impl KeyType {
    pub fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            0 => KeyType::Integer,
            1 => KeyType::Float,
            2 => KeyType::StringKey,
            other => return Err(StorageError::InvalidPage(format!("unknown key-type byte {other}"))),
        })
    }
}

/// Read a 32-byte page header field. All multi-byte integers on disk are
/// little-endian (spec §6).
pub(crate) mod header {
    use super::*;

    pub fn page_type(buf: &[u8]) -> Result<PageType> {
        PageType::from_byte(buf[0])
    }

    pub fn magic(buf: &[u8]) -> u32 {
        u32::from_le_bytes(buf[1..5].try_into().unwrap())
    }

    pub fn next_page(buf: &[u8]) -> i32 {
        i32::from_le_bytes(buf[5..9].try_into().unwrap())
    }

    pub fn set_next_page(buf: &mut [u8], v: i32) {
        buf[5..9].copy_from_slice(&v.to_le_bytes());
    }

    pub fn prev_page(buf: &[u8]) -> i32 {
        i32::from_le_bytes(buf[9..13].try_into().unwrap())
    }

    pub fn set_prev_page(buf: &mut [u8], v: i32) {
        buf[9..13].copy_from_slice(&v.to_le_bytes());
    }

    pub fn free_space_offset(buf: &[u8]) -> u32 {
        u32::from_le_bytes(buf[13..17].try_into().unwrap())
    }

    pub fn set_free_space_offset(buf: &mut [u8], v: u32) {
        buf[13..17].copy_from_slice(&v.to_le_bytes());
    }

    /// Stamp a fresh header: type byte, magic, next/prev = NO_PAGE, zeroed
    /// free-space offset, reserved bytes zero-filled.
    pub fn init(buf: &mut [u8], page_type: PageType) {
        buf[..PAGE_HEADER_SIZE].fill(0);
        buf[0] = page_type.as_byte();
        buf[1..5].copy_from_slice(&MAGIC.to_le_bytes());
        set_next_page(buf, NO_PAGE);
        set_prev_page(buf, NO_PAGE);
        set_free_space_offset(buf, 0);
    }

    pub fn validate_magic(buf: &[u8]) -> Result<()> {
        if magic(buf) != MAGIC {
            return Err(StorageError::InvalidPage("magic number mismatch".into()));
        }
        Ok(())
    }
}

/// UTF-16 length-prefixed string codec shared by the catalog and index-page
/// string keys. On-disk strings are `length (integer) + UTF-16 code units`;
/// in-memory strings stay native `String` (spec §9).
pub mod utf16 {
    use crate::error::{Result, StorageError};

    /// Encode `s` as UTF-16 code units (no length prefix); caller decides
    /// the prefix width (u16 for catalog names, u32 for index-key strings).
    pub fn encode(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    pub fn decode(units: &[u16]) -> Result<String> {
        char::decode_utf16(units.iter().copied())
            .collect::<std::result::Result<String, _>>()
            .map_err(|e| StorageError::Corruption(format!("invalid UTF-16 in on-disk string: {e}")))
    }

    pub fn byte_len(units_len: usize) -> usize {
        units_len * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_type_round_trips() {
        for (b, expected) in [
            (0u8, PageType::Unused),
            (1, PageType::TableHeader),
            (2, PageType::TableData),
            (3, PageType::IndexHeader),
            (4, PageType::IndexInternal),
            (5, PageType::IndexLeaf),
            (7, PageType::FreeSpaceMap),
            (8, PageType::TransactionLog),
            (9, PageType::ContainerMetadata),
        ] {
            let t = PageType::from_byte(b).unwrap();
            assert_eq!(t, expected);
            assert_eq!(t.as_byte(), b);
        }
        assert!(PageType::from_byte(6).is_err());
        assert!(PageType::from_byte(200).is_err());
    }

    #[test]
    fn header_init_and_read_back() {
        let mut buf = vec![0xFFu8; 64];
        header::init(&mut buf, PageType::TableData);
        assert_eq!(header::page_type(&buf).unwrap(), PageType::TableData);
        assert_eq!(header::magic(&buf), MAGIC);
        assert_eq!(header::next_page(&buf), NO_PAGE);
        assert_eq!(header::prev_page(&buf), NO_PAGE);
        assert_eq!(header::free_space_offset(&buf), 0);
        assert!(buf[17..32].iter().all(|&b| b == 0));

        header::set_next_page(&mut buf, 42);
        header::set_prev_page(&mut buf, 7);
        header::set_free_space_offset(&mut buf, 4000);
        assert_eq!(header::next_page(&buf), 42);
        assert_eq!(header::prev_page(&buf), 7);
        assert_eq!(header::free_space_offset(&buf), 4000);

        header::validate_magic(&buf).unwrap();
        buf[1] ^= 0xFF;
        assert!(header::validate_magic(&buf).is_err());
    }

    #[test]
    fn utf16_round_trip() {
        let s = "row-42 \u{1F600}";
        let units = utf16::encode(s);
        let back = utf16::decode(&units).unwrap();
        assert_eq!(s, back);
        assert_eq!(utf16::byte_len(units.len()), units.len() * 2);
    }
}
