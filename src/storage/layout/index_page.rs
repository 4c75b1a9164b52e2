//! B-tree page layouts: the index-header page (page identity + root
//! pointer) and the leaf/internal node pages themselves (spec §3
//! "Index Header Page" / "Index Leaf Page" / "Index Internal Page", §4.3
//! "B-Tree").

use crate::common::{header, KeyType, PageType, RecordLocation, PAGE_HEADER_SIZE};
use crate::error::{Result, StorageError};
use crate::storage::page::Page;

/// A decoded B-tree key. Comparisons go through `cmp_key` rather than `Ord`
/// because floats need `total_cmp` to stay a total order.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Integer(i64),
    Float(f64),
    Str(String),
}

impl KeyValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::Integer(_) => KeyType::Integer,
            KeyValue::Float(_) => KeyType::Float,
            KeyValue::Str(_) => KeyType::StringKey,
        }
    }

    pub fn cmp_key(&self, other: &KeyValue) -> std::cmp::Ordering {
        match (self, other) {
            (KeyValue::Integer(a), KeyValue::Integer(b)) => a.cmp(b),
            (KeyValue::Float(a), KeyValue::Float(b)) => a.total_cmp(b),
            (KeyValue::Str(a), KeyValue::Str(b)) => a.cmp(b),
            _ => panic!("comparing keys of different types"),
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.encode().len()
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            KeyValue::Integer(v) => v.to_le_bytes().to_vec(),
            KeyValue::Float(v) => v.to_bits().to_le_bytes().to_vec(),
            KeyValue::Str(s) => {
                let units = crate::common::utf16::encode(s);
                let mut out = Vec::with_capacity(4 + units.len() * 2);
                out.extend_from_slice(&(units.len() as u32).to_le_bytes());
                for unit in &units {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                out
            }
        }
    }

    fn decode(key_type: KeyType, buf: &[u8], cursor: &mut usize) -> Result<KeyValue> {
        Ok(match key_type {
            KeyType::Integer => {
                let v = i64::from_le_bytes(buf[*cursor..*cursor + 8].try_into().unwrap());
                *cursor += 8;
                KeyValue::Integer(v)
            }
            KeyType::Float => {
                let bits = u64::from_le_bytes(buf[*cursor..*cursor + 8].try_into().unwrap());
                *cursor += 8;
                KeyValue::Float(f64::from_bits(bits))
            }
            KeyType::StringKey => {
                let len = u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap()) as usize;
                *cursor += 4;
                let units: Vec<u16> = buf[*cursor..*cursor + len * 2]
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                *cursor += len * 2;
                KeyValue::Str(crate::common::utf16::decode(&units)?)
            }
        })
    }
}

const HDR_KEY_TYPE_OFF: usize = PAGE_HEADER_SIZE;
const HDR_FANOUT_OFF: usize = HDR_KEY_TYPE_OFF + 1;
const HDR_UNIQUE_OFF: usize = HDR_FANOUT_OFF + 2;
const HDR_ROOT_PAGE_OFF: usize = HDR_UNIQUE_OFF + 1;
const HDR_NAME_LEN_OFF: usize = HDR_ROOT_PAGE_OFF + 4;
const HDR_NAME_OFF: usize = HDR_NAME_LEN_OFF + 2;

/// Page 0 of an index: identifies the index, its key type and fanout, and
/// points at the current root node (which may itself be a leaf while the
/// tree is small). Static functions over a borrowed page, not an owned
/// wrapper — B-tree code reaches this page through the buffer pool, which
/// hands out plain `&Page`/`&mut Page` borrows scoped to one closure call.
pub struct IndexHeaderPage;

impl IndexHeaderPage {
    pub fn initialize(
        page: &mut Page,
        key_type: KeyType,
        fanout: u16,
        unique: bool,
        index_name: &str,
    ) -> Result<()> {
        header::init(page.data_mut(), PageType::IndexHeader);
        Self::set_key_type(page, key_type);
        Self::set_fanout(page, fanout);
        Self::set_unique(page, unique);
        Self::set_root_page_id(page, crate::common::NO_PAGE);
        Self::set_index_name(page, index_name)?;
        Ok(())
    }

    pub fn key_type(page: &Page) -> Result<KeyType> {
        KeyType::from_byte(page.data()[HDR_KEY_TYPE_OFF])
    }

    fn set_key_type(page: &mut Page, kt: KeyType) {
        page.data_mut()[HDR_KEY_TYPE_OFF] = kt as u8;
        page.mark_dirty();
    }

    pub fn fanout(page: &Page) -> u16 {
        u16::from_le_bytes(page.data()[HDR_FANOUT_OFF..HDR_FANOUT_OFF + 2].try_into().unwrap())
    }

    fn set_fanout(page: &mut Page, v: u16) {
        page.data_mut()[HDR_FANOUT_OFF..HDR_FANOUT_OFF + 2].copy_from_slice(&v.to_le_bytes());
        page.mark_dirty();
    }

    pub fn is_unique(page: &Page) -> bool {
        page.data()[HDR_UNIQUE_OFF] != 0
    }

    fn set_unique(page: &mut Page, v: bool) {
        page.data_mut()[HDR_UNIQUE_OFF] = if v { 1 } else { 0 };
        page.mark_dirty();
    }

    pub fn root_page_id(page: &Page) -> i32 {
        i32::from_le_bytes(page.data()[HDR_ROOT_PAGE_OFF..HDR_ROOT_PAGE_OFF + 4].try_into().unwrap())
    }

    pub fn set_root_page_id(page: &mut Page, v: i32) {
        page.data_mut()[HDR_ROOT_PAGE_OFF..HDR_ROOT_PAGE_OFF + 4].copy_from_slice(&v.to_le_bytes());
        page.mark_dirty();
    }

    pub fn index_name(page: &Page) -> Result<String> {
        let buf = page.data();
        let len = u16::from_le_bytes(buf[HDR_NAME_LEN_OFF..HDR_NAME_LEN_OFF + 2].try_into().unwrap()) as usize;
        let end = HDR_NAME_OFF + len * 2;
        let units: Vec<u16> = buf[HDR_NAME_OFF..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        crate::common::utf16::decode(&units)
    }

    fn set_index_name(page: &mut Page, name: &str) -> Result<()> {
        let units = crate::common::utf16::encode(name);
        let end = HDR_NAME_OFF + units.len() * 2;
        if end > page.data().len() {
            return Err(StorageError::InvalidArgument(format!(
                "index name {name:?} too long for page size"
            )));
        }
        let buf = page.data_mut();
        buf[HDR_NAME_LEN_OFF..HDR_NAME_LEN_OFF + 2].copy_from_slice(&(units.len() as u16).to_le_bytes());
        for (i, unit) in units.iter().enumerate() {
            buf[HDR_NAME_OFF + i * 2..HDR_NAME_OFF + i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        page.mark_dirty();
        Ok(())
    }
}

const ENTRY_COUNT_OFF: usize = PAGE_HEADER_SIZE;
const LEAF_BODY_OFF: usize = ENTRY_COUNT_OFF + 2;
const INTERNAL_FIRST_CHILD_OFF: usize = ENTRY_COUNT_OFF + 2;
const INTERNAL_BODY_OFF: usize = INTERNAL_FIRST_CHILD_OFF + 4;

fn entry_count(page: &Page) -> u16 {
    u16::from_le_bytes(page.data()[ENTRY_COUNT_OFF..ENTRY_COUNT_OFF + 2].try_into().unwrap())
}

/// A node page is either a leaf (key -> row location, chained to its right
/// sibling via the generic header's `next_page` field) or internal (key ->
/// right-child boundary, with one extra leftmost child stored up front).
/// Both share the page-level machinery here; `btree::tree` drives the
/// split/promote algorithm on top of it.
pub struct IndexNodePage;

impl IndexNodePage {
    pub fn init_leaf(page: &mut Page) {
        header::init(page.data_mut(), PageType::IndexLeaf);
        page.data_mut()[ENTRY_COUNT_OFF..ENTRY_COUNT_OFF + 2].copy_from_slice(&0u16.to_le_bytes());
        page.mark_dirty();
    }

    pub fn init_internal(page: &mut Page, first_child: i32) {
        header::init(page.data_mut(), PageType::IndexInternal);
        page.data_mut()[ENTRY_COUNT_OFF..ENTRY_COUNT_OFF + 2].copy_from_slice(&0u16.to_le_bytes());
        page.data_mut()[INTERNAL_FIRST_CHILD_OFF..INTERNAL_FIRST_CHILD_OFF + 4]
            .copy_from_slice(&first_child.to_le_bytes());
        page.mark_dirty();
    }

    pub fn is_leaf(page: &Page) -> Result<bool> {
        Ok(match header::page_type(page.data())? {
            PageType::IndexLeaf => true,
            PageType::IndexInternal => false,
            other => {
                return Err(StorageError::InvalidPage(format!(
                    "expected index leaf/internal page, found {other:?}"
                )))
            }
        })
    }

    pub fn next_leaf(page: &Page) -> i32 {
        header::next_page(page.data())
    }

    pub fn set_next_leaf(page: &mut Page, v: i32) {
        header::set_next_page(page.data_mut(), v);
        page.mark_dirty();
    }

    pub fn entry_count(page: &Page) -> u16 {
        entry_count(page)
    }

    pub fn first_child(page: &Page) -> i32 {
        i32::from_le_bytes(
            page.data()[INTERNAL_FIRST_CHILD_OFF..INTERNAL_FIRST_CHILD_OFF + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Encoded byte size of `entries` if written as a leaf body, used to
    /// decide whether a node needs to split before inserting.
    pub fn leaf_body_len(entries: &[(KeyValue, RecordLocation)]) -> usize {
        entries.iter().map(|(k, _)| k.encode().len() + 8).sum()
    }

    pub fn internal_body_len(entries: &[(KeyValue, i32)]) -> usize {
        entries.iter().map(|(k, _)| k.encode().len() + 4).sum()
    }

    pub fn fits(page_size: usize, body_off: usize, body_len: usize) -> bool {
        body_off + body_len <= page_size
    }

    pub fn write_leaf(page: &mut Page, entries: &[(KeyValue, RecordLocation)]) -> Result<()> {
        let body_len = Self::leaf_body_len(entries);
        if !Self::fits(page.data().len(), LEAF_BODY_OFF, body_len) {
            return Err(StorageError::InvalidArgument(
                "leaf entries do not fit on one page".into(),
            ));
        }
        let next = IndexNodePage::next_leaf(page);
        header::init(page.data_mut(), PageType::IndexLeaf);
        let mut cursor = LEAF_BODY_OFF;
        {
            let buf = page.data_mut();
            buf[ENTRY_COUNT_OFF..ENTRY_COUNT_OFF + 2].copy_from_slice(&(entries.len() as u16).to_le_bytes());
            for (key, loc) in entries {
                let kb = key.encode();
                buf[cursor..cursor + kb.len()].copy_from_slice(&kb);
                cursor += kb.len();
                buf[cursor..cursor + 4].copy_from_slice(&loc.page_id.to_le_bytes());
                cursor += 4;
                buf[cursor..cursor + 4].copy_from_slice(&loc.slot.to_le_bytes());
                cursor += 4;
            }
        }
        IndexNodePage::set_next_leaf(page, next);
        page.mark_dirty();
        Ok(())
    }

    pub fn read_leaf(page: &Page, key_type: KeyType) -> Result<Vec<(KeyValue, RecordLocation)>> {
        let buf = page.data();
        let count = entry_count(page) as usize;
        let mut cursor = LEAF_BODY_OFF;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let key = KeyValue::decode(key_type, buf, &mut cursor)?;
            let page_id = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            let slot = u32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            out.push((key, RecordLocation::new(page_id, slot)));
        }
        Ok(out)
    }

    pub fn write_internal(page: &mut Page, first_child: i32, entries: &[(KeyValue, i32)]) -> Result<()> {
        let body_len = Self::internal_body_len(entries);
        if !Self::fits(page.data().len(), INTERNAL_BODY_OFF, body_len) {
            return Err(StorageError::InvalidArgument(
                "internal entries do not fit on one page".into(),
            ));
        }
        header::init(page.data_mut(), PageType::IndexInternal);
        let mut cursor = INTERNAL_BODY_OFF;
        {
            let buf = page.data_mut();
            buf[ENTRY_COUNT_OFF..ENTRY_COUNT_OFF + 2].copy_from_slice(&(entries.len() as u16).to_le_bytes());
            buf[INTERNAL_FIRST_CHILD_OFF..INTERNAL_FIRST_CHILD_OFF + 4]
                .copy_from_slice(&first_child.to_le_bytes());
            for (key, child) in entries {
                let kb = key.encode();
                buf[cursor..cursor + kb.len()].copy_from_slice(&kb);
                cursor += kb.len();
                buf[cursor..cursor + 4].copy_from_slice(&child.to_le_bytes());
                cursor += 4;
            }
        }
        page.mark_dirty();
        Ok(())
    }

    pub fn read_internal(page: &Page, key_type: KeyType) -> Result<Vec<(KeyValue, i32)>> {
        let buf = page.data();
        let count = entry_count(page) as usize;
        let mut cursor = INTERNAL_BODY_OFF;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let key = KeyValue::decode(key_type, buf, &mut cursor)?;
            let child = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            out.push((key, child));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_root_pointer() {
        let mut page = Page::new("U", 2, 4096);
        IndexHeaderPage::initialize(&mut page, KeyType::Integer, 64, true, "idx_id").unwrap();
        assert_eq!(IndexHeaderPage::root_page_id(&page), crate::common::NO_PAGE);
        IndexHeaderPage::set_root_page_id(&mut page, 5);
        assert_eq!(IndexHeaderPage::root_page_id(&page), 5);
        assert_eq!(IndexHeaderPage::fanout(&page), 64);
        assert_eq!(IndexHeaderPage::index_name(&page).unwrap(), "idx_id");
        assert_eq!(IndexHeaderPage::key_type(&page).unwrap(), KeyType::Integer);
        assert!(IndexHeaderPage::is_unique(&page));
    }

    #[test]
    fn leaf_entries_round_trip() {
        let mut page = Page::new("U", 3, 4096);
        IndexNodePage::init_leaf(&mut page);
        let entries = vec![
            (KeyValue::Integer(1), RecordLocation::new(10, 0)),
            (KeyValue::Integer(2), RecordLocation::new(10, 1)),
            (KeyValue::Integer(3), RecordLocation::new(11, 0)),
        ];
        IndexNodePage::write_leaf(&mut page, &entries).unwrap();
        IndexNodePage::set_next_leaf(&mut page, 99);
        assert!(IndexNodePage::is_leaf(&page).unwrap());
        assert_eq!(IndexNodePage::entry_count(&page), 3);
        assert_eq!(IndexNodePage::next_leaf(&page), 99);
        let back = IndexNodePage::read_leaf(&page, KeyType::Integer).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn internal_entries_round_trip() {
        let mut page = Page::new("U", 4, 4096);
        IndexNodePage::init_internal(&mut page, 20);
        let entries = vec![(KeyValue::Str("m".into()), 21), (KeyValue::Str("z".into()), 22)];
        IndexNodePage::write_internal(&mut page, 20, &entries).unwrap();
        assert!(!IndexNodePage::is_leaf(&page).unwrap());
        assert_eq!(IndexNodePage::first_child(&page), 20);
        let back = IndexNodePage::read_internal(&page, KeyType::StringKey).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn float_key_ordering_uses_total_cmp() {
        let a = KeyValue::Float(1.0);
        let b = KeyValue::Float(2.0);
        assert_eq!(a.cmp_key(&b), std::cmp::Ordering::Less);
        assert_eq!(KeyValue::Float(f64::NAN).cmp_key(&a), f64::NAN.total_cmp(&1.0));
    }
}
