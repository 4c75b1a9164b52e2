//! Slotted table-data page (spec §3 "Table Data Page", §4.2 "Page
//! Layouts"). The slot directory grows up from right after the header;
//! record payloads grow down from the end of the page. The shared header's
//! `free_space_offset` field tracks the current top of the payload region;
//! `row_count` lives in the four bytes right after the header, so the
//! directory starts at `HEADER_SIZE + 4` and the §8 invariant
//! `row_count * 8 + 36 <= free_space_offset <= page_size` holds directly.
//!
//! Deletion is not implemented: a record, once inserted, keeps its slot for
//! the life of the page. Tables only grow.

use crate::common::{header, PageType, RecordLocation, PAGE_HEADER_SIZE};
use crate::error::{Result, StorageError};
use crate::storage::page::Page;

const SLOT_SIZE: usize = 8;
const SLOT_COUNT_OFF: usize = PAGE_HEADER_SIZE;
const DIR_OFF: usize = SLOT_COUNT_OFF + 4;

pub struct TableDataPage<'a> {
    page: &'a mut Page,
}

impl<'a> TableDataPage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn initialize(page: &'a mut Page) -> Self {
        let page_size = page.data().len() as u32;
        {
            let buf = page.data_mut();
            header::init(buf, PageType::TableData);
            header::set_free_space_offset(buf, page_size);
        }
        let mut view = Self { page };
        view.set_slot_count(0);
        view
    }

    pub fn slot_count(&self) -> u32 {
        u32::from_le_bytes(self.page.data()[SLOT_COUNT_OFF..SLOT_COUNT_OFF + 4].try_into().unwrap())
    }

    fn set_slot_count(&mut self, v: u32) {
        self.page.data_mut()[SLOT_COUNT_OFF..SLOT_COUNT_OFF + 4].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    fn slot_offset(&self, slot: u32) -> usize {
        DIR_OFF + slot as usize * SLOT_SIZE
    }

    /// Raw `(payload_offset, payload_len)` for a slot. `payload_offset ==
    /// u32::MAX` marks a slot that was reserved but never populated — not
    /// currently produced by this layout, kept for forward compatibility
    /// with the on-disk format.
    fn slot_entry(&self, slot: u32) -> (u32, u32) {
        let off = self.slot_offset(slot);
        let buf = self.page.data();
        let payload_off = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let payload_len = u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap());
        (payload_off, payload_len)
    }

    /// Bytes available for one more `SLOT_SIZE`-plus-payload insertion.
    pub fn free_space(&self) -> usize {
        let dir_end = self.slot_offset(self.slot_count());
        let free_off = header::free_space_offset(self.page.data()) as usize;
        free_off.saturating_sub(dir_end)
    }

    pub fn can_fit(&self, payload_len: usize) -> bool {
        self.free_space() >= SLOT_SIZE + payload_len
    }

    /// Append `payload` to this page, returning its slot number.
    pub fn insert(&mut self, payload: &[u8]) -> Result<u32> {
        if !self.can_fit(payload.len()) {
            return Err(StorageError::InvalidArgument(
                "table data page has no room for this record".into(),
            ));
        }
        let slot_count = self.slot_count();
        let free_off = header::free_space_offset(self.page.data()) as usize;
        let new_payload_off = free_off - payload.len();
        let slot_off = self.slot_offset(slot_count);
        {
            let buf = self.page.data_mut();
            buf[new_payload_off..new_payload_off + payload.len()].copy_from_slice(payload);
            buf[slot_off..slot_off + 4].copy_from_slice(&(new_payload_off as u32).to_le_bytes());
            buf[slot_off + 4..slot_off + 8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        }
        self.set_slot_count(slot_count + 1);
        header::set_free_space_offset(self.page.data_mut(), new_payload_off as u32);
        self.page.mark_dirty();
        Ok(slot_count)
    }

    pub fn get(&self, slot: u32) -> Result<Option<Vec<u8>>> {
        if slot >= self.slot_count() {
            return Err(StorageError::NotFound(format!(
                "slot {slot} on page {}",
                self.page.page_number()
            )));
        }
        let (off, len) = self.slot_entry(slot);
        if off == u32::MAX {
            return Ok(None);
        }
        let off = off as usize;
        let len = len as usize;
        Ok(Some(self.page.data()[off..off + len].to_vec()))
    }

    /// All live records on this page as `(slot, location, bytes)`.
    pub fn iter_records(&self) -> Vec<(u32, RecordLocation, Vec<u8>)> {
        let mut out = Vec::new();
        for slot in 0..self.slot_count() {
            let (off, len) = self.slot_entry(slot);
            if off == u32::MAX {
                continue;
            }
            let bytes = self.page.data()[off as usize..off as usize + len as usize].to_vec();
            out.push((slot, RecordLocation::new(self.page.page_number(), slot), bytes));
        }
        out
    }
}

/// `can_fit` given only a shared borrow, for callers inside a buffer-pool
/// read closure (see [`table_header::first_data_page_id`](super::table_header::first_data_page_id)
/// for why this pair exists).
pub fn can_fit(page: &Page, payload_len: usize) -> bool {
    let buf = page.data();
    let slot_count = u32::from_le_bytes(buf[SLOT_COUNT_OFF..SLOT_COUNT_OFF + 4].try_into().unwrap());
    let dir_end = DIR_OFF + slot_count as usize * SLOT_SIZE;
    let free_off = header::free_space_offset(buf) as usize;
    let free = free_off.saturating_sub(dir_end);
    free >= SLOT_SIZE + payload_len
}

/// `iter_records` given only a shared borrow; see [`can_fit`] above.
pub fn iter_records(page: &Page) -> Vec<(u32, RecordLocation, Vec<u8>)> {
    let buf = page.data();
    let slot_count = u32::from_le_bytes(buf[SLOT_COUNT_OFF..SLOT_COUNT_OFF + 4].try_into().unwrap());
    let mut out = Vec::new();
    for slot in 0..slot_count {
        let off_pos = DIR_OFF + slot as usize * SLOT_SIZE;
        let payload_off = u32::from_le_bytes(buf[off_pos..off_pos + 4].try_into().unwrap());
        let payload_len = u32::from_le_bytes(buf[off_pos + 4..off_pos + 8].try_into().unwrap());
        if payload_off == u32::MAX {
            continue;
        }
        let bytes = buf[payload_off as usize..payload_off as usize + payload_len as usize].to_vec();
        out.push((slot, RecordLocation::new(page.page_number(), slot), bytes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut page = Page::new("U", 5, 256);
        let mut view = TableDataPage::initialize(&mut page);
        let s0 = view.insert(b"row-a").unwrap();
        let s1 = view.insert(b"row-bb").unwrap();
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
        assert_eq!(view.get(0).unwrap().unwrap(), b"row-a");
        assert_eq!(view.get(1).unwrap().unwrap(), b"row-bb");
    }

    #[test]
    fn get_out_of_range_slot_errors() {
        let mut page = Page::new("U", 5, 256);
        let view = TableDataPage::initialize(&mut page);
        assert!(view.get(0).is_err());
    }

    #[test]
    fn insert_fails_once_page_is_full() {
        let mut page = Page::new("U", 5, 64);
        let mut view = TableDataPage::initialize(&mut page);
        let mut inserted = 0;
        while view.insert(b"0123456789").is_ok() {
            inserted += 1;
        }
        assert!(inserted > 0);
        assert!(!view.can_fit(10));
    }

    #[test]
    fn iter_records_reports_locations() {
        let mut page = Page::new("U", 7, 256);
        let mut view = TableDataPage::initialize(&mut page);
        view.insert(b"x").unwrap();
        view.insert(b"yy").unwrap();
        let records = view.iter_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1, RecordLocation::new(7, 0));
        assert_eq!(records[1].1, RecordLocation::new(7, 1));
        assert_eq!(records[1].2, b"yy");
    }

    #[test]
    fn row_count_is_a_u32_at_offset_32_and_invariant_holds() {
        assert_eq!(SLOT_COUNT_OFF, 32);
        assert_eq!(DIR_OFF, 36);

        let page_size = 256usize;
        let mut page = Page::new("U", 9, page_size as u32);
        let mut view = TableDataPage::initialize(&mut page);
        for payload in [&b"a"[..], &b"bb"[..], &b"ccc"[..]] {
            view.insert(payload).unwrap();
            let free_space_offset = header::free_space_offset(view.page.data()) as usize;
            let row_count = view.slot_count() as usize;
            assert!(row_count * 8 + 36 <= free_space_offset);
            assert!(free_space_offset <= page_size);
        }
    }
}
