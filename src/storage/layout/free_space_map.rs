//! Free-space bitmap page (page 1 of every container). Spec §3/§4.1.
//!
//! Bit `i` is 1 iff page `i` is free. Pages 0 and 1 are permanently used
//! (their bits are never set). Capacity is fixed at container-creation
//! time to whatever fits on a single page for the container's page size —
//! the core never spills the bitmap onto a second page (spec §9 open
//! question, resolved in DESIGN.md).

use crate::common::{header, PageType, PAGE_HEADER_SIZE};
use crate::storage::page::Page;

const LAST_CHECKED_OFF: usize = PAGE_HEADER_SIZE;
const CAPACITY_OFF: usize = LAST_CHECKED_OFF + 4;
const BITMAP_OFF: usize = CAPACITY_OFF + 4;

/// Largest bitmap (in bits) that fits in one page of the given size.
pub fn max_capacity(page_size: usize) -> u32 {
    let available_bytes = page_size.saturating_sub(BITMAP_OFF);
    (available_bytes * 8) as u32
}

pub struct FreeSpaceMapPage<'a> {
    page: &'a mut Page,
}

impl<'a> FreeSpaceMapPage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Fresh free-space map: pages 0/1 used, pages `2..populated_pages`
    /// free, everything above that (up to `capacity`) unused until the
    /// container grows into it.
    pub fn initialize(page: &'a mut Page, capacity: u32, populated_pages: u32) -> Self {
        {
            let buf = page.data_mut();
            header::init(buf, PageType::FreeSpaceMap);
        }
        let mut view = Self { page };
        view.set_capacity(capacity);
        view.set_last_checked_page(1);
        for i in 2..populated_pages.min(capacity) {
            view.set_free(i, true);
        }
        view
    }

    pub fn last_checked_page(&self) -> u32 {
        u32::from_le_bytes(
            self.page.data()[LAST_CHECKED_OFF..LAST_CHECKED_OFF + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_last_checked_page(&mut self, v: u32) {
        self.page.data_mut()[LAST_CHECKED_OFF..LAST_CHECKED_OFF + 4].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn capacity(&self) -> u32 {
        u32::from_le_bytes(self.page.data()[CAPACITY_OFF..CAPACITY_OFF + 4].try_into().unwrap())
    }

    fn set_capacity(&mut self, v: u32) {
        self.page.data_mut()[CAPACITY_OFF..CAPACITY_OFF + 4].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn is_free(&self, page_number: u32) -> bool {
        if page_number >= self.capacity() {
            return false;
        }
        let byte = BITMAP_OFF + (page_number / 8) as usize;
        let bit = page_number % 8;
        (self.page.data()[byte] >> bit) & 1 == 1
    }

    /// Set or clear the free bit for `page_number`. Pages 0 and 1 are
    /// always forced to "used" regardless of the request.
    pub fn set_free(&mut self, page_number: u32, free: bool) {
        if page_number < 2 || page_number >= self.capacity() {
            return;
        }
        let byte = BITMAP_OFF + (page_number / 8) as usize;
        let bit = page_number % 8;
        let buf = self.page.data_mut();
        if free {
            buf[byte] |= 1 << bit;
        } else {
            buf[byte] &= !(1 << bit);
        }
        self.page.mark_dirty();
    }

    /// Two-pass round-robin scan starting just after `last_checked_page`,
    /// wrapping back to page 2. Returns the first free page found but does
    /// not mark it used or advance `last_checked_page` — the caller
    /// (`StorageContainer::allocate_page`) does that once it has
    /// zero-filled the page on disk.
    pub fn find_free(&self) -> Option<u32> {
        let capacity = self.capacity();
        if capacity <= 2 {
            return None;
        }
        let start = self.last_checked_page();
        for i in (start + 1)..capacity {
            if self.is_free(i) {
                return Some(i);
            }
        }
        for i in 2..=start.min(capacity - 1) {
            if self.is_free(i) {
                return Some(i);
            }
        }
        None
    }

    pub fn count_free(&self) -> u32 {
        (0..self.capacity()).filter(|&i| self.is_free(i)).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_pages_never_free() {
        let mut page = Page::new("U", 1, 4096);
        let map = FreeSpaceMapPage::initialize(&mut page, 100, 10);
        assert!(!map.is_free(0));
        assert!(!map.is_free(1));
        for i in 2..10 {
            assert!(map.is_free(i), "page {i} should start free");
        }
        for i in 10..100 {
            assert!(!map.is_free(i), "page {i} should not exist yet");
        }
    }

    #[test]
    fn set_free_ignores_reserved_pages() {
        let mut page = Page::new("U", 1, 4096);
        let mut map = FreeSpaceMapPage::initialize(&mut page, 100, 10);
        map.set_free(0, true);
        map.set_free(1, true);
        assert!(!map.is_free(0));
        assert!(!map.is_free(1));
    }

    #[test]
    fn round_robin_scan_wraps() {
        let mut page = Page::new("U", 1, 4096);
        let mut map = FreeSpaceMapPage::initialize(&mut page, 20, 20);
        // everything 2..20 free; last_checked_page starts at 1
        assert_eq!(map.find_free(), Some(2));
        map.set_free(2, false);
        map.set_last_checked_page(2);
        assert_eq!(map.find_free(), Some(3));

        // mark everything used except page 5, with last_checked beyond it
        for i in 2..20 {
            map.set_free(i, false);
        }
        map.set_free(5, true);
        map.set_last_checked_page(15);
        assert_eq!(map.find_free(), Some(5));
    }

    #[test]
    fn no_free_page_returns_none() {
        let mut page = Page::new("U", 1, 4096);
        let map = FreeSpaceMapPage::initialize(&mut page, 20, 2);
        assert_eq!(map.find_free(), None);
    }
}
