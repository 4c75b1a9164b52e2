//! Container metadata page (page 0 of every container). Spec §3
//! "Container Metadata".

use crate::common::{header, PageType, PAGE_HEADER_SIZE};
use crate::error::{Result, StorageError};
use crate::storage::page::Page;

/// Byte offsets within the page, after the 32-byte header.
const PAGE_SIZE_OFF: usize = PAGE_HEADER_SIZE;
const CREATED_AT_OFF: usize = PAGE_SIZE_OFF + 4;
const LAST_OPENED_AT_OFF: usize = CREATED_AT_OFF + 8;
const TOTAL_PAGES_OFF: usize = LAST_OPENED_AT_OFF + 8;
const FREE_SPACE_MAP_PAGE_ID_OFF: usize = TOTAL_PAGES_OFF + 4;
const NAME_LEN_OFF: usize = FREE_SPACE_MAP_PAGE_ID_OFF + 4;
const NAME_OFF: usize = NAME_LEN_OFF + 2;

/// Typed view over a container-metadata page. Never cached in a buffer
/// pool; the storage container reads/writes it directly.
pub struct ContainerMetadataPage<'a> {
    page: &'a mut Page,
}

impl<'a> ContainerMetadataPage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    pub fn initialize(
        page: &'a mut Page,
        page_size: u32,
        created_at_ms: i64,
        free_space_map_page_id: u32,
        tablespace_name: &str,
    ) -> Result<Self> {
        {
            let buf = page.data_mut();
            header::init(buf, PageType::ContainerMetadata);
        }
        let mut view = Self { page };
        view.set_page_size(page_size);
        view.set_created_at(created_at_ms);
        view.set_last_opened_at(created_at_ms);
        view.set_total_pages(0);
        view.set_free_space_map_page_id(free_space_map_page_id);
        view.set_tablespace_name(tablespace_name)?;
        Ok(view)
    }

    pub fn page_size(&self) -> u32 {
        u32::from_le_bytes(self.page.data()[PAGE_SIZE_OFF..PAGE_SIZE_OFF + 4].try_into().unwrap())
    }

    pub fn set_page_size(&mut self, v: u32) {
        self.page.data_mut()[PAGE_SIZE_OFF..PAGE_SIZE_OFF + 4].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn created_at(&self) -> i64 {
        i64::from_le_bytes(self.page.data()[CREATED_AT_OFF..CREATED_AT_OFF + 8].try_into().unwrap())
    }

    pub fn set_created_at(&mut self, v: i64) {
        self.page.data_mut()[CREATED_AT_OFF..CREATED_AT_OFF + 8].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn last_opened_at(&self) -> i64 {
        i64::from_le_bytes(
            self.page.data()[LAST_OPENED_AT_OFF..LAST_OPENED_AT_OFF + 8]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_last_opened_at(&mut self, v: i64) {
        self.page.data_mut()[LAST_OPENED_AT_OFF..LAST_OPENED_AT_OFF + 8].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn total_pages(&self) -> u32 {
        u32::from_le_bytes(
            self.page.data()[TOTAL_PAGES_OFF..TOTAL_PAGES_OFF + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_total_pages(&mut self, v: u32) {
        self.page.data_mut()[TOTAL_PAGES_OFF..TOTAL_PAGES_OFF + 4].copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn free_space_map_page_id(&self) -> u32 {
        u32::from_le_bytes(
            self.page.data()[FREE_SPACE_MAP_PAGE_ID_OFF..FREE_SPACE_MAP_PAGE_ID_OFF + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_free_space_map_page_id(&mut self, v: u32) {
        self.page.data_mut()[FREE_SPACE_MAP_PAGE_ID_OFF..FREE_SPACE_MAP_PAGE_ID_OFF + 4]
            .copy_from_slice(&v.to_le_bytes());
        self.page.mark_dirty();
    }

    pub fn tablespace_name(&self) -> Result<String> {
        let buf = self.page.data();
        let len = u16::from_le_bytes(buf[NAME_LEN_OFF..NAME_LEN_OFF + 2].try_into().unwrap()) as usize;
        let end = NAME_OFF + len * 2;
        if end > buf.len() {
            return Err(StorageError::Corruption(
                "container metadata tablespace name overruns page".into(),
            ));
        }
        let units: Vec<u16> = buf[NAME_OFF..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        crate::common::utf16::decode(&units)
    }

    pub fn set_tablespace_name(&mut self, name: &str) -> Result<()> {
        let units = crate::common::utf16::encode(name);
        let len = units.len();
        let end = NAME_OFF + len * 2;
        if end > self.page.data().len() {
            return Err(StorageError::InvalidArgument(format!(
                "tablespace name {name:?} too long for page size"
            )));
        }
        let buf = self.page.data_mut();
        buf[NAME_LEN_OFF..NAME_LEN_OFF + 2].copy_from_slice(&(len as u16).to_le_bytes());
        for (i, unit) in units.iter().enumerate() {
            buf[NAME_OFF + i * 2..NAME_OFF + i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        self.page.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_and_read_back() {
        let mut page = Page::new("U", 0, 4096);
        {
            let mut meta =
                ContainerMetadataPage::initialize(&mut page, 4096, 1_700_000_000_000, 1, "widgets").unwrap();
            meta.set_total_pages(3);
        }
        let meta = ContainerMetadataPage::new(&mut page);
        assert_eq!(meta.page_size(), 4096);
        assert_eq!(meta.created_at(), 1_700_000_000_000);
        assert_eq!(meta.last_opened_at(), 1_700_000_000_000);
        assert_eq!(meta.total_pages(), 3);
        assert_eq!(meta.free_space_map_page_id(), 1);
        assert_eq!(meta.tablespace_name().unwrap(), "widgets");
    }
}
