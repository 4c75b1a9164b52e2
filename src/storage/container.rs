//! Storage container: one tablespace's file on disk, its page-0 metadata,
//! and its page-1 free-space bitmap (spec §4.1 "Storage Container"). A
//! container exclusively owns its file handle; nothing above it is allowed
//! to share that ownership (spec §5).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::common::{PageNumber, PageType, CONTAINER_METADATA_PAGE, FREE_SPACE_MAP_PAGE};
use crate::error::{Result, StorageError};
use crate::storage::layout::{ContainerMetadataPage, FreeSpaceMapPage};
use crate::storage::page::Page;

struct ContainerInner {
    file: File,
    total_pages: u32,
    bitmap_capacity: u32,
    last_checked_page: u32,
    bitmap: Vec<u8>,
}

/// A single tablespace's on-disk container: one file, one free-space
/// bitmap, guarded by a single mutex (spec §5's "bounded-cache,
/// single-mutex" concurrency model — no per-page latching).
pub struct StorageContainer {
    name: String,
    page_size: usize,
    path: PathBuf,
    inner: Mutex<ContainerInner>,
}

const INITIAL_PAGES: u32 = 3;

impl StorageContainer {
    /// Open (creating if absent) the container file at `path`. For a fresh
    /// file, `initial_pages` sets the starting page count. For an existing
    /// file, its page count comes from its own metadata and is only ever
    /// grown — never truncated — to at least `initial_pages`.
    pub fn open(name: &str, path: &Path, page_size: usize, initial_pages: u32) -> Result<Self> {
        if path.exists() {
            Self::open_existing(name, path, page_size, initial_pages)
        } else {
            Self::create(name, path, page_size, initial_pages.max(INITIAL_PAGES))
        }
    }

    fn create(name: &str, path: &Path, page_size: usize, initial_pages: u32) -> Result<Self> {
        debug!(tablespace = name, ?path, page_size, initial_pages, "creating container");
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let capacity = FreeSpaceMapPage::max_capacity(page_size);
        let now_ms = now_millis();

        let mut meta_page = Page::new(name, CONTAINER_METADATA_PAGE, page_size);
        {
            let mut meta = ContainerMetadataPage::initialize(&mut meta_page, page_size as u32, now_ms, FREE_SPACE_MAP_PAGE, name)?;
            meta.set_total_pages(initial_pages);
        }

        let mut fsm_page = Page::new(name, FREE_SPACE_MAP_PAGE, page_size);
        let bitmap_offset_in_page = PAGE_HEADER_PLUS_FSM_FIXED_FIELDS;
        {
            FreeSpaceMapPage::initialize(&mut fsm_page, capacity, initial_pages);
        }

        file.write_all(meta_page.data())?;
        file.write_all(fsm_page.data())?;
        let zero_page = vec![0u8; page_size];
        for _ in 2..initial_pages {
            file.write_all(&zero_page)?;
        }
        file.sync_all()?;

        let bitmap = fsm_page.data()[bitmap_offset_in_page..].to_vec();

        Ok(Self {
            name: name.to_string(),
            page_size,
            path: path.to_path_buf(),
            inner: Mutex::new(ContainerInner {
                file,
                total_pages: initial_pages,
                bitmap_capacity: capacity,
                last_checked_page: 1,
                bitmap,
            }),
        })
    }

    fn open_existing(name: &str, path: &Path, page_size: usize, initial_pages: u32) -> Result<Self> {
        debug!(tablespace = name, ?path, initial_pages, "opening existing container");
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut meta_buf = vec![0u8; page_size];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut meta_buf)?;
        let mut meta_page = Page::from_bytes(name, CONTAINER_METADATA_PAGE, meta_buf);
        crate::common::header::validate_magic(meta_page.data())?;
        if crate::common::header::page_type(meta_page.data())? != PageType::ContainerMetadata {
            return Err(StorageError::InvalidPage(format!(
                "page 0 of {name} is not a container metadata page"
            )));
        }
        let mut meta = ContainerMetadataPage::new(&mut meta_page);
        let on_disk_page_size = meta.page_size() as usize;
        if on_disk_page_size != page_size {
            return Err(StorageError::InvalidArgument(format!(
                "container {name} was created with page size {on_disk_page_size}, engine requested {page_size}"
            )));
        }
        let total_pages_on_disk = meta.total_pages();
        meta.set_last_opened_at(now_millis());

        let mut fsm_buf = vec![0u8; page_size];
        file.seek(SeekFrom::Start(page_size as u64))?;
        file.read_exact(&mut fsm_buf)?;
        let mut fsm_page = Page::from_bytes(name, FREE_SPACE_MAP_PAGE, fsm_buf);
        crate::common::header::validate_magic(fsm_page.data())?;
        if crate::common::header::page_type(fsm_page.data())? != PageType::FreeSpaceMap {
            return Err(StorageError::InvalidPage(format!(
                "page 1 of {name} is not a free-space map page"
            )));
        }
        let bitmap_capacity = {
            let fsm = FreeSpaceMapPage::new(&mut fsm_page);
            fsm.capacity()
        };
        let last_checked_page = {
            let fsm = FreeSpaceMapPage::new(&mut fsm_page);
            fsm.last_checked_page()
        };

        // Only grow, never truncate: extend the file with zero-filled pages
        // and mark each newly added page free in the bitmap (spec §4.1).
        let total_pages = total_pages_on_disk.max(initial_pages);
        if total_pages > total_pages_on_disk {
            info!(
                tablespace = name,
                from = total_pages_on_disk,
                to = total_pages,
                "extending existing container to meet requested initial_pages"
            );
            let zero_page = vec![0u8; page_size];
            file.seek(SeekFrom::Start(total_pages_on_disk as u64 * page_size as u64))?;
            for _ in total_pages_on_disk..total_pages {
                file.write_all(&zero_page)?;
            }
            let mut fsm = FreeSpaceMapPage::new(&mut fsm_page);
            for p in total_pages_on_disk..total_pages {
                fsm.set_free(p, true);
            }
            meta.set_total_pages(total_pages);
        }

        // Persist the refreshed container-metadata last_opened_at timestamp
        // (and the extended total_pages / bitmap, if this container grew).
        file.seek(SeekFrom::Start(0))?;
        file.write_all(meta_page.data())?;
        file.seek(SeekFrom::Start(page_size as u64))?;
        file.write_all(fsm_page.data())?;
        file.sync_all()?;

        let bitmap = fsm_page.data()[PAGE_HEADER_PLUS_FSM_FIXED_FIELDS..].to_vec();

        Ok(Self {
            name: name.to_string(),
            page_size,
            path: path.to_path_buf(),
            inner: Mutex::new(ContainerInner {
                file,
                total_pages,
                bitmap_capacity,
                last_checked_page,
                bitmap,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_pages(&self) -> u32 {
        self.inner.lock().total_pages
    }

    /// `Ok(None)` for an out-of-range page number — this is not an error
    /// condition, it just means the page has never been allocated.
    pub fn read_page(&self, page_number: PageNumber) -> Result<Option<Vec<u8>>> {
        let mut guard = self.inner.lock();
        if page_number >= guard.total_pages {
            trace!(tablespace = %self.name, page_number, "read of unallocated page");
            return Ok(None);
        }
        let mut buf = vec![0u8; self.page_size];
        let offset = page_number as u64 * self.page_size as u64;
        guard.file.seek(SeekFrom::Start(offset))?;
        guard.file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    pub fn write_page(&self, page_number: PageNumber, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(StorageError::InvalidArgument(format!(
                "page buffer is {} bytes, container page size is {}",
                data.len(),
                self.page_size
            )));
        }
        let mut guard = self.inner.lock();
        if page_number >= guard.total_pages {
            return Err(StorageError::NotFound(format!(
                "page {page_number} not allocated in tablespace {}",
                self.name
            )));
        }
        let offset = page_number as u64 * self.page_size as u64;
        guard.file.seek(SeekFrom::Start(offset))?;
        guard.file.write_all(data)?;
        guard.file.sync_data()?;
        Ok(())
    }

    /// Find a free page via the bitmap's round-robin scan, or grow the file
    /// by one page if the bitmap has nothing free. Returns a zero-filled
    /// page that is now marked used.
    pub fn allocate_page(&self) -> Result<PageNumber> {
        let mut guard = self.inner.lock();
        let page_size = self.page_size;

        let found = {
            let mut scratch = Page::new(&self.name, FREE_SPACE_MAP_PAGE, page_size);
            rehydrate_fsm_page(&mut scratch, &guard);
            let fsm = FreeSpaceMapPage::new(&mut scratch);
            fsm.find_free()
        };

        let page_number = match found {
            Some(p) => {
                let mut scratch = Page::new(&self.name, FREE_SPACE_MAP_PAGE, page_size);
                rehydrate_fsm_page(&mut scratch, &guard);
                {
                    let mut fsm = FreeSpaceMapPage::new(&mut scratch);
                    fsm.set_free(p, false);
                    fsm.set_last_checked_page(p);
                }
                guard.last_checked_page = p;
                guard.bitmap = scratch.data()[PAGE_HEADER_PLUS_FSM_FIXED_FIELDS..].to_vec();
                p
            }
            None => {
                let p = guard.total_pages;
                guard.total_pages += 1;
                p
            }
        };

        let zero_page = vec![0u8; page_size];
        let offset = page_number as u64 * page_size as u64;
        guard.file.seek(SeekFrom::Start(offset))?;
        guard.file.write_all(&zero_page)?;

        persist_fsm_and_meta(&self.name, page_size, &mut guard)?;
        guard.file.sync_all()?;
        trace!(tablespace = %self.name, page_number, "allocated page");
        Ok(page_number)
    }

    pub fn deallocate_page(&self, page_number: PageNumber) -> Result<()> {
        let mut guard = self.inner.lock();
        let page_size = self.page_size;
        let mut scratch = Page::new(&self.name, FREE_SPACE_MAP_PAGE, page_size);
        rehydrate_fsm_page(&mut scratch, &guard);
        {
            let mut fsm = FreeSpaceMapPage::new(&mut scratch);
            fsm.set_free(page_number, true);
        }
        guard.bitmap = scratch.data()[PAGE_HEADER_PLUS_FSM_FIXED_FIELDS..].to_vec();
        persist_fsm_and_meta(&self.name, page_size, &mut guard)?;
        guard.file.sync_data()?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        let guard = self.inner.lock();
        guard.file.sync_all()?;
        debug!(tablespace = %self.name, "container closed");
        Ok(())
    }
}

/// Byte offset of the bitmap body within a free-space-map page, mirroring
/// `free_space_map::BITMAP_OFF` (private to that module, so recomputed
/// here from the same fixed fields).
const PAGE_HEADER_PLUS_FSM_FIXED_FIELDS: usize = crate::common::PAGE_HEADER_SIZE + 4 + 4;

fn rehydrate_fsm_page(scratch: &mut Page, guard: &ContainerInner) {
    FreeSpaceMapPage::initialize(scratch, guard.bitmap_capacity, 0);
    {
        let mut fsm = FreeSpaceMapPage::new(scratch);
        fsm.set_last_checked_page(guard.last_checked_page);
    }
    let buf = scratch.data_mut();
    buf[PAGE_HEADER_PLUS_FSM_FIXED_FIELDS..].copy_from_slice(&guard.bitmap);
}

fn persist_fsm_and_meta(name: &str, page_size: usize, guard: &mut ContainerInner) -> Result<()> {
    let mut fsm_page = Page::new(name, FREE_SPACE_MAP_PAGE, page_size);
    rehydrate_fsm_page(&mut fsm_page, guard);
    guard.file.seek(SeekFrom::Start(page_size as u64))?;
    guard.file.write_all(fsm_page.data())?;

    let mut meta_buf = vec![0u8; page_size];
    guard.file.seek(SeekFrom::Start(0))?;
    guard.file.read_exact(&mut meta_buf)?;
    let mut meta_page = Page::from_bytes(name, CONTAINER_METADATA_PAGE, meta_buf);
    {
        let mut meta = ContainerMetadataPage::new(&mut meta_page);
        meta.set_total_pages(guard.total_pages);
    }
    guard.file.seek(SeekFrom::Start(0))?;
    guard.file.write_all(meta_page.data())?;
    Ok(())
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_reopen_preserves_total_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("widgets.rsc");
        {
            let c = StorageContainer::open("widgets", &path, 4096, 4).unwrap();
            assert_eq!(c.total_pages(), 4);
            c.close().unwrap();
        }
        let c = StorageContainer::open("widgets", &path, 4096, 4).unwrap();
        assert_eq!(c.total_pages(), 4);
    }

    #[test]
    fn reopen_extends_file_when_initial_pages_grows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("widgets.rsc");
        {
            let c = StorageContainer::open("widgets", &path, 4096, 4).unwrap();
            assert_eq!(c.total_pages(), 4);
            c.close().unwrap();
        }
        let c = StorageContainer::open("widgets", &path, 4096, 8).unwrap();
        assert_eq!(c.total_pages(), 8);
        // The newly added pages are marked free, so allocation reuses one
        // of them instead of growing the file further.
        let p = c.allocate_page().unwrap();
        assert!((4..8).contains(&p));
        assert_eq!(c.total_pages(), 8);
        c.close().unwrap();

        // Reopening again with the same initial_pages leaves it untouched.
        let c = StorageContainer::open("widgets", &path, 4096, 8).unwrap();
        assert_eq!(c.total_pages(), 8);
    }

    #[test]
    fn allocate_reuses_freed_pages_before_growing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.rsc");
        let c = StorageContainer::open("t", &path, 4096, 4).unwrap();
        let before = c.total_pages();
        let p2 = c.allocate_page().unwrap();
        assert!(p2 == 2 || p2 == 3);
        c.deallocate_page(p2).unwrap();
        let reused = c.allocate_page().unwrap();
        assert_eq!(reused, p2);
        assert_eq!(c.total_pages(), before);
    }

    #[test]
    fn allocate_grows_file_once_bitmap_is_exhausted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.rsc");
        let c = StorageContainer::open("t", &path, 4096, 4).unwrap();
        let first = c.allocate_page().unwrap();
        let second = c.allocate_page().unwrap();
        assert_ne!(first, second);
        assert!(c.total_pages() >= 5);
    }

    #[test]
    fn read_page_out_of_range_is_none_not_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.rsc");
        let c = StorageContainer::open("t", &path, 4096, 3).unwrap();
        assert!(c.read_page(999).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.rsc");
        let c = StorageContainer::open("t", &path, 4096, 3).unwrap();
        let p = c.allocate_page().unwrap();
        let mut data = vec![0u8; 4096];
        data[40] = 0xAB;
        c.write_page(p, &data).unwrap();
        let back = c.read_page(p).unwrap().unwrap();
        assert_eq!(back[40], 0xAB);
    }
}
