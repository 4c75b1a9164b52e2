//! Buffer pool manager: one per tablespace, caching pages from its
//! container under a fixed frame capacity (spec §4.1 "Buffer Pool
//! Manager", §5 concurrency model).
//!
//! The whole frame table sits behind one [`parking_lot::Mutex`] — no
//! per-page latches, no lock-free page table. Eviction is plain FIFO over
//! the unpinned frames: the oldest frame that isn't pinned loses, dirty or
//! not (dirty frames are flushed first). This is deliberately simpler than
//! a recency-aware policy; the spec scopes this engine to a single
//! cooperative process, not a multi-tenant cache.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::buffer::events::{self, BufferPoolEvent};
use crate::common::PageNumber;
use crate::error::{Result, StorageError};
use crate::storage::page::Page;
use crate::storage::tablespace::Tablespace;

struct PoolInner {
    frames: HashMap<PageNumber, Page>,
    fifo: VecDeque<PageNumber>,
}

impl PoolInner {
    fn touch_fifo(&mut self, page_number: PageNumber) {
        self.fifo.push_back(page_number);
    }
}

pub struct BufferPoolManager {
    tablespace: Arc<Tablespace>,
    capacity: usize,
    inner: Mutex<PoolInner>,
}

impl BufferPoolManager {
    pub fn new(tablespace: Arc<Tablespace>, capacity: usize) -> Self {
        Self {
            tablespace,
            capacity,
            inner: Mutex::new(PoolInner {
                frames: HashMap::new(),
                fifo: VecDeque::new(),
            }),
        }
    }

    pub fn tablespace_name(&self) -> &str {
        self.tablespace.name()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn page_size(&self) -> usize {
        self.tablespace.page_size()
    }

    pub fn cached_pages(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Allocate a brand-new page in the backing container, cache it pinned
    /// once, and return its number.
    pub fn new_page(&self) -> Result<PageNumber> {
        let page_number = self.tablespace.container().allocate_page()?;
        events::record(self.tablespace_name(), page_number, BufferPoolEvent::Allocate);
        let mut page = Page::new(self.tablespace_name(), page_number, self.tablespace.page_size());
        page.pin();
        page.mark_dirty();
        let mut guard = self.inner.lock();
        if let Err(e) = self.make_room(&mut guard, 1) {
            drop(guard);
            let _ = self.tablespace.container().deallocate_page(page_number);
            return Err(e);
        }
        guard.frames.insert(page_number, page);
        guard.touch_fifo(page_number);
        events::record(self.tablespace_name(), page_number, BufferPoolEvent::Pin);
        Ok(page_number)
    }

    /// Pin `page_number`, loading it from disk into a frame if it isn't
    /// already cached.
    pub fn fetch(&self, page_number: PageNumber) -> Result<()> {
        let mut guard = self.inner.lock();
        if let Some(page) = guard.frames.get_mut(&page_number) {
            page.pin();
            events::record(self.tablespace_name(), page_number, BufferPoolEvent::Pin);
            return Ok(());
        }
        self.make_room(&mut guard, 1)?;
        let data = self
            .tablespace
            .container()
            .read_page(page_number)?
            .ok_or_else(|| StorageError::NotFound(format!("page {page_number} in {}", self.tablespace_name())))?;
        events::record(self.tablespace_name(), page_number, BufferPoolEvent::Read);
        let mut page = Page::from_bytes(self.tablespace_name(), page_number, data);
        page.pin();
        guard.frames.insert(page_number, page);
        guard.touch_fifo(page_number);
        events::record(self.tablespace_name(), page_number, BufferPoolEvent::Pin);
        Ok(())
    }

    /// Decrement the pin count on an already-fetched page. Panics (via
    /// `Page::unpin`) if called more times than the page was fetched.
    pub fn unpin(&self, page_number: PageNumber, dirty: bool) -> Result<()> {
        let mut guard = self.inner.lock();
        let page = guard
            .frames
            .get_mut(&page_number)
            .ok_or_else(|| StorageError::NotFound(format!("page {page_number} not cached")))?;
        page.unpin();
        if dirty {
            page.mark_dirty();
            events::record(self.tablespace_name(), page_number, BufferPoolEvent::MarkDirty);
        }
        events::record(self.tablespace_name(), page_number, BufferPoolEvent::Unpin);
        Ok(())
    }

    pub fn read<R>(&self, page_number: PageNumber, f: impl FnOnce(&Page) -> R) -> Result<R> {
        let guard = self.inner.lock();
        let page = guard
            .frames
            .get(&page_number)
            .ok_or_else(|| StorageError::NotFound(format!("page {page_number} not cached")))?;
        Ok(f(page))
    }

    pub fn write<R>(&self, page_number: PageNumber, f: impl FnOnce(&mut Page) -> R) -> Result<R> {
        let mut guard = self.inner.lock();
        let page = guard
            .frames
            .get_mut(&page_number)
            .ok_or_else(|| StorageError::NotFound(format!("page {page_number} not cached")))?;
        let r = f(page);
        page.mark_dirty();
        events::record(self.tablespace_name(), page_number, BufferPoolEvent::Write);
        Ok(r)
    }

    pub fn flush(&self, page_number: PageNumber) -> Result<()> {
        let mut guard = self.inner.lock();
        self.flush_locked(&mut guard, page_number)
    }

    fn flush_locked(&self, guard: &mut PoolInner, page_number: PageNumber) -> Result<()> {
        if let Some(page) = guard.frames.get_mut(&page_number) {
            if page.is_dirty() {
                self.tablespace.container().write_page(page_number, page.data())?;
                page.clear_dirty();
                events::record(self.tablespace_name(), page_number, BufferPoolEvent::Flush);
            }
        }
        Ok(())
    }

    /// Flush every dirty cached page, aggregating failures rather than
    /// stopping at the first one (engine shutdown wants a full attempt).
    pub fn flush_all(&self) -> std::result::Result<(), Vec<(PageNumber, StorageError)>> {
        let mut guard = self.inner.lock();
        let dirty: Vec<PageNumber> = guard
            .frames
            .iter()
            .filter(|(_, p)| p.is_dirty())
            .map(|(n, _)| *n)
            .collect();
        let mut errors = Vec::new();
        for page_number in dirty {
            if let Err(e) = self.flush_locked(&mut guard, page_number) {
                errors.push((page_number, e));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Evict unpinned frames via FIFO until at least `needed` more frames
    /// fit, or error if there aren't enough evictable frames. A no-op when
    /// the pool has not yet reached capacity.
    fn make_room(&self, guard: &mut PoolInner, needed: usize) -> Result<()> {
        while guard.frames.len() + needed > self.capacity {
            let mut attempts = guard.fifo.len();
            let mut evicted = false;
            while attempts > 0 {
                attempts -= 1;
                let candidate = match guard.fifo.pop_front() {
                    Some(c) => c,
                    None => break,
                };
                let evictable = guard.frames.get(&candidate).map(|p| p.is_evictable()).unwrap_or(false);
                if !guard.frames.contains_key(&candidate) {
                    continue;
                }
                if !evictable {
                    guard.fifo.push_back(candidate);
                    continue;
                }
                self.flush_locked(guard, candidate)?;
                guard.frames.remove(&candidate);
                events::record(self.tablespace_name(), candidate, BufferPoolEvent::Evict);
                evicted = true;
                break;
            }
            if !evicted {
                return Err(StorageError::NoEvictable(self.tablespace_name().to_string()));
            }
        }
        Ok(())
    }
}

/// Handle to the background cooperative task that periodically flushes
/// dirty, unpinned pages so eviction rarely has to flush synchronously.
pub struct Cleaner {
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Cleaner {
    pub fn spawn(pool: Arc<BufferPoolManager>, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let task_shutdown = shutdown.clone();
        let task_stopped = stopped.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(errors) = pool.flush_all() {
                            for (page_number, err) in errors {
                                trace!(tablespace = pool.tablespace_name(), page_number, %err, "cleaner flush failed");
                            }
                        }
                    }
                    _ = task_shutdown.notified() => {
                        task_stopped.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
        Self { shutdown, stopped, handle }
    }

    pub async fn stop(self) {
        self.shutdown.notify_one();
        let _ = self.handle.await;
        debug!(stopped = self.stopped.load(Ordering::SeqCst), "buffer pool cleaner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pool(capacity: usize) -> (tempfile::TempDir, BufferPoolManager) {
        let dir = tempdir().unwrap();
        let ts = Tablespace::open(dir.path(), "t", 4096, 4).unwrap();
        (dir, BufferPoolManager::new(Arc::new(ts), capacity))
    }

    #[test]
    fn new_page_is_cached_and_pinned() {
        let (_dir, pool) = pool(8);
        let p = pool.new_page().unwrap();
        assert_eq!(pool.cached_pages(), 1);
        pool.read(p, |page| assert_eq!(page.pin_count(), 1)).unwrap();
    }

    #[test]
    fn new_page_is_already_dirty_before_any_write() {
        let (_dir, pool) = pool(8);
        let p = pool.new_page().unwrap();
        pool.read(p, |page| assert!(page.is_dirty())).unwrap();
        pool.unpin(p, false).unwrap();
        pool.flush(p).unwrap();
        pool.read(p, |page| assert!(!page.is_dirty())).unwrap();
    }

    #[test]
    fn write_marks_dirty_and_flush_clears_it() {
        let (_dir, pool) = pool(8);
        let p = pool.new_page().unwrap();
        pool.write(p, |page| page.data_mut()[40] = 7).unwrap();
        pool.read(p, |page| assert!(page.is_dirty())).unwrap();
        pool.flush(p).unwrap();
        pool.read(p, |page| assert!(!page.is_dirty())).unwrap();
    }

    #[test]
    fn eviction_refuses_when_everything_pinned() {
        let (_dir, pool) = pool(2);
        pool.new_page().unwrap();
        pool.new_page().unwrap();
        // both pages from new_page() stay pinned (pin_count 1) -- no room.
        assert!(pool.new_page().is_err());
    }

    #[test]
    fn unpinned_frames_evict_in_fifo_order() {
        let (_dir, pool) = pool(2);
        let p1 = pool.new_page().unwrap();
        pool.unpin(p1, false).unwrap();
        let p2 = pool.new_page().unwrap();
        pool.unpin(p2, false).unwrap();
        // pool is full but both unpinned; allocating a third must evict p1 first.
        let p3 = pool.new_page().unwrap();
        assert_eq!(pool.cached_pages(), 2);
        assert!(pool.read(p1, |_| ()).is_err());
        assert!(pool.read(p2, |_| ()).is_ok());
        assert!(pool.read(p3, |_| ()).is_ok());
    }
}
