//! Buffer-pool-backed access to B-tree node pages. Each function here
//! fetches exactly the page it needs, applies the layout, and unpins
//! before returning — the tree's insert/search algorithms in
//! [`crate::btree::tree`] never hold more than one page pinned at a time,
//! relying on the pool's single mutex for consistency instead of latching
//! a path of pages.

use crate::buffer::BufferPoolManager;
use crate::common::{KeyType, PageNumber, RecordLocation};
use crate::error::Result;
use crate::storage::layout::{IndexNodePage, KeyValue};

pub struct LeafNode {
    pub page_number: PageNumber,
    pub entries: Vec<(KeyValue, RecordLocation)>,
    pub next_leaf: i32,
}

pub struct InternalNode {
    pub page_number: PageNumber,
    pub first_child: i32,
    pub entries: Vec<(KeyValue, i32)>,
}

pub fn is_leaf(pool: &BufferPoolManager, page_number: PageNumber) -> Result<bool> {
    pool.fetch(page_number)?;
    let result = pool.read(page_number, IndexNodePage::is_leaf)?;
    pool.unpin(page_number, false)?;
    result
}

pub fn read_leaf(pool: &BufferPoolManager, page_number: PageNumber, key_type: KeyType) -> Result<LeafNode> {
    pool.fetch(page_number)?;
    let (entries, next_leaf) = pool.read(page_number, |page| -> Result<_> {
        Ok((IndexNodePage::read_leaf(page, key_type)?, IndexNodePage::next_leaf(page)))
    })??;
    pool.unpin(page_number, false)?;
    Ok(LeafNode { page_number, entries, next_leaf })
}

pub fn read_internal(pool: &BufferPoolManager, page_number: PageNumber, key_type: KeyType) -> Result<InternalNode> {
    pool.fetch(page_number)?;
    let (entries, first_child) = pool.read(page_number, |page| -> Result<_> {
        Ok((IndexNodePage::read_internal(page, key_type)?, IndexNodePage::first_child(page)))
    })??;
    pool.unpin(page_number, false)?;
    Ok(InternalNode { page_number, first_child, entries })
}

/// Create a fresh, empty leaf page and return its number, pinned once by
/// `new_page` and immediately unpinned here.
pub fn new_leaf(pool: &BufferPoolManager) -> Result<PageNumber> {
    let page_number = pool.new_page()?;
    pool.write(page_number, |page| IndexNodePage::init_leaf(page))?;
    pool.unpin(page_number, true)?;
    Ok(page_number)
}

pub fn new_internal(pool: &BufferPoolManager, first_child: PageNumber) -> Result<PageNumber> {
    let page_number = pool.new_page()?;
    pool.write(page_number, |page| IndexNodePage::init_internal(page, first_child as i32))?;
    pool.unpin(page_number, true)?;
    Ok(page_number)
}

pub fn write_leaf(
    pool: &BufferPoolManager,
    page_number: PageNumber,
    entries: &[(KeyValue, RecordLocation)],
    next_leaf: i32,
) -> Result<()> {
    pool.fetch(page_number)?;
    pool.write(page_number, |page| {
        IndexNodePage::set_next_leaf(page, next_leaf);
        IndexNodePage::write_leaf(page, entries)
    })??;
    pool.unpin(page_number, true)?;
    Ok(())
}

pub fn write_internal(
    pool: &BufferPoolManager,
    page_number: PageNumber,
    first_child: i32,
    entries: &[(KeyValue, i32)],
) -> Result<()> {
    pool.fetch(page_number)?;
    pool.write(page_number, |page| IndexNodePage::write_internal(page, first_child, entries))??;
    pool.unpin(page_number, true)?;
    Ok(())
}

/// Whether the whole of `entries` fits in one leaf page of `page_size` bytes.
pub fn leaf_fits(page_size: usize, entries: &[(KeyValue, RecordLocation)]) -> bool {
    let body = IndexNodePage::leaf_body_len(entries);
    IndexNodePage::fits(page_size, crate::common::PAGE_HEADER_SIZE + 2, body)
}

pub fn internal_fits(page_size: usize, entries: &[(KeyValue, i32)]) -> bool {
    let body = IndexNodePage::internal_body_len(entries);
    IndexNodePage::fits(page_size, crate::common::PAGE_HEADER_SIZE + 2 + 4, body)
}
