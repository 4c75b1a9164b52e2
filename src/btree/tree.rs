//! B-tree insert/search/range-scan over leaf and internal node pages
//! (spec §4.3 "B-Tree"). Fanout `M` bounds how many separator keys an
//! internal node may hold before it has to split; an oversized leaf splits
//! the same way, promoting its middle key to the parent.
//!
//! A root split is the one place this design has to do something a plain
//! recursive insert doesn't: the tree's root page number is recorded in
//! the index-header page, so growing the tree by one level means writing
//! a new root node and updating that header — not just returning a new
//! pointer to a caller that has nowhere durable to put it.

use std::sync::Arc;

use tracing::trace;

use crate::buffer::BufferPoolManager;
use crate::btree::node::{self, InternalNode, LeafNode};
use crate::common::{KeyType, PageNumber, RecordLocation, NO_PAGE};
use crate::error::{Result, StorageError};
use crate::storage::layout::{IndexHeaderPage, KeyValue};

pub struct BTree {
    pool: Arc<BufferPoolManager>,
    header_page: PageNumber,
    key_type: KeyType,
    fanout: u16,
    unique: bool,
}

impl BTree {
    /// Create a brand-new, empty index: just a header page with no root.
    pub fn create(
        pool: Arc<BufferPoolManager>,
        index_name: &str,
        key_type: KeyType,
        fanout: u16,
        unique: bool,
    ) -> Result<Self> {
        let header_page = pool.new_page()?;
        pool.write(header_page, |page| {
            IndexHeaderPage::initialize(page, key_type, fanout, unique, index_name)
        })??;
        pool.unpin(header_page, true)?;
        Ok(Self { pool, header_page, key_type, fanout, unique })
    }

    /// Reattach to an existing index via its header page number (read from
    /// SYS_INDEXES at catalog load time).
    pub fn open(pool: Arc<BufferPoolManager>, header_page: PageNumber) -> Result<Self> {
        pool.fetch(header_page)?;
        let (key_type, fanout, unique) = pool.read(header_page, |page| -> Result<_> {
            Ok((
                IndexHeaderPage::key_type(page)?,
                IndexHeaderPage::fanout(page),
                IndexHeaderPage::is_unique(page),
            ))
        })??;
        pool.unpin(header_page, false)?;
        Ok(Self { pool, header_page, key_type, fanout, unique })
    }

    pub fn header_page(&self) -> PageNumber {
        self.header_page
    }

    fn root_page_id(&self) -> Result<i32> {
        self.pool.fetch(self.header_page)?;
        let root = self.pool.read(self.header_page, IndexHeaderPage::root_page_id)?;
        self.pool.unpin(self.header_page, false)?;
        Ok(root)
    }

    fn set_root_page_id(&self, root: i32) -> Result<()> {
        self.pool.fetch(self.header_page)?;
        self.pool.write(self.header_page, |page| IndexHeaderPage::set_root_page_id(page, root))?;
        self.pool.unpin(self.header_page, true)?;
        Ok(())
    }

    /// Point lookup. `Ok(None)` if the key is absent — not an error.
    pub fn search(&self, key: &KeyValue) -> Result<Option<RecordLocation>> {
        let root = self.root_page_id()?;
        if root == NO_PAGE {
            return Ok(None);
        }
        let leaf = self.find_leaf(root as u32, key)?;
        Ok(leaf
            .entries
            .iter()
            .find(|(k, _)| k.cmp_key(key) == std::cmp::Ordering::Equal)
            .map(|(_, loc)| *loc))
    }

    /// All entries with `start <= key <= end` (either bound optional),
    /// walking leaf-to-leaf via the sibling chain.
    pub fn range_scan(
        &self,
        start: Option<&KeyValue>,
        end: Option<&KeyValue>,
    ) -> Result<Vec<(KeyValue, RecordLocation)>> {
        let root = self.root_page_id()?;
        if root == NO_PAGE {
            return Ok(Vec::new());
        }
        let mut leaf_page = match start {
            Some(k) => self.find_leaf(root as u32, k)?.page_number,
            None => self.leftmost_leaf(root as u32)?,
        };
        let mut out = Vec::new();
        loop {
            let leaf = node::read_leaf(&self.pool, leaf_page, self.key_type)?;
            for (k, loc) in &leaf.entries {
                if let Some(s) = start {
                    if k.cmp_key(s) == std::cmp::Ordering::Less {
                        continue;
                    }
                }
                if let Some(e) = end {
                    if k.cmp_key(e) == std::cmp::Ordering::Greater {
                        return Ok(out);
                    }
                }
                out.push((k.clone(), *loc));
            }
            if leaf.next_leaf == NO_PAGE {
                break;
            }
            leaf_page = leaf.next_leaf as u32;
        }
        Ok(out)
    }

    fn leftmost_leaf(&self, mut page_number: PageNumber) -> Result<PageNumber> {
        while !node::is_leaf(&self.pool, page_number)? {
            let internal = node::read_internal(&self.pool, page_number, self.key_type)?;
            page_number = internal.first_child as u32;
        }
        Ok(page_number)
    }

    fn find_leaf(&self, mut page_number: PageNumber, key: &KeyValue) -> Result<LeafNode> {
        loop {
            if node::is_leaf(&self.pool, page_number)? {
                return node::read_leaf(&self.pool, page_number, self.key_type);
            }
            let internal = node::read_internal(&self.pool, page_number, self.key_type)?;
            page_number = Self::choose_child(&internal, key);
        }
    }

    fn choose_child(internal: &InternalNode, key: &KeyValue) -> PageNumber {
        let mut child = internal.first_child as u32;
        for (k, c) in &internal.entries {
            if key.cmp_key(k) != std::cmp::Ordering::Less {
                child = *c as u32;
            } else {
                break;
            }
        }
        child
    }

    /// Insert `key -> loc`. Descends to the target leaf, inserts in sorted
    /// order, and splits leaves (and, recursively, internal nodes, and the
    /// root itself) as needed to keep every node within `fanout`.
    pub fn insert(&self, key: KeyValue, loc: RecordLocation) -> Result<()> {
        if key.key_type() != self.key_type {
            return Err(StorageError::InvalidArgument(format!(
                "key type mismatch: index expects {:?}",
                self.key_type
            )));
        }
        let root = self.root_page_id()?;
        if root == NO_PAGE {
            let leaf_page = node::new_leaf(&self.pool)?;
            node::write_leaf(&self.pool, leaf_page, &[(key, loc)], NO_PAGE)?;
            self.set_root_page_id(leaf_page as i32)?;
            return Ok(());
        }

        let mut path: Vec<PageNumber> = Vec::new();
        let mut current = root as u32;
        while !node::is_leaf(&self.pool, current)? {
            path.push(current);
            let internal = node::read_internal(&self.pool, current, self.key_type)?;
            current = Self::choose_child(&internal, &key);
        }

        let leaf = node::read_leaf(&self.pool, current, self.key_type)?;
        if self.unique && leaf.entries.iter().any(|(k, _)| k.cmp_key(&key) == std::cmp::Ordering::Equal) {
            return Err(StorageError::Duplicate(format!("{key:?}")));
        }
        let mut entries = leaf.entries;
        let insert_at = entries.partition_point(|(k, _)| k.cmp_key(&key) == std::cmp::Ordering::Less);
        entries.insert(insert_at, (key.clone(), loc));

        let within_fanout = entries.len() <= self.fanout as usize;
        let fits_page = node::leaf_fits(self.pool.page_size(), &entries);
        if (within_fanout && fits_page) || entries.len() == 1 {
            node::write_leaf(&self.pool, current, &entries, leaf.next_leaf)?;
            return Ok(());
        }

        // Split the overflowing leaf: left half stays on `current`, right
        // half moves to a freshly allocated leaf, chained after it.
        let mid = entries.len() / 2;
        let right_entries = entries.split_off(mid);
        let promoted_key = right_entries[0].0.clone();
        let right_page = node::new_leaf(&self.pool)?;
        node::write_leaf(&self.pool, right_page, &right_entries, leaf.next_leaf)?;
        node::write_leaf(&self.pool, current, &entries, right_page as i32)?;
        trace!(left = current, right = right_page, "split leaf");

        self.insert_into_parent(path, current, promoted_key, right_page)
    }

    /// Propagate a split upward: insert `(promoted_key, right_child)` into
    /// the parent named by the last entry of `path`, splitting it in turn
    /// if it overflows, up to and including creating a brand-new root.
    fn insert_into_parent(
        &self,
        mut path: Vec<PageNumber>,
        left_child: PageNumber,
        promoted_key: KeyValue,
        right_child: PageNumber,
    ) -> Result<()> {
        let parent = match path.pop() {
            Some(p) => p,
            None => {
                // `left_child` was the root; grow the tree by one level.
                let new_root = node::new_internal(&self.pool, left_child)?;
                node::write_internal(&self.pool, new_root, left_child as i32, &[(promoted_key, right_child as i32)])?;
                self.set_root_page_id(new_root as i32)?;
                return Ok(());
            }
        };

        let internal = node::read_internal(&self.pool, parent, self.key_type)?;
        let mut entries = internal.entries;
        let insert_at = entries.partition_point(|(k, _)| k.cmp_key(&promoted_key) == std::cmp::Ordering::Less);
        entries.insert(insert_at, (promoted_key.clone(), right_child as i32));

        let within_fanout = entries.len() <= self.fanout as usize;
        let fits_page = node::internal_fits(self.pool.page_size(), &entries);
        if (within_fanout && fits_page) || entries.len() == 1 {
            node::write_internal(&self.pool, parent, internal.first_child, &entries)?;
            return Ok(());
        }

        let mid = entries.len() / 2;
        let up_key = entries[mid].0.clone();
        let right_entries = entries.split_off(mid + 1);
        let right_first_child = entries[mid].1;
        entries.truncate(mid);

        let right_page = node::new_internal(&self.pool, right_first_child as u32)?;
        node::write_internal(&self.pool, right_page, right_first_child, &right_entries)?;
        node::write_internal(&self.pool, parent, internal.first_child, &entries)?;
        trace!(left = parent, right = right_page, "split internal node");

        self.insert_into_parent(path, parent, up_key, right_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_tree(fanout: u16, unique: bool) -> (tempfile::TempDir, BTree) {
        let dir = tempdir().unwrap();
        let ts = crate::storage::Tablespace::open(dir.path(), "idx", 4096, 4).unwrap();
        let pool = Arc::new(BufferPoolManager::new(Arc::new(ts), 64));
        let tree = BTree::create(pool, "idx_id", KeyType::Integer, fanout, unique).unwrap();
        (dir, tree)
    }

    #[test]
    fn insert_and_search_single_entry() {
        let (_dir, tree) = new_tree(4, true);
        tree.insert(KeyValue::Integer(1), RecordLocation::new(10, 0)).unwrap();
        assert_eq!(tree.search(&KeyValue::Integer(1)).unwrap(), Some(RecordLocation::new(10, 0)));
        assert_eq!(tree.search(&KeyValue::Integer(2)).unwrap(), None);
    }

    #[test]
    fn unique_index_rejects_duplicate_keys() {
        let (_dir, tree) = new_tree(4, true);
        tree.insert(KeyValue::Integer(1), RecordLocation::new(10, 0)).unwrap();
        let err = tree.insert(KeyValue::Integer(1), RecordLocation::new(10, 1));
        assert!(matches!(err, Err(StorageError::Duplicate(_))));
    }

    #[test]
    fn non_unique_index_allows_duplicate_keys() {
        let (_dir, tree) = new_tree(4, false);
        tree.insert(KeyValue::Integer(1), RecordLocation::new(10, 0)).unwrap();
        tree.insert(KeyValue::Integer(1), RecordLocation::new(10, 1)).unwrap();
        let hits = tree.range_scan(Some(&KeyValue::Integer(1)), Some(&KeyValue::Integer(1))).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn inserting_past_fanout_splits_and_preserves_lookups() {
        let (_dir, tree) = new_tree(3, true);
        for i in 0..30 {
            tree.insert(KeyValue::Integer(i), RecordLocation::new(100 + i as u32, 0)).unwrap();
        }
        for i in 0..30 {
            assert_eq!(
                tree.search(&KeyValue::Integer(i)).unwrap(),
                Some(RecordLocation::new(100 + i as u32, 0)),
                "missing key {i} after splits"
            );
        }
    }

    #[test]
    fn range_scan_returns_keys_in_order() {
        let (_dir, tree) = new_tree(3, true);
        for i in (0..20).rev() {
            tree.insert(KeyValue::Integer(i), RecordLocation::new(i as u32, 0)).unwrap();
        }
        let hits = tree.range_scan(Some(&KeyValue::Integer(5)), Some(&KeyValue::Integer(10))).unwrap();
        let keys: Vec<i64> = hits
            .iter()
            .map(|(k, _)| match k {
                KeyValue::Integer(v) => *v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, (5..=10).collect::<Vec<_>>());
    }

    #[test]
    fn full_range_scan_with_no_bounds_returns_everything() {
        let (_dir, tree) = new_tree(3, true);
        for i in 0..12 {
            tree.insert(KeyValue::Integer(i), RecordLocation::new(i as u32, 0)).unwrap();
        }
        let hits = tree.range_scan(None, None).unwrap();
        assert_eq!(hits.len(), 12);
    }
}
