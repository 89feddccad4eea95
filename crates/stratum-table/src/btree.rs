//! B+Tree over a page store.
//!
//! Leaves hold full rows, branches hold `(key, child)` entries. Each branch
//! entry's key is the largest key in that child's subtree, except along the
//! rightmost path where every node is flagged highest and its parent entry
//! carries a sentinel key above every real key. Nodes point at each other by
//! page id only; every node is re-fetched from the store before use.

use crate::store::PageStore;
use crate::table_core::check_capacity;
use std::cmp::Ordering;
use stratum_common::page::RecordKey;
use stratum_common::{Affinity, Cell, Key, Record, Result, Schema, SortDirection, StratumError};
use stratum_storage::page::constants::{payload_size, record_disk_cost};
use stratum_storage::{BPlusTreePage, NodeOrder, SearchMode};
use tracing::{debug, trace};

/// Page geometry of a tree's leaves and branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLayout {
    pub page_size: usize,
    pub leaf_fields: usize,
    pub leaf_disk_cost: usize,
    pub branch_fields: usize,
    pub branch_disk_cost: usize,
}

impl TreeLayout {
    /// Derives branch geometry from the leaf rows.
    ///
    /// When `leaf_disk_cost` was raised by a per-page record cap, branches
    /// get the same cap.
    pub fn derive(schema: &Schema, key: &Key, page_size: usize, leaf_disk_cost: usize) -> Result<Self> {
        let leaf_schema_cost = schema.disk_cost();
        let branch_schema_cost =
            schema.split(&key.indices()).disk_cost() + Affinity::Int.disk_cost(0);
        let cap = if leaf_disk_cost > leaf_schema_cost.max(1) {
            Some(payload_size(page_size) / leaf_disk_cost)
        } else {
            None
        };
        let layout = Self {
            page_size,
            leaf_fields: schema.len(),
            leaf_disk_cost,
            branch_fields: key.len() + 1,
            branch_disk_cost: record_disk_cost(branch_schema_cost, page_size, cap),
        };
        check_capacity(page_size, layout.leaf_disk_cost)?;
        check_capacity(page_size, layout.branch_disk_cost)?;
        Ok(layout)
    }
}

/// A B+Tree whose nodes live in a [`PageStore`].
///
/// The tree holds its root id, row schema and comparators; the store is
/// passed to every operation.
#[derive(Debug, Clone)]
pub struct BPlusTree {
    root_page_id: u32,
    /// Leaf row layout; every insert is checked against it.
    schema: Schema,
    order: NodeOrder,
    /// Key-only record above every real key.
    max_key: Record,
    is_unique: bool,
    layout: TreeLayout,
}

impl BPlusTree {
    /// Creates an empty tree: a single leaf that is both root and highest.
    pub fn create<S: PageStore + ?Sized>(
        store: &mut S,
        schema: &Schema,
        key: &Key,
        is_unique: bool,
        leaf_disk_cost: usize,
    ) -> Result<Self> {
        let layout = TreeLayout::derive(schema, key, store.page_size(), leaf_disk_cost)?;
        let root_page_id = store.generate_new_page_id()?;
        let mut root = BPlusTreePage::new(
            root_page_id,
            None,
            None,
            layout.page_size,
            layout.leaf_fields,
            layout.leaf_disk_cost,
            true,
        );
        root.set_highest(true);
        store.store_page(root.into_page())?;
        debug!(root_page_id, key_columns = key.len(), is_unique, "created tree");
        Self::open(root_page_id, schema, key, is_unique, layout)
    }

    /// Attaches to an existing tree rooted at `root_page_id`.
    pub fn open(
        root_page_id: u32,
        schema: &Schema,
        key: &Key,
        is_unique: bool,
        layout: TreeLayout,
    ) -> Result<Self> {
        key.validate(schema)?;
        if key.is_empty() {
            return Err(StratumError::ConfigError(
                "a tree needs at least one key column".to_string(),
            ));
        }
        Ok(Self {
            root_page_id,
            schema: schema.clone(),
            order: NodeOrder::new(key),
            max_key: max_key(schema, key),
            is_unique,
            layout,
        })
    }

    pub fn root_page_id(&self) -> u32 {
        self.root_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn order(&self) -> &NodeOrder {
        &self.order
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// The sentinel key carried by the highest branch entries.
    pub fn max_key(&self) -> &Record {
        &self.max_key
    }

    /// Projects a row onto the tree key.
    pub fn key_of(&self, row: &Record) -> Record {
        self.order.key_of(row)
    }

    fn node<S: PageStore + ?Sized>(&self, store: &S, page_id: u32) -> Result<BPlusTreePage> {
        BPlusTreePage::from_page((*store.fetch_page(page_id)?).clone())
    }

    // ---------------------------------------------------------------------
    // Insert
    // ---------------------------------------------------------------------

    /// Inserts a row, splitting nodes as needed.
    ///
    /// The row must match the tree's schema. A unique tree rejects a key
    /// that is already present with `DuplicateKey` and leaves the tree
    /// untouched.
    pub fn insert<S: PageStore + ?Sized>(&mut self, store: &mut S, record: Record) -> Result<RecordKey> {
        self.schema.validate(&record)?;
        let key = self.order.key_of(&record);
        if self.is_unique && self.exists(store, &key)? {
            return Err(StratumError::DuplicateKey(key.to_string()));
        }
        let leaf_id = self.seek_page(store, &key)?;
        self.insert_value(store, leaf_id, record, &key)
    }

    fn insert_value<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        leaf_id: u32,
        record: Record,
        key: &Record,
    ) -> Result<RecordKey> {
        let mut leaf = self.node(store, leaf_id)?;
        if leaf.is_full() {
            let (lower_id, upper_id) = self.split_node(store, leaf)?;
            let lower = self.node(store, lower_id)?;
            let target = if self.less_than_terminal(&lower, key) {
                lower_id
            } else {
                upper_id
            };
            leaf = self.node(store, target)?;
        }
        let row = leaf.insert_leaf(record, &self.order)?;
        let page_id = leaf.page_id();
        store.store_page(leaf.into_page())?;
        Ok(RecordKey::new(page_id, row as u32))
    }

    /// Returns true if `key` sorts at or below the last key of `node`.
    fn less_than_terminal(&self, node: &BPlusTreePage, key: &Record) -> bool {
        match node.terminal_key(&self.order) {
            Some(last) => self.order.weak().compare(key, &last) != Ordering::Greater,
            None => true,
        }
    }

    /// Splits a full leaf or branch, returning the ids of the lower and upper
    /// halves. Both halves and every affected ancestor are stored.
    pub(crate) fn split_node<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        mut node: BPlusTreePage,
    ) -> Result<(u32, u32)> {
        let node_id = node.page_id();
        let count = node.count();
        let pivot = count / 2;
        if count < 2 || pivot == 0 || pivot + 1 >= count {
            return Err(StratumError::InvalidSplit { count, pivot });
        }

        let new_id = store.generate_new_page_id()?;
        let old_next = node.next_page_id();
        let mut new = node.split_xpage(new_id, Some(node_id), old_next, pivot)?;
        debug_assert_eq!(node.count() + new.count(), count);
        node.set_next_page_id(Some(new_id));
        if node.is_highest() {
            node.set_highest(false);
            new.set_highest(true);
        }
        if let Some(next_id) = old_next {
            let mut next = self.node(store, next_id)?;
            next.set_last_page_id(Some(new_id));
            store.store_page(next.into_page())?;
        }
        trace!(
            page_id = node_id,
            new_page_id = new_id,
            pivot,
            leaf = node.is_leaf(),
            "split node"
        );

        let node_key = node
            .terminal_key(&self.order)
            .ok_or_else(|| StratumError::InvalidSplit { count, pivot })?;
        let moved_children = if node.is_leaf() {
            Vec::new()
        } else {
            new.child_page_ids()?
        };
        let parent = node.parent_page_id();
        let new_root = match parent {
            Some(_) => None,
            None => {
                let root_id = store.generate_new_page_id()?;
                node.set_parent_page_id(Some(root_id));
                new.set_parent_page_id(Some(root_id));
                Some(root_id)
            }
        };
        store.store_page(node.into_page())?;
        store.store_page(new.into_page())?;

        for child in moved_children {
            self.set_parent(store, child, new_id)?;
        }

        if let Some(parent_id) = parent {
            self.replace_boundary(store, parent_id, node_id, &node_key, new_id)?;
        } else if let Some(root_id) = new_root {
            self.grow_root(store, root_id, node_id, &node_key, new_id)?;
        }
        Ok((node_id, new_id))
    }

    /// Installs a new root above the two halves of the old root.
    fn grow_root<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        root_id: u32,
        lower_id: u32,
        lower_key: &Record,
        upper_id: u32,
    ) -> Result<()> {
        let mut root = BPlusTreePage::new(
            root_id,
            None,
            None,
            self.layout.page_size,
            self.layout.branch_fields,
            self.layout.branch_disk_cost,
            false,
        );
        root.set_highest(true);
        root.insert_key_unchecked(lower_key, lower_id, &self.order)?;
        root.insert_key_unchecked(&self.max_key, upper_id, &self.order)?;
        store.store_page(root.into_page())?;
        debug!(
            old_root = self.root_page_id,
            new_root = root_id,
            "tree grew a level"
        );
        self.root_page_id = root_id;
        Ok(())
    }

    /// After `node_id` split into `node_id` and `new_id`: re-keys the
    /// parent's entry for `node_id` to `node_key` and adds an entry for
    /// `new_id` under the old key.
    fn replace_boundary<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        parent_id: u32,
        node_id: u32,
        node_key: &Record,
        new_id: u32,
    ) -> Result<()> {
        let mut parent = self.node(store, parent_id)?;
        let row = parent
            .child_page_ids()?
            .iter()
            .position(|&child| child == node_id)
            .ok_or_else(|| {
                StratumError::NotFound(format!("entry for {} in branch {}", node_id, parent_id))
            })?;
        let width: Vec<usize> = (0..self.order.width()).collect();
        let old_key = parent.delete(row)?.split(&width);
        parent.insert_key_unchecked(node_key, node_id, &self.order)?;
        store.store_page(parent.into_page())?;
        self.insert_key(store, parent_id, &old_key, new_id)
    }

    /// Adds `(key, child)` to branch `branch_id`, splitting it when full,
    /// and points the child at whichever branch received the entry.
    fn insert_key<S: PageStore + ?Sized>(
        &mut self,
        store: &mut S,
        branch_id: u32,
        key: &Record,
        child: u32,
    ) -> Result<()> {
        let mut branch = self.node(store, branch_id)?;
        if branch.is_full() {
            let (lower_id, upper_id) = self.split_node(store, branch)?;
            let lower = self.node(store, lower_id)?;
            let target = if self.less_than_terminal(&lower, key) {
                lower_id
            } else {
                upper_id
            };
            branch = self.node(store, target)?;
        }
        debug_assert!(!branch.is_leaf());
        branch.insert_key(key, child, &self.order)?;
        let target = branch.page_id();
        store.store_page(branch.into_page())?;
        self.set_parent(store, child, target)
    }

    fn set_parent<S: PageStore + ?Sized>(&self, store: &mut S, child: u32, parent: u32) -> Result<()> {
        let mut node = self.node(store, child)?;
        if node.parent_page_id() != Some(parent) {
            node.set_parent_page_id(Some(parent));
            store.store_page(node.into_page())?;
        }
        Ok(())
    }

    /// Splits the node at `page_id` in place.
    ///
    /// Returns the id of the new upper node.
    pub fn fork<S: PageStore + ?Sized>(&mut self, store: &mut S, page_id: u32) -> Result<u32> {
        let node = self.node(store, page_id)?;
        let (_, upper) = self.split_node(store, node)?;
        Ok(upper)
    }

    // ---------------------------------------------------------------------
    // Seek
    // ---------------------------------------------------------------------

    /// Leaf that owns `key`: descends through the first entry at or above it.
    pub fn seek_page<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<u32> {
        self.descend(store, |node| node.get_page_id(key, &self.order))
    }

    /// Leaf where the first row with `key` would be found.
    pub fn seek_first_page<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<u32> {
        self.seek_page(store, key)
    }

    /// Leaf where the last row with `key` would be found: descends through
    /// the first entry strictly above it.
    pub fn seek_last_page<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<u32> {
        self.descend(store, |node| node.get_page_id_upper(key, &self.order))
    }

    /// First leaf of the tree.
    pub fn seek_origin_page_id<S: PageStore + ?Sized>(&self, store: &S) -> Result<u32> {
        self.descend(store, |node| node.child_at(0))
    }

    /// Last leaf of the tree.
    pub fn seek_terminal_page_id<S: PageStore + ?Sized>(&self, store: &S) -> Result<u32> {
        self.descend(store, |node| node.child_at(node.count().saturating_sub(1)))
    }

    fn descend<S, F>(&self, store: &S, mut choose: F) -> Result<u32>
    where
        S: PageStore + ?Sized,
        F: FnMut(&BPlusTreePage) -> Result<u32>,
    {
        let mut node = self.node(store, self.root_page_id)?;
        while !node.is_leaf() {
            node = self.node(store, choose(&node)?)?;
        }
        Ok(node.page_id())
    }

    /// Number of levels, counting the leaves.
    pub fn height<S: PageStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let mut height = 1;
        let mut node = self.node(store, self.root_page_id)?;
        while !node.is_leaf() {
            node = self.node(store, node.child_at(0)?)?;
            height += 1;
        }
        Ok(height)
    }

    /// Returns true if a row with `key` exists.
    pub fn exists<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<bool> {
        Ok(self.seek_first(store, key)?.is_some())
    }

    /// Position of the first row with `key`.
    pub fn seek_first<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<Option<RecordKey>> {
        match self.lower_bound(store, key)? {
            Some(at) if self.compare_at(store, key, at)? == Ordering::Equal => Ok(Some(at)),
            _ => Ok(None),
        }
    }

    /// Position of the last row with `key`.
    pub fn seek_last<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<Option<RecordKey>> {
        match self.upper_bound(store, key)? {
            Some(at) if self.compare_at(store, key, at)? == Ordering::Equal => Ok(Some(at)),
            _ => Ok(None),
        }
    }

    /// Inclusive positions of the first and last rows with keys in
    /// `[lower, upper]`, or `None` if no row falls in the range.
    pub fn seek_range<S: PageStore + ?Sized>(
        &self,
        store: &S,
        lower: &Record,
        upper: &Record,
    ) -> Result<Option<(RecordKey, RecordKey)>> {
        if self.order.weak().compare(lower, upper) == Ordering::Greater {
            return Ok(None);
        }
        let Some(first) = self.lower_bound(store, lower)? else {
            return Ok(None);
        };
        let first_row = self.row_at(store, first)?;
        if self.order.probe().compare(upper, &first_row) == Ordering::Less {
            return Ok(None);
        }
        match self.upper_bound(store, upper)? {
            Some(last) => Ok(Some((first, last))),
            None => Ok(None),
        }
    }

    /// Reads the row at `at`.
    pub fn row_at<S: PageStore + ?Sized>(&self, store: &S, at: RecordKey) -> Result<Record> {
        let page = store.fetch_page(at.page_id)?;
        Ok(page.select(at.row_id as usize)?.clone())
    }

    /// Orders `key` against the row at `at`.
    fn compare_at<S: PageStore + ?Sized>(&self, store: &S, key: &Record, at: RecordKey) -> Result<Ordering> {
        let row = self.row_at(store, at)?;
        Ok(self.order.probe().compare(key, &row))
    }

    /// First row whose key is at least `key`, following the leaf chain
    /// across page boundaries.
    fn lower_bound<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<Option<RecordKey>> {
        let mut leaf = self.node(store, self.seek_first_page(store, key)?)?;
        loop {
            let row = match leaf.search_leaf(key, &self.order, SearchMode::FirstElement) {
                Ok(row) | Err(row) => row,
            };
            if row == 0 {
                if let Some(previous_id) = leaf.last_page_id() {
                    let previous = self.node(store, previous_id)?;
                    let reaches = previous
                        .terminal_key(&self.order)
                        .map(|last| self.order.weak().compare(&last, key) != Ordering::Less)
                        .unwrap_or(false);
                    if reaches {
                        leaf = previous;
                        continue;
                    }
                }
            }
            if row == leaf.count() {
                match leaf.next_page_id() {
                    Some(next_id) => {
                        leaf = self.node(store, next_id)?;
                        continue;
                    }
                    None => return Ok(None),
                }
            }
            return Ok(Some(RecordKey::new(leaf.page_id(), row as u32)));
        }
    }

    /// Last row whose key is at most `key`, following the leaf chain
    /// across page boundaries.
    fn upper_bound<S: PageStore + ?Sized>(&self, store: &S, key: &Record) -> Result<Option<RecordKey>> {
        let mut leaf = self.node(store, self.seek_last_page(store, key)?)?;
        loop {
            // rows at or below `key`
            let below = match leaf.search_leaf(key, &self.order, SearchMode::LastElement) {
                Ok(row) => row + 1,
                Err(row) => row,
            };
            if below == leaf.count() {
                if let Some(next_id) = leaf.next_page_id() {
                    let next = self.node(store, next_id)?;
                    let reaches = next
                        .origin_key(&self.order)
                        .map(|first| self.order.weak().compare(&first, key) != Ordering::Greater)
                        .unwrap_or(false);
                    if reaches {
                        leaf = next;
                        continue;
                    }
                }
            }
            if below == 0 {
                match leaf.last_page_id() {
                    Some(previous_id) => {
                        leaf = self.node(store, previous_id)?;
                        continue;
                    }
                    None => return Ok(None),
                }
            }
            return Ok(Some(RecordKey::new(leaf.page_id(), (below - 1) as u32)));
        }
    }
}

/// Sentinel key: per column the largest value, or null for descending
/// columns where null sorts last.
fn max_key(schema: &Schema, key: &Key) -> Record {
    key.columns()
        .iter()
        .map(|&(index, direction)| {
            let column = &schema.columns()[index];
            match direction {
                SortDirection::Ascending => Cell::max_value(column.affinity, column.size as usize),
                SortDirection::Descending => Cell::Null(column.affinity),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::PageSource;
    use stratum_common::{record, Column};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", Affinity::Int, 0),
            Column::new("label", Affinity::String, 8),
        ])
        .unwrap()
    }

    /// Tree over `id` with three rows per page.
    fn tree(store: &mut MemoryStore, is_unique: bool) -> BPlusTree {
        let schema = schema();
        let cost = record_disk_cost(schema.disk_cost(), 4096, Some(3));
        BPlusTree::create(store, &schema, &Key::ascending(&[0]).unwrap(), is_unique, cost).unwrap()
    }

    fn row(id: i64) -> Record {
        record![id, format!("r{}", id)]
    }

    fn leaf_ids(tree: &BPlusTree, store: &MemoryStore) -> Vec<i64> {
        let mut ids = Vec::new();
        let mut next = Some(tree.seek_origin_page_id(store).unwrap());
        while let Some(page_id) = next {
            let page = store.fetch_page(page_id).unwrap();
            ids.extend(page.records().iter().map(|r| r[0].as_int().unwrap()));
            next = page.next_page_id();
        }
        ids
    }

    /// Checks parent pointers, highest flags and separator keys level by level.
    fn check_structure(tree: &BPlusTree, store: &MemoryStore) {
        let order = tree.order();
        let root = BPlusTreePage::from_page((*store.fetch_page(tree.root_page_id()).unwrap()).clone()).unwrap();
        assert_eq!(root.parent_page_id(), None);
        assert!(root.is_highest());
        let mut level = vec![root];
        while !level[0].is_leaf() {
            let mut below = Vec::new();
            for branch in &level {
                for (key, child) in branch.branch_entries(order).unwrap() {
                    let node = BPlusTreePage::from_page((*store.fetch_page(child).unwrap()).clone()).unwrap();
                    assert_eq!(node.parent_page_id(), Some(branch.page_id()));
                    if node.is_highest() {
                        assert_eq!(key, *tree.max_key());
                    } else {
                        assert_eq!(Some(key), subtree_max(tree, store, &node));
                    }
                    below.push(node);
                }
            }
            let highest: Vec<bool> = below.iter().map(|n| n.is_highest()).collect();
            assert_eq!(highest.iter().filter(|h| **h).count(), 1);
            assert_eq!(highest.last(), Some(&true));
            level = below;
        }
    }

    fn subtree_max(tree: &BPlusTree, store: &MemoryStore, node: &BPlusTreePage) -> Option<Record> {
        let mut node = node.clone();
        while !node.is_leaf() {
            let last = node.child_at(node.count() - 1).unwrap();
            node = BPlusTreePage::from_page((*store.fetch_page(last).unwrap()).clone()).unwrap();
        }
        node.terminal_key(tree.order())
    }

    #[test]
    fn test_layout_caps_branches() {
        let schema = schema();
        let key = Key::ascending(&[0]).unwrap();
        let cost = record_disk_cost(schema.disk_cost(), 4096, Some(3));
        let layout = TreeLayout::derive(&schema, &key, 4096, cost).unwrap();
        assert_eq!(layout.branch_fields, 2);
        assert_eq!(payload_size(4096) / layout.branch_disk_cost, 3);

        let plain = TreeLayout::derive(&schema, &key, 4096, schema.disk_cost()).unwrap();
        assert_eq!(plain.branch_disk_cost, 20);
    }

    #[test]
    fn test_layout_rejects_tiny_pages() {
        let schema = Schema::new(vec![Column::new("blob", Affinity::Blob, 255)]).unwrap();
        let key = Key::ascending(&[0]).unwrap();
        let cost = record_disk_cost(schema.disk_cost(), 4096, Some(20));
        assert!(TreeLayout::derive(&schema, &key, 4096, cost).is_ok());
        assert!(matches!(
            TreeLayout::derive(&schema, &key, 4096, 2000),
            Err(StratumError::ConfigError(_))
        ));
    }

    #[test]
    fn test_single_leaf() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, true);
        tree.insert(&mut store, row(2)).unwrap();
        tree.insert(&mut store, row(1)).unwrap();
        assert_eq!(tree.height(&store).unwrap(), 1);
        assert_eq!(leaf_ids(&tree, &store), vec![1, 2]);
        assert!(tree.exists(&store, &record![1i64]).unwrap());
        assert!(!tree.exists(&store, &record![3i64]).unwrap());
    }

    #[test]
    fn test_root_split() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, true);
        let first_root = tree.root_page_id();
        for id in [1, 2, 3, 4] {
            tree.insert(&mut store, row(id)).unwrap();
        }
        assert_ne!(tree.root_page_id(), first_root);
        assert_eq!(tree.height(&store).unwrap(), 2);
        assert_eq!(tree.seek_origin_page_id(&store).unwrap(), first_root);
        assert_eq!(leaf_ids(&tree, &store), vec![1, 2, 3, 4]);
        check_structure(&tree, &store);
    }

    #[test]
    fn test_example_sequence() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, true);
        for id in [5, 3, 8, 1, 9, 2, 7, 4, 6, 0] {
            tree.insert(&mut store, row(id)).unwrap();
        }
        assert_eq!(leaf_ids(&tree, &store), (0..10).collect::<Vec<_>>());
        assert!(tree.height(&store).unwrap() > 1);
        assert!(tree.exists(&store, &record![5i64]).unwrap());
        assert!(!tree.exists(&store, &record![10i64]).unwrap());
        check_structure(&tree, &store);
    }

    #[test]
    fn test_ascending_and_descending_runs() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, true);
        for id in 0..60 {
            tree.insert(&mut store, row(id)).unwrap();
        }
        for id in (100..160).rev() {
            tree.insert(&mut store, row(id)).unwrap();
        }
        let expected: Vec<i64> = (0..60).chain(100..160).collect();
        assert_eq!(leaf_ids(&tree, &store), expected);
        assert!(tree.height(&store).unwrap() >= 4);
        check_structure(&tree, &store);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, true);
        tree.insert(&mut store, row(7)).unwrap();
        let pages = store.page_count();
        assert!(matches!(
            tree.insert(&mut store, row(7)),
            Err(StratumError::DuplicateKey(_))
        ));
        assert_eq!(store.page_count(), pages);
        assert_eq!(leaf_ids(&tree, &store), vec![7]);
    }

    #[test]
    fn test_duplicates_straddle_leaves() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, false);
        for id in [1, 5, 5, 5, 5, 5, 5, 9] {
            tree.insert(&mut store, row(id)).unwrap();
        }
        assert_eq!(leaf_ids(&tree, &store), vec![1, 5, 5, 5, 5, 5, 5, 9]);

        let first = tree.seek_first(&store, &record![5i64]).unwrap().unwrap();
        let last = tree.seek_last(&store, &record![5i64]).unwrap().unwrap();
        assert_ne!(first.page_id, last.page_id);
        assert_eq!(tree.row_at(&store, first).unwrap()[0], Cell::Int(5));
        assert_eq!(tree.row_at(&store, last).unwrap()[0], Cell::Int(5));

        // the row before `first` and after `last` hold other keys
        let (lo, hi) = tree
            .seek_range(&store, &record![5i64], &record![5i64])
            .unwrap()
            .unwrap();
        assert_eq!((lo, hi), (first, last));
        let reader = crate::stream::RecordReader::ranged(&store, lo, hi);
        assert_eq!(reader.count(), 6);
        assert_eq!(tree.seek_first(&store, &record![4i64]).unwrap(), None);
    }

    #[test]
    fn test_seek_range() {
        let mut store = MemoryStore::new(4096);
        let mut tree = tree(&mut store, true);
        for id in (0..40).map(|i| i * 2) {
            tree.insert(&mut store, row(id)).unwrap();
        }
        let (lo, hi) = tree
            .seek_range(&store, &record![11i64], &record![20i64])
            .unwrap()
            .unwrap();
        let keys: Vec<i64> = crate::stream::RecordReader::ranged(&store, lo, hi)
            .map(|r| r.unwrap()[0].as_int().unwrap())
            .collect();
        assert_eq!(keys, vec![12, 14, 16, 18, 20]);

        assert_eq!(
            tree.seek_range(&store, &record![21i64], &record![21i64]).unwrap(),
            None
        );
        assert_eq!(
            tree.seek_range(&store, &record![100i64], &record![200i64]).unwrap(),
            None
        );
        assert_eq!(
            tree.seek_range(&store, &record![20i64], &record![10i64]).unwrap(),
            None
        );
        let (lo, hi) = tree
            .seek_range(&store, &record![-5i64], &record![1000i64])
            .unwrap()
            .unwrap();
        assert_eq!(crate::stream::RecordReader::ranged(&store, lo, hi).count(), 40);
    }

    #[test]
    fn test_descending_key() {
        let schema = schema();
        let key = Key::new(vec![(0, SortDirection::Descending)]).unwrap();
        let cost = record_disk_cost(schema.disk_cost(), 4096, Some(3));
        let mut store = MemoryStore::new(4096);
        let mut tree = BPlusTree::create(&mut store, &schema, &key, true, cost).unwrap();
        assert_eq!(tree.max_key(), &record![Cell::Null(Affinity::Int)]);
        for id in [4, 8, 1, 6, 3, 9, 2, 7, 5] {
            tree.insert(&mut store, row(id)).unwrap();
        }
        assert_eq!(leaf_ids(&tree, &store), vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert!(tree.exists(&store, &record![6i64]).unwrap());
        check_structure(&tree, &store);
    }

    #[test]
    fn test_rejects_rows_wider_than_declared() {
        let mut store = MemoryStore::new(4096);
        let schema = Schema::new(vec![Column::new("code", Affinity::String, 2)]).unwrap();
        let cost = record_disk_cost(schema.disk_cost(), 4096, None);
        let mut tree =
            BPlusTree::create(&mut store, &schema, &Key::ascending(&[0]).unwrap(), false, cost)
                .unwrap();
        tree.insert(&mut store, record!["ab"]).unwrap();
        for i in 0..400 {
            let wide = record![format!("{:0>400}", i)];
            assert!(matches!(
                tree.insert(&mut store, wide),
                Err(StratumError::TypeMismatch { .. })
            ));
        }
        let root = store.fetch_page(tree.root_page_id()).unwrap();
        assert_eq!(root.count(), 1);
        assert!(root.to_bytes().is_ok());
    }

    #[test]
    fn test_fork_leaf() {
        let mut store = MemoryStore::new(4096);
        let schema = schema();
        let mut tree = BPlusTree::create(
            &mut store,
            &schema,
            &Key::ascending(&[0]).unwrap(),
            true,
            schema.disk_cost(),
        )
        .unwrap();
        for id in 0..10 {
            tree.insert(&mut store, row(id)).unwrap();
        }
        let leaf = tree.seek_origin_page_id(&store).unwrap();
        let upper = tree.fork(&mut store, leaf).unwrap();
        assert_eq!(tree.height(&store).unwrap(), 2);
        assert_eq!(tree.seek_terminal_page_id(&store).unwrap(), upper);
        assert_eq!(leaf_ids(&tree, &store), (0..10).collect::<Vec<_>>());
        check_structure(&tree, &store);
    }
}
