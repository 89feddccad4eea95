//! B+Tree node pages.
//!
//! A node reuses the generic extension slots: x0 holds the parent page id
//! (-1 for the root), x1 is 1 for leaves, x2 is 1 for the rightmost node of
//! its level. Leaf records are full table rows. Branch records are the key
//! columns followed by the child page id as an INT cell, ordered by key then
//! child id.

use super::constants::{SLOT_IS_HIGHEST, SLOT_IS_LEAF, SLOT_PARENT};
use super::header::PageKind;
use super::plain::Page;
use super::sorted::{search_rows, SearchMode};
use std::cmp::Ordering;
use std::ops::Deref;
use stratum_common::error::corrupt_page;
use stratum_common::page::{decode_page_id, encode_page_id};
use stratum_common::{Cell, Key, Record, RecordMatcher, Result, SortDirection, StratumError};

/// The comparators a tree node needs, derived from the index key.
#[derive(Debug, Clone)]
pub struct NodeOrder {
    key: Key,
    leaf: RecordMatcher,
    probe: RecordMatcher,
    weak: RecordMatcher,
    strong: RecordMatcher,
}

impl NodeOrder {
    /// Builds the comparators for `key`, whose columns index leaf rows.
    pub fn new(key: &Key) -> Self {
        let directions = key.directions();
        let mut strong_directions = directions.clone();
        strong_directions.push(SortDirection::Ascending);
        Self {
            key: key.clone(),
            leaf: RecordMatcher::symmetric(key),
            probe: RecordMatcher::probe(key),
            weak: RecordMatcher::prefix_with(directions),
            strong: RecordMatcher::prefix_with(strong_directions),
        }
    }

    /// The index key over leaf rows.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Number of key columns.
    pub fn width(&self) -> usize {
        self.key.len()
    }

    /// Row against row on the key columns.
    pub fn leaf(&self) -> &RecordMatcher {
        &self.leaf
    }

    /// Key-only record against a leaf row.
    pub fn probe(&self) -> &RecordMatcher {
        &self.probe
    }

    /// Key columns only, for branch records and key-only records.
    pub fn weak(&self) -> &RecordMatcher {
        &self.weak
    }

    /// Key columns then child id, for branch records.
    pub fn strong(&self) -> &RecordMatcher {
        &self.strong
    }

    /// Projects a leaf row onto its key columns.
    pub fn key_of(&self, row: &Record) -> Record {
        row.split(&self.key.indices())
    }
}

/// A page acting as a B+Tree leaf or branch node.
#[derive(Debug, Clone, PartialEq)]
pub struct BPlusTreePage {
    page: Page,
}

impl BPlusTreePage {
    /// Creates an empty node with no parent.
    pub fn new(
        page_id: u32,
        last_page_id: Option<u32>,
        next_page_id: Option<u32>,
        page_size: usize,
        field_count: usize,
        data_disk_cost: usize,
        is_leaf: bool,
    ) -> Self {
        let mut page = Page::new(
            page_id,
            last_page_id,
            next_page_id,
            page_size,
            field_count,
            data_disk_cost,
        );
        page.set_kind(PageKind::BPlusTree);
        page.set_extension(SLOT_PARENT, encode_page_id(None));
        page.set_extension(SLOT_IS_LEAF, is_leaf as i32);
        page.set_extension(SLOT_IS_HIGHEST, 0);
        Self { page }
    }

    /// Reinterprets a page as a tree node, failing on any other kind.
    pub fn from_page(page: Page) -> Result<Self> {
        if page.kind() != PageKind::BPlusTree {
            return Err(StratumError::PageKindMismatch {
                expected: PageKind::BPlusTree.to_string(),
                actual: page.kind().to_string(),
            });
        }
        Ok(Self { page })
    }

    pub fn into_page(self) -> Page {
        self.page
    }

    pub fn parent_page_id(&self) -> Option<u32> {
        decode_page_id(self.page.extension(SLOT_PARENT))
    }

    pub fn set_parent_page_id(&mut self, parent: Option<u32>) {
        self.page.set_extension(SLOT_PARENT, encode_page_id(parent));
    }

    pub fn is_leaf(&self) -> bool {
        self.page.extension(SLOT_IS_LEAF) != 0
    }

    pub fn is_highest(&self) -> bool {
        self.page.extension(SLOT_IS_HIGHEST) != 0
    }

    pub fn set_highest(&mut self, highest: bool) {
        self.page.set_extension(SLOT_IS_HIGHEST, highest as i32);
    }

    pub fn set_last_page_id(&mut self, page_id: Option<u32>) {
        self.page.set_last_page_id(page_id);
    }

    pub fn set_next_page_id(&mut self, page_id: Option<u32>) {
        self.page.set_next_page_id(page_id);
    }

    /// Key of the last record: key columns of a leaf row, or the key part of
    /// a branch entry.
    pub fn terminal_key(&self, order: &NodeOrder) -> Option<Record> {
        self.page.terminal().map(|last| self.key_at(last, order))
    }

    /// Key of the first record.
    pub fn origin_key(&self, order: &NodeOrder) -> Option<Record> {
        self.page.origin().map(|first| self.key_at(first, order))
    }

    fn key_at(&self, record: &Record, order: &NodeOrder) -> Record {
        if self.is_leaf() {
            order.key_of(record)
        } else {
            record.split(&(0..order.width()).collect::<Vec<_>>())
        }
    }

    /// Child page id stored in branch row `row_id`.
    pub fn child_at(&self, row_id: usize) -> Result<u32> {
        let record = self.page.select(row_id)?;
        child_of(record)
    }

    /// Every child page id, in key order.
    pub fn child_page_ids(&self) -> Result<Vec<u32>> {
        self.page.records().iter().map(child_of).collect()
    }

    /// Branch entries as (key, child) pairs.
    pub fn branch_entries(&self, order: &NodeOrder) -> Result<Vec<(Record, u32)>> {
        let width: Vec<usize> = (0..order.width()).collect();
        self.page
            .records()
            .iter()
            .map(|r| Ok((r.split(&width), child_of(r)?)))
            .collect()
    }

    /// Inserts a leaf row after any rows with an equal key.
    pub fn insert_leaf(&mut self, record: Record, order: &NodeOrder) -> Result<usize> {
        debug_assert!(self.is_leaf());
        let row = self
            .page
            .records()
            .partition_point(|r| order.leaf().compare(&record, r) != Ordering::Less);
        self.page.insert_at(row, record)?;
        Ok(row)
    }

    /// Inserts a branch entry `(key, child)` in strong order.
    ///
    /// Fails with `KeyOutOfBounds` when `key` is above this page's last key
    /// and the page is not the highest of its level.
    pub fn insert_key(&mut self, key: &Record, child: u32, order: &NodeOrder) -> Result<usize> {
        if !self.is_highest() {
            if let Some(last) = self.page.terminal() {
                if order.weak().compare(key, last) == Ordering::Greater {
                    return Err(StratumError::KeyOutOfBounds {
                        page_id: self.page.page_id(),
                        key: key.to_string(),
                    });
                }
            }
        }
        self.insert_key_unchecked(key, child, order)
    }

    /// Inserts a branch entry without the upper-bound check.
    pub fn insert_key_unchecked(&mut self, key: &Record, child: u32, order: &NodeOrder) -> Result<usize> {
        debug_assert!(!self.is_leaf());
        let entry = branch_entry(key, child);
        let row = self
            .page
            .records()
            .partition_point(|r| order.strong().compare(&entry, r) != Ordering::Less);
        self.page.insert_at(row, entry)?;
        Ok(row)
    }

    /// Removes the entry `(key, child)`; `NotFound` if absent.
    pub fn delete_key(&mut self, key: &Record, child: u32, order: &NodeOrder) -> Result<()> {
        let entry = branch_entry(key, child);
        match search_rows(self.page.records(), SearchMode::Any, |row| {
            order.strong().compare(&entry, row)
        }) {
            Ok(row) => {
                self.page.delete(row)?;
                Ok(())
            }
            Err(_) => Err(StratumError::NotFound(format!(
                "entry {} in page {}",
                entry,
                self.page.page_id()
            ))),
        }
    }

    /// Removes the row at `row_id`.
    pub fn delete(&mut self, row_id: usize) -> Result<Record> {
        self.page.delete(row_id)
    }

    /// Child for `key`: the first entry whose key is at least `key`,
    /// clamped to the last entry.
    pub fn get_page_id(&self, key: &Record, order: &NodeOrder) -> Result<u32> {
        let records = self.page.records();
        let row = records.partition_point(|r| order.weak().compare(r, key) == Ordering::Less);
        self.clamped_child(row)
    }

    /// Child for `key` when seeking the last duplicate: the first entry whose
    /// key is above `key`, clamped to the last entry.
    pub fn get_page_id_upper(&self, key: &Record, order: &NodeOrder) -> Result<u32> {
        let records = self.page.records();
        let row = records.partition_point(|r| order.weak().compare(r, key) != Ordering::Greater);
        self.clamped_child(row)
    }

    fn clamped_child(&self, row: usize) -> Result<u32> {
        let count = self.page.count();
        if count == 0 {
            return Err(StratumError::NotFound(format!(
                "branch page {} has no entries",
                self.page.page_id()
            )));
        }
        self.child_at(row.min(count - 1))
    }

    /// Searches leaf rows for a key-only record.
    pub fn search_leaf(
        &self,
        key: &Record,
        order: &NodeOrder,
        mode: SearchMode,
    ) -> std::result::Result<usize, usize> {
        search_rows(self.page.records(), mode, |row| order.probe().compare(key, row))
    }

    /// Searches branch entries for a key-only record, ignoring child ids.
    pub fn search_branch(
        &self,
        key: &Record,
        order: &NodeOrder,
        mode: SearchMode,
    ) -> std::result::Result<usize, usize> {
        search_rows(self.page.records(), mode, |row| order.weak().compare(key, row))
    }

    /// Splits like [`Page::split`], keeping the leaf flag and parent. The
    /// new node is never flagged highest; callers transfer the flag.
    pub fn split_xpage(
        &mut self,
        new_page_id: u32,
        last_page_id: Option<u32>,
        next_page_id: Option<u32>,
        pivot: usize,
    ) -> Result<BPlusTreePage> {
        let page = self
            .page
            .split(new_page_id, last_page_id, next_page_id, pivot)?;
        let mut node = BPlusTreePage { page };
        node.set_highest(false);
        Ok(node)
    }
}

impl Deref for BPlusTreePage {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.page
    }
}

/// Builds a branch record from key cells and a child page id.
pub fn branch_entry(key: &Record, child: u32) -> Record {
    let mut entry = key.clone();
    entry.push(Cell::Int(child as i64));
    entry
}

fn child_of(record: &Record) -> Result<u32> {
    match record.cells().last() {
        Some(Cell::Int(id)) if *id >= 0 && *id <= u32::MAX as i64 => Ok(*id as u32),
        other => Err(corrupt_page(format!(
            "branch entry without a child page id: {:?}",
            other
        ))),
    }
}
