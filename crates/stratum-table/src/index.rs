//! Secondary indexes: a B+Tree of key-plus-locator entries stored in a
//! derived table.

use crate::base::BaseTable;
use crate::btree::{BPlusTree, TreeLayout};
use crate::derived::DerivedTable;
use crate::store::{PageSource, PageStore};
use crate::stream::{RecordReader, RecordWriter};
use crate::table_core::TableCore;
use std::sync::Arc;
use stratum_common::error::corrupt_page;
use stratum_common::{
    Affinity, Cell, Column, Key, Record, RecordKey, Result, Schema, StratumError,
};
use stratum_storage::{IndexHeader, Page};
use tracing::debug;

/// Name of the entry column holding the row's page id.
pub const PAGE_ID_COLUMN: &str = "page_id";
/// Name of the entry column holding the row's slot.
pub const ROW_ID_COLUMN: &str = "row_id";

/// An index over a parent table.
///
/// Each entry is the indexed row's key columns followed by its page id and
/// row id. Entries live in a tree whose pages belong to the parent.
///
/// Locators are positions, so the index stays valid only while the indexed
/// rows do not move. Index heap tables, or rebuild after a sorted or tree
/// table reshuffles.
#[derive(Debug, Clone)]
pub struct IndexTable {
    derived: DerivedTable,
    tree: BPlusTree,
    /// Key over the parent's schema.
    base_key: Key,
}

impl IndexTable {
    /// Entry layout for an index on `key` over `base`.
    pub fn entry_schema(base: &Schema, key: &Key) -> Schema {
        let mut schema = base.split(&key.indices());
        schema.push(Column::new(PAGE_ID_COLUMN, Affinity::Int, 0).not_null());
        schema.push(Column::new(ROW_ID_COLUMN, Affinity::Int, 0).not_null());
        schema
    }

    /// Creates an empty index on `key` inside `parent`.
    pub fn create<P: BaseTable + ?Sized>(
        parent: &P,
        name: &str,
        key: Key,
        is_unique: bool,
        max_records_per_page: Option<usize>,
    ) -> Result<Self> {
        key.validate(parent.columns())?;
        if key.is_empty() {
            return Err(StratumError::ConfigError(format!(
                "index '{}' has no key columns",
                name
            )));
        }
        let schema = Self::entry_schema(parent.columns(), &key);
        let mut derived = DerivedTable::create(parent, name, schema.clone(), max_records_per_page)?;
        let leaf_cost = derived.record_disk_cost();
        let tree = BPlusTree::create(&mut derived, &schema, &key.compacted(), is_unique, leaf_cost)?;
        let root = tree.root_page_id();
        let header = derived.index_header_mut();
        header.key = key.clone();
        header.is_unique = is_unique;
        header.root_page_id = Some(root);
        header.origin_page_id = Some(root);
        header.terminal_page_id = Some(root);
        Ok(Self {
            derived,
            tree,
            base_key: key,
        })
    }

    /// Creates an index and fills it from every row of `parent`.
    pub fn build<P: BaseTable>(
        parent: &P,
        name: &str,
        key: Key,
        is_unique: bool,
        max_records_per_page: Option<usize>,
    ) -> Result<Self> {
        let mut index = Self::create(parent, name, key, is_unique, max_records_per_page)?;
        let mut reader = parent.reader()?;
        while let Some(at) = reader.position().filter(|_| reader.can_advance()) {
            let Some(row) = reader.read_next()? else {
                break;
            };
            index.insert_entry(&row, at)?;
        }
        debug!(
            index = name,
            parent = parent.name(),
            entries = index.derived.index_header().record_count,
            "built index"
        );
        Ok(index)
    }

    /// Reattaches an index from its persisted header.
    pub fn restore<P: BaseTable + ?Sized>(parent: &P, header: IndexHeader) -> Result<Self> {
        let root = header.root_page_id.ok_or_else(|| StratumError::CorruptHeader {
            reason: format!("index '{}' has no root page", header.name),
        })?;
        let key = header.key.clone();
        key.validate(parent.columns())?;
        let schema = Self::entry_schema(parent.columns(), &key);
        let tree_key = key.compacted();
        let layout = TreeLayout::derive(
            &schema,
            &tree_key,
            parent.page_size(),
            header.record_disk_cost as usize,
        )?;
        let tree = BPlusTree::open(root, &schema, &tree_key, header.is_unique, layout)?;
        let derived = DerivedTable::restore(parent, header, schema)?;
        Ok(Self {
            derived,
            tree,
            base_key: key,
        })
    }

    /// Metadata to persist.
    pub fn index_header(&self) -> &IndexHeader {
        self.derived.index_header()
    }

    /// Key over the parent's schema.
    pub fn key(&self) -> &Key {
        &self.base_key
    }

    pub fn is_unique(&self) -> bool {
        self.tree.is_unique()
    }

    pub fn height(&self) -> Result<usize> {
        self.tree.height(&self.derived)
    }

    /// Indexes a parent row stored at `at`.
    pub fn insert_entry(&mut self, row: &Record, at: RecordKey) -> Result<RecordKey> {
        let mut entry = row.split(&self.base_key.indices());
        entry.push(Cell::Int(at.page_id as i64));
        entry.push(Cell::Int(at.row_id as i64));
        self.insert(entry)
    }

    /// Returns true if some row has this key. `key` holds the key columns in
    /// key order.
    pub fn exists(&self, key: &Record) -> Result<bool> {
        self.tree.exists(&self.derived, key)
    }

    /// Positions of every parent row whose key equals `key`.
    pub fn lookup(&self, key: &Record) -> Result<Vec<RecordKey>> {
        self.range(key, key)
    }

    /// Positions of every parent row with a key in `[lower, upper]`, in key
    /// order.
    pub fn range(&self, lower: &Record, upper: &Record) -> Result<Vec<RecordKey>> {
        let Some((first, last)) = self.tree.seek_range(&self.derived, lower, upper)? else {
            return Ok(Vec::new());
        };
        let width = self.base_key.len();
        RecordReader::ranged(self, first, last)
            .map(|entry| entry.and_then(|entry| locator(&entry, width)))
            .collect()
    }

    /// Copies the tree's root, outer leaves and entry count into the header.
    fn sync_header(&mut self, inserted: u64) -> Result<()> {
        let root = self.tree.root_page_id();
        let origin = self.tree.seek_origin_page_id(&self.derived)?;
        let terminal = self.tree.seek_terminal_page_id(&self.derived)?;
        let header = self.derived.index_header_mut();
        header.root_page_id = Some(root);
        header.origin_page_id = Some(origin);
        header.terminal_page_id = Some(terminal);
        header.record_count += inserted;
        Ok(())
    }
}

/// Reads the parent position out of an entry whose key is `width` columns.
fn locator(entry: &Record, width: usize) -> Result<RecordKey> {
    let id = |index: usize| {
        entry
            .get(index)
            .and_then(Cell::as_int)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| corrupt_page(format!("index entry {} has no locator", entry)))
    };
    Ok(RecordKey::new(id(width)?, id(width + 1)?))
}

impl RecordWriter for IndexTable {
    /// Inserts a full entry: key columns, page id, row id.
    fn insert(&mut self, entry: Record) -> Result<RecordKey> {
        self.derived.columns().validate(&entry)?;
        let at = self.tree.insert(&mut self.derived, entry)?;
        self.sync_header(1)?;
        Ok(at)
    }
}

impl PageSource for IndexTable {
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.derived.fetch_page(page_id)
    }

    fn page_size(&self) -> usize {
        self.derived.page_size()
    }
}

impl PageStore for IndexTable {
    fn store_page(&mut self, page: Page) -> Result<()> {
        self.derived.store_page(page)
    }

    fn generate_new_page_id(&mut self) -> Result<u32> {
        self.derived.generate_new_page_id()
    }
}

impl BaseTable for IndexTable {
    fn core(&self) -> &TableCore {
        self.derived.core()
    }

    fn name(&self) -> &str {
        self.derived.name()
    }

    fn columns(&self) -> &Schema {
        self.derived.columns()
    }

    fn record_count(&self) -> Result<u64> {
        self.derived.record_count()
    }

    fn origin_page_id(&self) -> Result<Option<u32>> {
        self.derived.origin_page_id()
    }

    fn terminal_page_id(&self) -> Result<Option<u32>> {
        self.derived.terminal_page_id()
    }

    fn fork_page(&mut self, page_id: u32) -> Result<u32> {
        let new_page_id = self.tree.fork(&mut self.derived, page_id)?;
        self.sync_header(0)?;
        Ok(new_page_id)
    }
}
