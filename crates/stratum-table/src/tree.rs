//! Clustered B+Tree tables.

use crate::base::BaseTable;
use crate::btree::{BPlusTree, TreeLayout};
use crate::store::{PageSource, PageStore};
use crate::stream::{RecordReader, RecordWriter};
use crate::table_core::{TableCore, TableOptions};
use std::path::Path;
use std::sync::Arc;
use stratum_buffer::PageManager;
use stratum_common::{Key, Record, RecordKey, Result, Schema, StratumError};
use stratum_storage::{Page, TableKind};

/// A table whose rows live in the leaves of a B+Tree on the sort key.
///
/// The leaves form the record chain; origin and terminal track the first and
/// last leaf and the root id is kept in the header.
#[derive(Debug, Clone)]
pub struct TreeTable {
    core: TableCore,
    tree: BPlusTree,
}

impl TreeTable {
    /// Creates an empty table clustered on `key`. A unique table rejects
    /// duplicate keys.
    pub fn create(
        manager: Arc<PageManager>,
        name: &str,
        schema: Schema,
        key: Key,
        is_unique: bool,
        options: &TableOptions,
    ) -> Result<Self> {
        let mut core = TableCore::create(
            manager,
            name,
            schema.clone(),
            TableKind::Tree,
            Some((key.clone(), is_unique)),
            options,
        )?;
        let leaf_cost = core.record_disk_cost();
        let tree = BPlusTree::create(&mut core, &schema, &key, is_unique, leaf_cost)?;
        let root = tree.root_page_id();
        core.update_header(|h| {
            h.root_page_id = Some(root);
            h.origin_page_id = Some(root);
            h.terminal_page_id = Some(root);
        })?;
        Ok(Self { core, tree })
    }

    /// Opens a tree table file.
    pub fn open(manager: Arc<PageManager>, path: impl AsRef<Path>) -> Result<Self> {
        let (core, header) = TableCore::open(manager, path, TableKind::Tree)?;
        let root = header.root_page_id.ok_or_else(|| StratumError::CorruptHeader {
            reason: format!("tree table '{}' has no root page", header.name),
        })?;
        let layout = TreeLayout::derive(
            &header.schema,
            &header.sort_key,
            core.page_size(),
            core.record_disk_cost(),
        )?;
        let tree = BPlusTree::open(
            root,
            &header.schema,
            &header.sort_key,
            header.is_primary_key,
            layout,
        )?;
        Ok(Self { core, tree })
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    pub fn sort_key(&self) -> &Key {
        self.tree.order().key()
    }

    /// Number of tree levels.
    pub fn height(&self) -> Result<usize> {
        self.tree.height(&self.core)
    }

    /// Returns true if a row with this key exists. `key` holds only the key
    /// columns, in key order.
    pub fn exists(&self, key: &Record) -> Result<bool> {
        self.tree.exists(&self.core, key)
    }

    /// First row with `key`.
    pub fn seek(&self, key: &Record) -> Result<Option<Record>> {
        self.tree
            .seek_first(&self.core, key)?
            .map(|at| self.tree.row_at(&self.core, at))
            .transpose()
    }

    /// Every row with a key in `[lower, upper]`, in key order.
    pub fn range(&self, lower: &Record, upper: &Record) -> Result<Vec<Record>> {
        match self.tree.seek_range(&self.core, lower, upper)? {
            Some((first, last)) => RecordReader::ranged(self, first, last).collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Cursor over the rows with a key in `[lower, upper]`.
    pub fn range_reader(&self, lower: &Record, upper: &Record) -> Result<RecordReader<'_, Self>> {
        Ok(match self.tree.seek_range(&self.core, lower, upper)? {
            Some((first, last)) => RecordReader::ranged(self, first, last),
            None => RecordReader::empty(self),
        })
    }

    /// Flushes and unregisters the table.
    pub fn close(self) -> Result<()> {
        self.core.close()
    }

    /// Unregisters the table and deletes its file.
    pub fn drop_table(self) -> Result<()> {
        self.core.drop_table()
    }

    /// Copies the tree's root and outer leaves into the header.
    fn sync_header(&self, inserted: u64) -> Result<()> {
        let root = self.tree.root_page_id();
        let origin = self.tree.seek_origin_page_id(&self.core)?;
        let terminal = self.tree.seek_terminal_page_id(&self.core)?;
        self.core.update_header(|h| {
            h.root_page_id = Some(root);
            h.origin_page_id = Some(origin);
            h.terminal_page_id = Some(terminal);
            h.record_count += inserted;
        })
    }
}

impl RecordWriter for TreeTable {
    fn insert(&mut self, record: Record) -> Result<RecordKey> {
        self.core.schema().validate(&record)?;
        let at = self.tree.insert(&mut self.core, record)?;
        self.sync_header(1)?;
        Ok(at)
    }
}

impl PageSource for TreeTable {
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.core.fetch_page(page_id)
    }

    fn page_size(&self) -> usize {
        self.core.page_size()
    }
}

impl PageStore for TreeTable {
    fn store_page(&mut self, page: Page) -> Result<()> {
        self.core.store_page(page)
    }

    fn generate_new_page_id(&mut self) -> Result<u32> {
        self.core.generate_new_page_id()
    }
}

impl BaseTable for TreeTable {
    fn core(&self) -> &TableCore {
        &self.core
    }

    fn name(&self) -> &str {
        self.core.name()
    }

    fn columns(&self) -> &Schema {
        self.core.schema()
    }

    fn record_count(&self) -> Result<u64> {
        Ok(self.core.header()?.record_count)
    }

    fn origin_page_id(&self) -> Result<Option<u32>> {
        Ok(self.core.header()?.origin_page_id)
    }

    fn terminal_page_id(&self) -> Result<Option<u32>> {
        Ok(self.core.header()?.terminal_page_id)
    }

    /// Splits a tree node, updating its ancestors.
    fn fork_page(&mut self, page_id: u32) -> Result<u32> {
        let new_page_id = self.tree.fork(&mut self.core, page_id)?;
        self.sync_header(0)?;
        Ok(new_page_id)
    }
}
