//! The binding between a table and the page manager.

use crate::store::{PageSource, PageStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stratum_buffer::{PageManager, Residency};
use stratum_common::config::MIN_RECORDS_PER_PAGE;
use stratum_common::{
    Key, PageUid, Result, Schema, StorageConfig, StratumError, TableKey, DEFAULT_PAGE_SIZE,
};
use stratum_storage::page::constants::{payload_size, record_disk_cost};
use stratum_storage::{Page, TableHeader, TableKind};
use tracing::{debug, trace};

/// How a new table is laid out and where it lives.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Dream (memory only) or scribe (file backed).
    pub residency: Residency,
    /// Page size in bytes.
    pub page_size: usize,
    /// Caps records per page regardless of record size.
    pub max_records_per_page: Option<usize>,
    /// Directory of the table file; scribe tables only.
    pub directory: PathBuf,
    /// Table file extension, without the dot.
    pub extension: String,
}

impl TableOptions {
    /// Memory-only table with default page size.
    pub fn dream() -> Self {
        Self {
            residency: Residency::Dream,
            page_size: DEFAULT_PAGE_SIZE,
            max_records_per_page: None,
            directory: PathBuf::new(),
            extension: String::new(),
        }
    }

    /// Table laid out per `config` with the given residency.
    pub fn from_config(config: &StorageConfig, residency: Residency) -> Self {
        Self {
            residency,
            page_size: config.page_size,
            max_records_per_page: config.max_records_per_page,
            directory: config.data_dir.clone(),
            extension: config.extension.clone(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_records(mut self, limit: usize) -> Self {
        self.max_records_per_page = Some(limit);
        self
    }

    /// Record disk cost for a schema under these options.
    pub fn record_disk_cost(&self, schema: &Schema) -> usize {
        record_disk_cost(schema.disk_cost(), self.page_size, self.max_records_per_page)
    }
}

/// Checks that pages of `record_cost` bytes per record can hold enough
/// records to split.
pub(crate) fn check_capacity(page_size: usize, record_cost: usize) -> Result<()> {
    let capacity = payload_size(page_size) / record_cost.max(1);
    if capacity < MIN_RECORDS_PER_PAGE {
        return Err(StratumError::ConfigError(format!(
            "a {} byte page holds {} records of {} bytes; at least {} are required",
            page_size, capacity, record_cost, MIN_RECORDS_PER_PAGE
        )));
    }
    Ok(())
}

/// A table registered with a [`PageManager`].
///
/// Cloning is cheap and yields another handle on the same table.
#[derive(Clone)]
pub struct TableCore {
    manager: Arc<PageManager>,
    key: TableKey,
    name: String,
    schema: Schema,
    page_size: usize,
    record_disk_cost: usize,
}

impl TableCore {
    /// Registers a new, empty table.
    pub(crate) fn create(
        manager: Arc<PageManager>,
        name: &str,
        schema: Schema,
        kind: TableKind,
        sort_key: Option<(Key, bool)>,
        options: &TableOptions,
    ) -> Result<Self> {
        if let Some(limit) = options.max_records_per_page {
            if limit < MIN_RECORDS_PER_PAGE {
                return Err(StratumError::ConfigError(format!(
                    "max_records_per_page {} is below {}",
                    limit, MIN_RECORDS_PER_PAGE
                )));
            }
        }
        let cost = options.record_disk_cost(&schema);
        check_capacity(options.page_size, cost)?;

        let mut header = TableHeader::new(name, schema, kind, options.page_size, cost)?;
        if options.residency == Residency::Scribe {
            header = header.with_location(
                options.directory.to_string_lossy(),
                options.extension.clone(),
            );
        }
        if let Some((key, is_primary)) = sort_key {
            header = header.with_sort_key(key, is_primary);
        }
        header.validate()?;

        let core = Self::from_header(manager, &header);
        core.manager.create_table(header, options.residency)?;
        debug!(table = %core.key, ?kind, cost, "table ready");
        Ok(core)
    }

    /// Opens a table file, checking that it holds a table of `expected` kind.
    pub(crate) fn open(
        manager: Arc<PageManager>,
        path: impl AsRef<Path>,
        expected: TableKind,
    ) -> Result<(Self, TableHeader)> {
        let key = manager.open_table(path)?;
        let header = manager.header(&key)?;
        if header.kind != expected {
            manager.close_table(&key)?;
            return Err(StratumError::TypeMismatch {
                expected: format!("{:?} table", expected),
                actual: format!("{:?} table", header.kind),
            });
        }
        Ok((Self::from_header(manager, &header), header))
    }

    fn from_header(manager: Arc<PageManager>, header: &TableHeader) -> Self {
        Self {
            manager,
            key: header.key(),
            name: header.name.clone(),
            schema: header.schema.clone(),
            page_size: header.page_size as usize,
            record_disk_cost: header.record_disk_cost as usize,
        }
    }

    pub fn manager(&self) -> &Arc<PageManager> {
        &self.manager
    }

    /// Cache identity of the table.
    pub fn key(&self) -> &TableKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn record_disk_cost(&self) -> usize {
        self.record_disk_cost
    }

    /// Copy of the current header.
    pub fn header(&self) -> Result<TableHeader> {
        self.manager.header(&self.key)
    }

    /// Mutates the header through the page manager.
    pub fn update_header<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut TableHeader) -> R,
    {
        self.manager.update_header(&self.key, f)
    }

    /// Writes dirty pages and the header of a scribe table.
    pub fn flush(&self) -> Result<usize> {
        self.manager.flush_table(&self.key)
    }

    /// Flushes and unregisters the table.
    pub fn close(self) -> Result<()> {
        self.manager.close_table(&self.key)
    }

    /// Unregisters the table and deletes its file.
    pub fn drop_table(self) -> Result<()> {
        self.manager.drop_table(&self.key)
    }
}

impl PageSource for TableCore {
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.manager
            .request_page(&PageUid::new(self.key.clone(), page_id))
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

impl PageStore for TableCore {
    fn store_page(&mut self, page: Page) -> Result<()> {
        self.manager.push_page(&self.key, page, true)?;
        Ok(())
    }

    fn generate_new_page_id(&mut self) -> Result<u32> {
        self.manager.allocate_page_id(&self.key)
    }
}

impl std::fmt::Debug for TableCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCore")
            .field("key", &self.key)
            .field("page_size", &self.page_size)
            .field("record_disk_cost", &self.record_disk_cost)
            .finish()
    }
}

/// Splits page `page_id` at its midpoint and links the upper half in as a
/// new page right after it. Returns the new page's id.
///
/// The page kind is preserved. Callers fix any table-level pointers (terminal,
/// radix) that referred to the split page.
pub(crate) fn fork_chain<S: PageStore + ?Sized>(store: &mut S, page_id: u32) -> Result<u32> {
    let mut lower = (*store.fetch_page(page_id)?).clone();
    let count = lower.count();
    let pivot = count / 2;
    if count < 2 || pivot == 0 || pivot + 1 >= count {
        return Err(StratumError::InvalidSplit { count, pivot });
    }

    let new_page_id = store.generate_new_page_id()?;
    let old_next = lower.next_page_id();
    let upper = lower.split(new_page_id, Some(page_id), old_next, pivot)?;
    lower.set_next_page_id(Some(new_page_id));

    if let Some(next_id) = old_next {
        let mut next = (*store.fetch_page(next_id)?).clone();
        next.set_last_page_id(Some(new_page_id));
        store.store_page(next)?;
    }
    store.store_page(lower)?;
    store.store_page(upper)?;
    trace!(page_id, new_page_id, pivot, "forked page");
    Ok(new_page_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use stratum_common::record;

    fn chain(store: &mut MemoryStore, pages: &[&[i64]]) -> Vec<u32> {
        let ids: Vec<u32> = pages
            .iter()
            .map(|_| store.generate_new_page_id().unwrap())
            .collect();
        for (i, values) in pages.iter().enumerate() {
            let last = if i == 0 { None } else { Some(ids[i - 1]) };
            let next = ids.get(i + 1).copied();
            let mut page = Page::new(ids[i], last, next, 4096, 1, 10);
            for v in values.iter() {
                page.insert(record![*v]).unwrap();
            }
            store.store_page(page).unwrap();
        }
        ids
    }

    #[test]
    fn test_fork_chain_relinks_neighbors() {
        let mut store = MemoryStore::new(4096);
        let ids = chain(&mut store, &[&[1, 2, 3, 4], &[5, 6]]);
        let new_id = fork_chain(&mut store, ids[0]).unwrap();

        let lower = store.fetch_page(ids[0]).unwrap();
        let upper = store.fetch_page(new_id).unwrap();
        let next = store.fetch_page(ids[1]).unwrap();
        assert_eq!(lower.count(), 2);
        assert_eq!(upper.count(), 2);
        assert_eq!(lower.next_page_id(), Some(new_id));
        assert_eq!(upper.last_page_id(), Some(ids[0]));
        assert_eq!(upper.next_page_id(), Some(ids[1]));
        assert_eq!(next.last_page_id(), Some(new_id));
        assert_eq!(upper.origin(), Some(&record![3i64]));
    }

    #[test]
    fn test_fork_chain_rejects_small_pages() {
        let mut store = MemoryStore::new(4096);
        let ids = chain(&mut store, &[&[1, 2]]);
        assert!(matches!(
            fork_chain(&mut store, ids[0]),
            Err(StratumError::InvalidSplit { count: 2, .. })
        ));
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn test_capacity_check() {
        assert!(check_capacity(4096, 1344).is_ok());
        assert!(matches!(
            check_capacity(4096, 2000),
            Err(StratumError::ConfigError(_))
        ));
    }

    #[test]
    fn test_options_fold_record_cap() {
        let schema = Schema::new(vec![stratum_common::Column::new(
            "id",
            stratum_common::Affinity::Int,
            0,
        )])
        .unwrap();
        let options = TableOptions::dream().with_page_size(4096).with_max_records(3);
        assert_eq!(options.record_disk_cost(&schema), 1344);
        assert_eq!(TableOptions::dream().record_disk_cost(&schema), 10);
    }
}
