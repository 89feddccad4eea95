//! Append-only heap tables.

use crate::base::BaseTable;
use crate::store::{PageSource, PageStore};
use crate::stream::RecordWriter;
use crate::table_core::{fork_chain, TableCore, TableOptions};
use std::path::Path;
use std::sync::Arc;
use stratum_buffer::PageManager;
use stratum_common::{Record, RecordKey, Result, Schema};
use stratum_storage::{Page, TableKind};
use tracing::trace;

/// A table of plain pages that only ever appends.
///
/// New records go to the terminus page (the chain's tail), which is
/// re-fetched from the cache on every insert. A full terminus gets a fresh
/// successor.
#[derive(Debug, Clone)]
pub struct HeapTable {
    core: TableCore,
}

impl HeapTable {
    /// Creates an empty heap table.
    pub fn create(
        manager: Arc<PageManager>,
        name: &str,
        schema: Schema,
        options: &TableOptions,
    ) -> Result<Self> {
        let core = TableCore::create(manager, name, schema, TableKind::Heap, None, options)?;
        Ok(Self { core })
    }

    /// Opens a heap table file.
    pub fn open(manager: Arc<PageManager>, path: impl AsRef<Path>) -> Result<Self> {
        let (core, _) = TableCore::open(manager, path, TableKind::Heap)?;
        Ok(Self { core })
    }

    /// Flushes and unregisters the table.
    pub fn close(self) -> Result<()> {
        self.core.close()
    }

    /// Unregisters the table and deletes its file.
    pub fn drop_table(self) -> Result<()> {
        self.core.drop_table()
    }

    fn new_page(&mut self, last_page_id: Option<u32>) -> Result<Page> {
        let page_id = self.core.generate_new_page_id()?;
        Ok(Page::new(
            page_id,
            last_page_id,
            None,
            self.core.page_size(),
            self.core.schema().len(),
            self.core.record_disk_cost(),
        ))
    }

    /// Current terminus, starting the chain if the table has no pages.
    fn terminus(&mut self) -> Result<Page> {
        match self.core.header()?.terminal_page_id {
            Some(page_id) => Ok((*self.core.fetch_page(page_id)?).clone()),
            None => {
                let page = self.new_page(None)?;
                let page_id = page.page_id();
                self.core.update_header(|h| {
                    h.origin_page_id = Some(page_id);
                    h.terminal_page_id = Some(page_id);
                })?;
                Ok(page)
            }
        }
    }
}

impl RecordWriter for HeapTable {
    fn insert(&mut self, record: Record) -> Result<RecordKey> {
        self.core.schema().validate(&record)?;
        let mut page = self.terminus()?;
        if page.is_full() {
            let fresh = self.new_page(Some(page.page_id()))?;
            let page_id = fresh.page_id();
            page.set_next_page_id(Some(page_id));
            self.core.store_page(page)?;
            self.core
                .update_header(|h| h.terminal_page_id = Some(page_id))?;
            trace!(table = %self.core.key(), page_id, "new terminus");
            page = fresh;
        }
        let row = page.insert(record)?;
        let at = RecordKey::new(page.page_id(), row as u32);
        self.core.store_page(page)?;
        self.core.update_header(|h| h.record_count += 1)?;
        Ok(at)
    }
}

impl PageSource for HeapTable {
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.core.fetch_page(page_id)
    }

    fn page_size(&self) -> usize {
        self.core.page_size()
    }
}

impl PageStore for HeapTable {
    fn store_page(&mut self, page: Page) -> Result<()> {
        self.core.store_page(page)
    }

    fn generate_new_page_id(&mut self) -> Result<u32> {
        self.core.generate_new_page_id()
    }
}

impl BaseTable for HeapTable {
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

    fn fork_page(&mut self, page_id: u32) -> Result<u32> {
        let new_page_id = fork_chain(&mut self.core, page_id)?;
        self.core.update_header(|h| {
            if h.terminal_page_id == Some(page_id) {
                h.terminal_page_id = Some(new_page_id);
            }
        })?;
        Ok(new_page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_buffer::CacheConfig;
    use stratum_common::{record, Affinity, Column};

    fn table(limit: usize) -> HeapTable {
        let manager = PageManager::shared(CacheConfig::default());
        let schema = Schema::new(vec![
            Column::new("id", Affinity::Int, 0),
            Column::new("name", Affinity::String, 10),
        ])
        .unwrap();
        let options = TableOptions::dream().with_page_size(4096).with_max_records(limit);
        HeapTable::create(manager, "people", schema, &options).unwrap()
    }

    #[test]
    fn test_insert_appends_in_order() {
        let mut heap = table(3);
        let mut keys = Vec::new();
        for i in 0..7i64 {
            keys.push(heap.insert(record![i, format!("p{}", i)]).unwrap());
        }
        assert_eq!(keys[0], RecordKey::new(0, 0));
        assert_eq!(keys[3], RecordKey::new(1, 0));
        assert_eq!(keys[6], RecordKey::new(2, 0));
        assert_eq!(heap.record_count().unwrap(), 7);
        assert_eq!(heap.origin_page_id().unwrap(), Some(0));
        assert_eq!(heap.terminal_page_id().unwrap(), Some(2));

        let ids: Vec<i64> = heap
            .scan()
            .unwrap()
            .iter()
            .map(|r| r[0].as_int().unwrap())
            .collect();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());
        assert_eq!(heap.select(keys[4]).unwrap(), record![4i64, "p4"]);
    }

    #[test]
    fn test_insert_validates_schema() {
        let mut heap = table(3);
        assert!(heap.insert(record![1i64]).is_err());
        assert!(heap.insert(record!["x", "y"]).is_err());
        assert_eq!(heap.record_count().unwrap(), 0);
        assert_eq!(heap.origin_page().unwrap(), None);
    }

    #[test]
    fn test_fork_terminus() {
        let mut heap = table(4);
        for i in 0..4i64 {
            heap.insert(record![i, "x"]).unwrap();
        }
        let new_page = heap.fork_page(0).unwrap();
        assert_eq!(heap.terminal_page_id().unwrap(), Some(new_page));
        assert_eq!(heap.get_page(0).unwrap().count(), 2);
        heap.insert(record![4i64, "x"]).unwrap();
        assert_eq!(heap.terminal_page().unwrap().unwrap().count(), 3);
        assert_eq!(heap.scan().unwrap().len(), 5);
    }
}
