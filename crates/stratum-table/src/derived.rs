//! Tables stored inside another table's page space.

use crate::base::BaseTable;
use crate::store::{PageSource, PageStore};
use crate::stream::RecordWriter;
use crate::table_core::{check_capacity, fork_chain, TableCore};
use std::sync::Arc;
use stratum_common::{Key, Record, RecordKey, Result, Schema, StratumError, TableKey};
use stratum_storage::page::constants::record_disk_cost;
use stratum_storage::{IndexHeader, Page};
use tracing::debug;

/// A heap-ordered table whose pages are allocated from, cached under and
/// written to its parent table.
///
/// The parent's header counts the pages; this table's own metadata is an
/// [`IndexHeader`] the host persists alongside the parent.
#[derive(Debug, Clone)]
pub struct DerivedTable {
    parent: TableCore,
    header: IndexHeader,
    schema: Schema,
}

impl DerivedTable {
    /// Creates an empty derived table inside `parent`.
    pub fn create<P: BaseTable + ?Sized>(
        parent: &P,
        name: &str,
        schema: Schema,
        max_records_per_page: Option<usize>,
    ) -> Result<Self> {
        if name.is_empty() || !name.is_ascii() {
            return Err(StratumError::ConfigError(format!(
                "invalid derived table name '{}'",
                name
            )));
        }
        let page_size = parent.page_size();
        let cost = record_disk_cost(schema.disk_cost(), page_size, max_records_per_page);
        check_capacity(page_size, cost)?;
        let header = IndexHeader::new(name, parent.name(), Key::default(), schema.len(), cost);
        // rejects names the header layout cannot hold
        header.to_bytes()?;
        debug!(table = name, parent = parent.name(), cost, "created derived table");
        Ok(Self {
            parent: parent.core().clone(),
            header,
            schema,
        })
    }

    /// Reattaches a derived table from its persisted header.
    pub fn restore<P: BaseTable + ?Sized>(parent: &P, header: IndexHeader, schema: Schema) -> Result<Self> {
        if header.field_count as usize != schema.len() {
            return Err(StratumError::TypeMismatch {
                expected: format!("{} fields", header.field_count),
                actual: format!("{} columns", schema.len()),
            });
        }
        if !header.parent.eq_ignore_ascii_case(parent.name()) {
            return Err(StratumError::ElementDoesNotExist(format!(
                "'{}' is derived from '{}', not '{}'",
                header.name,
                header.parent,
                parent.name()
            )));
        }
        Ok(Self {
            parent: parent.core().clone(),
            header,
            schema,
        })
    }

    /// Metadata to persist.
    pub fn index_header(&self) -> &IndexHeader {
        &self.header
    }

    pub(crate) fn index_header_mut(&mut self) -> &mut IndexHeader {
        &mut self.header
    }

    /// Cache key of the table whose pages this one borrows.
    pub fn parent_key(&self) -> &TableKey {
        self.parent.key()
    }

    pub fn record_disk_cost(&self) -> usize {
        self.header.record_disk_cost as usize
    }
}

impl RecordWriter for DerivedTable {
    fn insert(&mut self, record: Record) -> Result<RecordKey> {
        self.schema.validate(&record)?;
        let mut page = match self.header.terminal_page_id {
            Some(page_id) => (*self.fetch_page(page_id)?).clone(),
            None => {
                let page_id = self.generate_new_page_id()?;
                self.header.origin_page_id = Some(page_id);
                self.header.terminal_page_id = Some(page_id);
                Page::new(
                    page_id,
                    None,
                    None,
                    self.page_size(),
                    self.schema.len(),
                    self.record_disk_cost(),
                )
            }
        };
        if page.is_full() {
            let page_id = self.generate_new_page_id()?;
            let fresh = Page::new(
                page_id,
                Some(page.page_id()),
                None,
                self.page_size(),
                self.schema.len(),
                self.record_disk_cost(),
            );
            page.set_next_page_id(Some(page_id));
            self.store_page(page)?;
            self.header.terminal_page_id = Some(page_id);
            page = fresh;
        }
        let row = page.insert(record)?;
        let at = RecordKey::new(page.page_id(), row as u32);
        self.store_page(page)?;
        self.header.record_count += 1;
        Ok(at)
    }
}

impl PageSource for DerivedTable {
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.parent.fetch_page(page_id)
    }

    fn page_size(&self) -> usize {
        self.parent.page_size()
    }
}

impl PageStore for DerivedTable {
    fn store_page(&mut self, page: Page) -> Result<()> {
        self.parent.store_page(page)
    }

    fn generate_new_page_id(&mut self) -> Result<u32> {
        let page_id = self.parent.generate_new_page_id()?;
        self.header.page_count += 1;
        Ok(page_id)
    }
}

impl BaseTable for DerivedTable {
    fn core(&self) -> &TableCore {
        &self.parent
    }

    fn name(&self) -> &str {
        &self.header.name
    }

    fn columns(&self) -> &Schema {
        &self.schema
    }

    fn record_count(&self) -> Result<u64> {
        Ok(self.header.record_count)
    }

    fn origin_page_id(&self) -> Result<Option<u32>> {
        Ok(self.header.origin_page_id)
    }

    fn terminal_page_id(&self) -> Result<Option<u32>> {
        Ok(self.header.terminal_page_id)
    }

    fn fork_page(&mut self, page_id: u32) -> Result<u32> {
        let new_page_id = fork_chain(self, page_id)?;
        if self.header.terminal_page_id == Some(page_id) {
            self.header.terminal_page_id = Some(new_page_id);
        }
        Ok(new_page_id)
    }
}
