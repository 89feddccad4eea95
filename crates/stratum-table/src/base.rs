//! The contract shared by every table kind.

use crate::store::PageStore;
use crate::stream::{RecordReader, RecordWriter};
use crate::table_core::TableCore;
use std::sync::Arc;
use stratum_common::{Record, RecordKey, Result, Schema};
use stratum_storage::Page;

/// A table: a schema, a chain of pages from origin to terminal, and an
/// insert path.
///
/// Page access goes through the page manager under the table's cache key;
/// [`get_page`](Self::get_page) always returns the current cached snapshot,
/// so no page is held across a call that could evict it.
pub trait BaseTable: PageStore + RecordWriter {
    /// Binding to the page manager. Derived tables return their parent's.
    fn core(&self) -> &TableCore;

    fn name(&self) -> &str;

    /// Row layout.
    fn columns(&self) -> &Schema;

    fn record_count(&self) -> Result<u64>;

    /// First page of the record chain.
    fn origin_page_id(&self) -> Result<Option<u32>>;

    /// Last page of the record chain.
    fn terminal_page_id(&self) -> Result<Option<u32>>;

    /// Splits page `page_id` and links the upper half in after it,
    /// returning the new page's id.
    fn fork_page(&mut self, page_id: u32) -> Result<u32>;

    fn get_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.fetch_page(page_id)
    }

    fn set_page(&mut self, page: Page) -> Result<()> {
        self.store_page(page)
    }

    fn origin_page(&self) -> Result<Option<Arc<Page>>> {
        self.origin_page_id()?
            .map(|page_id| self.get_page(page_id))
            .transpose()
    }

    fn terminal_page(&self) -> Result<Option<Arc<Page>>> {
        self.terminal_page_id()?
            .map(|page_id| self.get_page(page_id))
            .transpose()
    }

    /// Reads the record at `at`.
    fn select(&self, at: RecordKey) -> Result<Record> {
        let page = self.get_page(at.page_id)?;
        Ok(page.select(at.row_id as usize)?.clone())
    }

    /// Cursor over every record, origin to terminal.
    fn reader(&self) -> Result<RecordReader<'_, Self>>
    where
        Self: Sized,
    {
        RecordReader::new(self, self.origin_page_id()?, self.terminal_page_id()?)
    }

    /// Every record in chain order.
    fn scan(&self) -> Result<Vec<Record>>
    where
        Self: Sized,
    {
        self.reader()?.collect()
    }
}
