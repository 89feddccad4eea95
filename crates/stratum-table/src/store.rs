//! Page address spaces that tables and trees run against.

use std::sync::Arc;
use stratum_common::Result;
use stratum_storage::Page;

/// Read access to a page address space.
pub trait PageSource {
    /// Returns the current snapshot of page `page_id`.
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>>;

    /// Page size of every page in this space.
    fn page_size(&self) -> usize;
}

/// Read-write access to a page address space.
///
/// Pages are never mutated in place: callers clone a fetched snapshot,
/// change it and store it back.
pub trait PageStore: PageSource {
    /// Publishes a page, replacing any previous version.
    fn store_page(&mut self, page: Page) -> Result<()>;

    /// Hands out an unused page id. Ids grow monotonically.
    fn generate_new_page_id(&mut self) -> Result<u32>;
}
