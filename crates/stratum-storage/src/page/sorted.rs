//! Sorted page: records kept in comparator order.

use super::header::PageKind;
use super::plain::Page;
use std::cmp::Ordering;
use std::ops::Deref;
use stratum_common::{Record, RecordMatcher, Result, StratumError};

/// Which occurrence a search should settle on when keys repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Any matching record.
    #[default]
    Any,
    /// The lowest matching row.
    FirstElement,
    /// The highest matching row.
    LastElement,
}

/// Binary search over `records` with a `record`-vs-row comparator.
///
/// `compare(row)` must return the ordering of the probe relative to `row`.
/// Returns `Ok(row)` on a match (refined by `mode`) or `Err(insertion point)`.
pub(crate) fn search_rows<F>(records: &[Record], mode: SearchMode, compare: F) -> std::result::Result<usize, usize>
where
    F: Fn(&Record) -> Ordering,
{
    let lower = records.partition_point(|row| compare(row) == Ordering::Greater);
    if lower == records.len() || compare(&records[lower]) != Ordering::Equal {
        return Err(lower);
    }
    match mode {
        SearchMode::Any | SearchMode::FirstElement => Ok(lower),
        SearchMode::LastElement => {
            let upper = records.partition_point(|row| compare(row) != Ordering::Less);
            Ok(upper - 1)
        }
    }
}

/// A page whose records are ordered by a [`RecordMatcher`].
///
/// Positional insertion is not offered; every insert goes to its sorted
/// position.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedPage {
    page: Page,
}

impl SortedPage {
    /// Creates an empty sorted page.
    pub fn new(
        page_id: u32,
        last_page_id: Option<u32>,
        next_page_id: Option<u32>,
        page_size: usize,
        field_count: usize,
        data_disk_cost: usize,
    ) -> Self {
        let mut page = Page::new(
            page_id,
            last_page_id,
            next_page_id,
            page_size,
            field_count,
            data_disk_cost,
        );
        page.set_kind(PageKind::Sorted);
        Self { page }
    }

    /// Reinterprets a page as sorted, failing on any other kind.
    pub fn from_page(page: Page) -> Result<Self> {
        if page.kind() != PageKind::Sorted {
            return Err(StratumError::PageKindMismatch {
                expected: PageKind::Sorted.to_string(),
                actual: page.kind().to_string(),
            });
        }
        Ok(Self { page })
    }

    /// Returns the underlying page.
    pub fn into_page(self) -> Page {
        self.page
    }

    pub fn set_last_page_id(&mut self, page_id: Option<u32>) {
        self.page.set_last_page_id(page_id);
    }

    pub fn set_next_page_id(&mut self, page_id: Option<u32>) {
        self.page.set_next_page_id(page_id);
    }

    /// Binary search for `record`: `Ok(row)` if found, `Err(insertion point)`.
    pub fn search(&self, record: &Record, matcher: &RecordMatcher) -> std::result::Result<usize, usize> {
        search_rows(self.page.records(), SearchMode::Any, |row| {
            matcher.compare(record, row)
        })
    }

    /// Exact lookup; `None` when no record compares equal.
    pub fn find(&self, record: &Record, matcher: &RecordMatcher) -> Option<usize> {
        self.search(record, matcher).ok()
    }

    /// Like [`search`](Self::search), settling on the first or last duplicate.
    pub fn search_precise(
        &self,
        record: &Record,
        matcher: &RecordMatcher,
        mode: SearchMode,
    ) -> std::result::Result<usize, usize> {
        search_rows(self.page.records(), mode, |row| matcher.compare(record, row))
    }

    /// Where `record` falls relative to `[origin, terminal]` of this page.
    ///
    /// An empty page accepts everything.
    pub fn in_domain(&self, record: &Record, matcher: &RecordMatcher) -> Ordering {
        match (self.page.origin(), self.page.terminal()) {
            (Some(lo), Some(hi)) => matcher.is_between(record, lo, hi),
            _ => Ordering::Equal,
        }
    }

    /// Inserts `record` after any equal records, returning its row id.
    pub fn insert(&mut self, record: Record, matcher: &RecordMatcher) -> Result<usize> {
        let row = self
            .page
            .records()
            .partition_point(|r| matcher.compare(&record, r) != Ordering::Less);
        self.page.insert_at(row, record)?;
        Ok(row)
    }

    /// Removes the record at `row_id`.
    pub fn delete(&mut self, row_id: usize) -> Result<Record> {
        self.page.delete(row_id)
    }

    /// Replaces the record at `row_id`, moving it to keep the order.
    pub fn update(&mut self, row_id: usize, record: Record, matcher: &RecordMatcher) -> Result<usize> {
        self.page.delete(row_id)?;
        self.insert(record, matcher)
    }

    /// Moves records `[pivot, count)` into a new sorted page.
    pub fn split(
        &mut self,
        new_page_id: u32,
        last_page_id: Option<u32>,
        next_page_id: Option<u32>,
        pivot: usize,
    ) -> Result<SortedPage> {
        let page = self
            .page
            .split(new_page_id, last_page_id, next_page_id, pivot)?;
        Ok(SortedPage { page })
    }
}

impl Deref for SortedPage {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.page
    }
}
