//! Record streams: a positional cursor over a page chain and the insert
//! interface shared by every table.

use crate::store::PageSource;
use std::sync::Arc;
use stratum_common::{Record, RecordKey, Result};
use stratum_storage::Page;

/// Sink for records.
pub trait RecordWriter {
    /// Inserts one record and returns where it landed.
    fn insert(&mut self, record: Record) -> Result<RecordKey>;

    /// Inserts records in order, stopping at the first failure.
    fn insert_batch<I>(&mut self, records: I) -> Result<Vec<RecordKey>>
    where
        I: IntoIterator<Item = Record>,
        Self: Sized,
    {
        records.into_iter().map(|r| self.insert(r)).collect()
    }
}

/// Cursor over the records between two positions of a page chain.
///
/// The cursor sits on a record. [`read_next`](Self::read_next) returns that
/// record and steps forward; stepping past the last position exhausts the
/// cursor, and a [`revert`](Self::revert) brings it back. Empty pages in
/// the chain are skipped.
pub struct RecordReader<'a, S: PageSource + ?Sized> {
    source: &'a S,
    /// First readable position, `None` for an empty range.
    origin: Option<RecordKey>,
    /// Last readable position.
    terminal: Option<RecordKey>,
    position: Option<RecordKey>,
    exhausted: bool,
    /// Page holding `position`.
    page: Option<Arc<Page>>,
}

impl<'a, S: PageSource + ?Sized> RecordReader<'a, S> {
    /// Reader over a whole chain from `origin_page_id` to `terminal_page_id`.
    pub fn new(
        source: &'a S,
        origin_page_id: Option<u32>,
        terminal_page_id: Option<u32>,
    ) -> Result<Self> {
        let (origin, terminal) = match (origin_page_id, terminal_page_id) {
            (Some(first), Some(last)) => {
                let origin = first_position(source, first, last)?;
                let terminal = match origin {
                    Some(_) => last_position(source, last, first)?,
                    None => None,
                };
                (origin, terminal)
            }
            _ => (None, None),
        };
        Ok(Self::bounded(source, origin, terminal))
    }

    /// Reader over the inclusive locator range `[lower, upper]`.
    pub fn ranged(source: &'a S, lower: RecordKey, upper: RecordKey) -> Self {
        Self::bounded(source, Some(lower), Some(upper))
    }

    /// Reader that yields nothing.
    pub fn empty(source: &'a S) -> Self {
        Self::bounded(source, None, None)
    }

    fn bounded(source: &'a S, origin: Option<RecordKey>, terminal: Option<RecordKey>) -> Self {
        let (origin, terminal) = match (origin, terminal) {
            (Some(o), Some(t)) => (Some(o), Some(t)),
            _ => (None, None),
        };
        Self {
            source,
            origin,
            terminal,
            position: origin,
            exhausted: false,
            page: None,
        }
    }

    /// Current position; stays on the last record once exhausted.
    pub fn position(&self) -> Option<RecordKey> {
        self.position
    }

    /// Returns true while a record is available to [`read_next`](Self::read_next).
    pub fn can_advance(&self) -> bool {
        self.position.is_some() && !self.exhausted
    }

    /// Returns true if the cursor can step back.
    pub fn can_revert(&self) -> bool {
        match self.position {
            Some(position) => self.exhausted || Some(position) != self.origin,
            None => false,
        }
    }

    /// Record under the cursor, without moving.
    pub fn read(&mut self) -> Result<Option<Record>> {
        if !self.can_advance() {
            return Ok(None);
        }
        let Some(position) = self.position else {
            return Ok(None);
        };
        let page = self.page_for(position.page_id)?;
        Ok(Some(page.select(position.row_id as usize)?.clone()))
    }

    /// Record under the cursor, then steps forward.
    pub fn read_next(&mut self) -> Result<Option<Record>> {
        let record = self.read()?;
        if record.is_some() {
            self.advance(1)?;
        }
        Ok(record)
    }

    /// Steps forward up to `n` records; returns how many steps were taken.
    pub fn advance(&mut self, n: usize) -> Result<usize> {
        let mut moved = 0;
        while moved < n && self.can_advance() {
            let Some(position) = self.position else {
                break;
            };
            match self.step_forward(position)? {
                Some(next) => self.position = Some(next),
                None => self.exhausted = true,
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Steps back up to `n` records; returns how many steps were taken.
    pub fn revert(&mut self, n: usize) -> Result<usize> {
        let mut moved = 0;
        while moved < n && self.can_revert() {
            if self.exhausted {
                self.exhausted = false;
            } else {
                let Some(position) = self.position else {
                    break;
                };
                match self.step_backward(position)? {
                    Some(previous) => self.position = Some(previous),
                    None => break,
                }
            }
            moved += 1;
        }
        Ok(moved)
    }

    fn page_for(&mut self, page_id: u32) -> Result<Arc<Page>> {
        if let Some(page) = &self.page {
            if page.page_id() == page_id {
                return Ok(Arc::clone(page));
            }
        }
        let page = self.source.fetch_page(page_id)?;
        self.page = Some(Arc::clone(&page));
        Ok(page)
    }

    fn step_forward(&mut self, position: RecordKey) -> Result<Option<RecordKey>> {
        if Some(position) == self.terminal {
            return Ok(None);
        }
        let page = self.page_for(position.page_id)?;
        if (position.row_id as usize) + 1 < page.count() {
            return Ok(Some(RecordKey::new(position.page_id, position.row_id + 1)));
        }
        let mut next = page.next_page_id();
        while let Some(page_id) = next {
            let page = self.page_for(page_id)?;
            if !page.is_empty() {
                return Ok(Some(RecordKey::new(page_id, 0)));
            }
            next = page.next_page_id();
        }
        Ok(None)
    }

    fn step_backward(&mut self, position: RecordKey) -> Result<Option<RecordKey>> {
        if Some(position) == self.origin {
            return Ok(None);
        }
        if position.row_id > 0 {
            return Ok(Some(RecordKey::new(position.page_id, position.row_id - 1)));
        }
        let page = self.page_for(position.page_id)?;
        let mut previous = page.last_page_id();
        while let Some(page_id) = previous {
            let page = self.page_for(page_id)?;
            if let Some(last_row) = page.count().checked_sub(1) {
                return Ok(Some(RecordKey::new(page_id, last_row as u32)));
            }
            previous = page.last_page_id();
        }
        Ok(None)
    }
}

impl<S: PageSource + ?Sized> Iterator for RecordReader<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// First non-empty position walking forward from `page_id`, not past `stop`.
fn first_position<S: PageSource + ?Sized>(
    source: &S,
    page_id: u32,
    stop: u32,
) -> Result<Option<RecordKey>> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let page = source.fetch_page(id)?;
        if !page.is_empty() {
            return Ok(Some(RecordKey::new(id, 0)));
        }
        if id == stop {
            break;
        }
        current = page.next_page_id();
    }
    Ok(None)
}

/// Last non-empty position walking backward from `page_id`, not past `stop`.
fn last_position<S: PageSource + ?Sized>(
    source: &S,
    page_id: u32,
    stop: u32,
) -> Result<Option<RecordKey>> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let page = source.fetch_page(id)?;
        if let Some(last_row) = page.count().checked_sub(1) {
            return Ok(Some(RecordKey::new(id, last_row as u32)));
        }
        if id == stop {
            break;
        }
        current = page.last_page_id();
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::PageStore;
    use stratum_common::record;

    /// Chain of pages holding the given values; empty slices make empty pages.
    fn chain(pages: &[&[i64]]) -> (MemoryStore, Vec<u32>) {
        let mut store = MemoryStore::new(4096);
        let ids: Vec<u32> = pages
            .iter()
            .map(|_| store.generate_new_page_id().unwrap())
            .collect();
        for (i, values) in pages.iter().enumerate() {
            let last = if i == 0 { None } else { Some(ids[i - 1]) };
            let mut page = Page::new(ids[i], last, ids.get(i + 1).copied(), 4096, 1, 10);
            for v in values.iter() {
                page.insert(record![*v]).unwrap();
            }
            store.store_page(page).unwrap();
        }
        (store, ids)
    }

    fn ints(reader: RecordReader<'_, MemoryStore>) -> Vec<i64> {
        reader
            .map(|r| r.unwrap()[0].as_int().unwrap())
            .collect()
    }

    #[test]
    fn test_whole_chain_skips_empty_pages() {
        let (store, ids) = chain(&[&[], &[1, 2], &[], &[3], &[]]);
        let reader = RecordReader::new(&store, ids.first().copied(), ids.last().copied()).unwrap();
        assert_eq!(reader.position(), Some(RecordKey::new(1, 0)));
        assert_eq!(ints(reader), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_table() {
        let (store, ids) = chain(&[&[], &[]]);
        let mut reader = RecordReader::new(&store, Some(ids[0]), Some(ids[1])).unwrap();
        assert!(!reader.can_advance());
        assert!(!reader.can_revert());
        assert_eq!(reader.read_next().unwrap(), None);

        let mut none = RecordReader::new(&store, None, None).unwrap();
        assert_eq!(none.read().unwrap(), None);
        assert_eq!(RecordReader::empty(&store).count(), 0);
    }

    #[test]
    fn test_advance_and_revert() {
        let (store, ids) = chain(&[&[1, 2], &[3, 4]]);
        let mut reader = RecordReader::new(&store, Some(ids[0]), Some(ids[1])).unwrap();
        assert!(!reader.can_revert());
        assert_eq!(reader.advance(2).unwrap(), 2);
        assert_eq!(reader.position(), Some(RecordKey::new(ids[1], 0)));
        assert_eq!(reader.read().unwrap(), Some(record![3i64]));

        assert_eq!(reader.advance(10).unwrap(), 2);
        assert!(!reader.can_advance());
        assert_eq!(reader.read().unwrap(), None);

        assert_eq!(reader.revert(1).unwrap(), 1);
        assert_eq!(reader.read().unwrap(), Some(record![4i64]));
        assert_eq!(reader.revert(10).unwrap(), 3);
        assert_eq!(reader.read().unwrap(), Some(record![1i64]));
        assert!(!reader.can_revert());
    }

    #[test]
    fn test_ranged() {
        let (store, ids) = chain(&[&[1, 2, 3], &[4, 5, 6]]);
        let reader = RecordReader::ranged(
            &store,
            RecordKey::new(ids[0], 1),
            RecordKey::new(ids[1], 1),
        );
        assert_eq!(ints(reader), vec![2, 3, 4, 5]);

        let single = RecordReader::ranged(&store, RecordKey::new(ids[1], 2), RecordKey::new(ids[1], 2));
        assert_eq!(ints(single), vec![6]);
    }

    #[test]
    fn test_read_next_walks_forward() {
        let (store, ids) = chain(&[&[7, 8]]);
        let mut reader = RecordReader::new(&store, Some(ids[0]), Some(ids[0])).unwrap();
        assert_eq!(reader.read_next().unwrap(), Some(record![7i64]));
        assert!(reader.can_advance());
        assert_eq!(reader.read_next().unwrap(), Some(record![8i64]));
        assert!(!reader.can_advance());
        assert!(reader.can_revert());
    }
}
