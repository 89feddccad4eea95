//! Sorted tables: a chain of sorted pages ordered end to end by the sort key.

use crate::base::BaseTable;
use crate::store::{PageSource, PageStore};
use crate::stream::RecordWriter;
use crate::table_core::{fork_chain, TableCore, TableOptions};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use stratum_buffer::PageManager;
use stratum_common::{Key, Record, RecordKey, RecordMatcher, Result, Schema};
use stratum_storage::{Page, SortedPage, TableHeader, TableKind};
use tracing::{debug, trace};

/// Terminal row of every non-empty page, in chain order.
///
/// Terminals never decrease along the chain, so the page for a row is the
/// first entry whose terminal does not sort below it.
#[derive(Debug, Default)]
struct PageDirectory {
    entries: Vec<(Record, u32)>,
}

impl PageDirectory {
    fn locate(&self, record: &Record, matcher: &RecordMatcher) -> Option<u32> {
        let at = self
            .entries
            .partition_point(|(last, _)| matcher.compare(last, record) == Ordering::Less);
        self.entries.get(at).map(|&(_, page_id)| page_id)
    }

    fn position(&self, page_id: u32, terminal: &Record, matcher: &RecordMatcher) -> Option<usize> {
        let start = self
            .entries
            .partition_point(|(last, _)| matcher.compare(last, terminal) == Ordering::Less);
        self.entries[start..]
            .iter()
            .take_while(|(last, _)| matcher.compare(last, terminal) == Ordering::Equal)
            .position(|&(_, id)| id == page_id)
            .map(|offset| start + offset)
    }

    /// Records that `page_id`'s terminal moved from `old` to `new`.
    fn retarget(
        &mut self,
        page_id: u32,
        old: Option<&Record>,
        new: &Record,
        matcher: &RecordMatcher,
    ) {
        match old.and_then(|old| self.position(page_id, old, matcher)) {
            Some(at) => self.entries[at].0 = new.clone(),
            None => self.entries.push((new.clone(), page_id)),
        }
    }

    /// Splits `page_id`'s entry after a fork moved its upper half to `upper_id`.
    fn split(
        &mut self,
        page_id: u32,
        old: &Record,
        lower: &Record,
        upper_id: u32,
        matcher: &RecordMatcher,
    ) {
        if let Some(at) = self.position(page_id, old, matcher) {
            self.entries[at].0 = lower.clone();
            self.entries.insert(at + 1, (old.clone(), upper_id));
        }
    }
}

/// A table whose pages, read origin to terminal, yield rows in key order.
///
/// Inserts find their page by checking the origin and terminal pages first,
/// then binary searching an in-memory directory of page terminals. Only the
/// chosen page is read. A full page is forked before the insert.
#[derive(Debug, Clone)]
pub struct SortedTable {
    core: TableCore,
    key: Key,
    matcher: RecordMatcher,
    directory: Arc<RwLock<PageDirectory>>,
}

impl SortedTable {
    /// Creates an empty table sorted by `key`.
    pub fn create(
        manager: Arc<PageManager>,
        name: &str,
        schema: Schema,
        key: Key,
        options: &TableOptions,
    ) -> Result<Self> {
        let core = TableCore::create(
            manager,
            name,
            schema,
            TableKind::Sorted,
            Some((key.clone(), false)),
            options,
        )?;
        Ok(Self::bind(core, key, PageDirectory::default()))
    }

    /// Opens a sorted table file, reading the chain once to rebuild the
    /// page directory.
    pub fn open(manager: Arc<PageManager>, path: impl AsRef<Path>) -> Result<Self> {
        let (core, header) = TableCore::open(manager, path, TableKind::Sorted)?;
        let mut directory = PageDirectory::default();
        let mut next = header.origin_page_id;
        while let Some(page_id) = next {
            let page = core.fetch_page(page_id)?;
            if let Some(last) = page.terminal() {
                directory.entries.push((last.clone(), page_id));
            }
            next = page.next_page_id();
        }
        debug!(table = %core.key(), pages = directory.entries.len(), "rebuilt page directory");
        Ok(Self::bind(core, header.sort_key, directory))
    }

    fn bind(core: TableCore, key: Key, directory: PageDirectory) -> Self {
        let matcher = RecordMatcher::symmetric(&key);
        Self {
            core,
            key,
            matcher,
            directory: Arc::new(RwLock::new(directory)),
        }
    }

    pub fn sort_key(&self) -> &Key {
        &self.key
    }

    /// Anchor page kept in the header; it follows forks of the page it names.
    pub fn radix_page_id(&self) -> Result<Option<u32>> {
        Ok(self.core.header()?.radix_page_id)
    }

    /// Flushes and unregisters the table.
    pub fn close(self) -> Result<()> {
        self.core.close()
    }

    /// Unregisters the table and deletes its file.
    pub fn drop_table(self) -> Result<()> {
        self.core.drop_table()
    }

    fn sorted_page(&self, page_id: u32) -> Result<SortedPage> {
        SortedPage::from_page((*self.core.fetch_page(page_id)?).clone())
    }

    /// Page where `record` belongs.
    pub fn search_page(&self, record: &Record) -> Result<Option<u32>> {
        let header = self.core.header()?;
        let (Some(origin_id), Some(terminal_id)) = (header.origin_page_id, header.terminal_page_id)
        else {
            return Ok(None);
        };

        let origin = self.sorted_page(origin_id)?;
        if let Some(last) = origin.terminal() {
            if self.matcher.compare(record, last) != Ordering::Greater {
                return Ok(Some(origin_id));
            }
        }
        let terminal = self.sorted_page(terminal_id)?;
        if let Some(first) = terminal.origin() {
            if self.matcher.compare(record, first) != Ordering::Less {
                return Ok(Some(terminal_id));
            }
        }
        Ok(Some(
            self.directory
                .read()
                .locate(record, &self.matcher)
                .unwrap_or(terminal_id),
        ))
    }

    /// Position of a row whose key equals the key of `target`.
    pub fn find(&self, target: &Record) -> Result<Option<RecordKey>> {
        let Some(page_id) = self.search_page(target)? else {
            return Ok(None);
        };
        let page = self.sorted_page(page_id)?;
        Ok(page
            .find(target, &self.matcher)
            .map(|row| RecordKey::new(page_id, row as u32)))
    }

    fn start_chain(&mut self) -> Result<u32> {
        let page_id = self.core.generate_new_page_id()?;
        let page = SortedPage::new(
            page_id,
            None,
            None,
            self.core.page_size(),
            self.core.schema().len(),
            self.core.record_disk_cost(),
        );
        self.core.store_page(page.into_page())?;
        self.core.update_header(|h: &mut TableHeader| {
            h.origin_page_id = Some(page_id);
            h.terminal_page_id = Some(page_id);
            h.radix_page_id = Some(page_id);
        })?;
        Ok(page_id)
    }
}

impl RecordWriter for SortedTable {
    fn insert(&mut self, record: Record) -> Result<RecordKey> {
        self.core.schema().validate(&record)?;
        let mut page_id = match self.search_page(&record)? {
            Some(page_id) => page_id,
            None => self.start_chain()?,
        };
        let mut page = self.sorted_page(page_id)?;
        if page.is_full() {
            let upper_id = self.fork_page(page_id)?;
            let lower = self.sorted_page(page_id)?;
            let fits_lower = lower
                .terminal()
                .is_some_and(|last| self.matcher.compare(&record, last) != Ordering::Greater);
            if !fits_lower {
                page_id = upper_id;
            }
            page = self.sorted_page(page_id)?;
        }
        let old_terminal = page.terminal().cloned();
        let row = page.insert(record, &self.matcher)?;
        if let Some(last) = page.terminal() {
            if old_terminal.as_ref() != Some(last) {
                self.directory
                    .write()
                    .retarget(page_id, old_terminal.as_ref(), last, &self.matcher);
            }
        }
        self.core.store_page(page.into_page())?;
        self.core.update_header(|h| h.record_count += 1)?;
        Ok(RecordKey::new(page_id, row as u32))
    }
}

impl PageSource for SortedTable {
    fn fetch_page(&self, page_id: u32) -> Result<Arc<Page>> {
        self.core.fetch_page(page_id)
    }

    fn page_size(&self) -> usize {
        self.core.page_size()
    }
}

impl PageStore for SortedTable {
    fn store_page(&mut self, page: Page) -> Result<()> {
        self.core.store_page(page)
    }

    fn generate_new_page_id(&mut self) -> Result<u32> {
        self.core.generate_new_page_id()
    }
}

impl BaseTable for SortedTable {
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

    /// Forks like any chain page; a forked terminal or radix page hands
    /// its role to the new upper page.
    fn fork_page(&mut self, page_id: u32) -> Result<u32> {
        let old_terminal = self.core.fetch_page(page_id)?.terminal().cloned();
        let new_page_id = fork_chain(&mut self.core, page_id)?;
        if let Some(old) = old_terminal {
            if let Some(lower) = self.core.fetch_page(page_id)?.terminal() {
                self.directory
                    .write()
                    .split(page_id, &old, lower, new_page_id, &self.matcher);
            }
        }
        self.core.update_header(|h| {
            if h.terminal_page_id == Some(page_id) {
                h.terminal_page_id = Some(new_page_id);
            }
            if h.radix_page_id == Some(page_id) {
                h.radix_page_id = Some(new_page_id);
            }
        })?;
        trace!(table = %self.core.key(), page_id, new_page_id, "forked sorted page");
        Ok(new_page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use stratum_buffer::{CacheConfig, Residency};
    use stratum_common::{record, Affinity, Column, SortDirection, StorageConfig};
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", Affinity::Int, 0),
            Column::new("score", Affinity::Double, 0),
        ])
        .unwrap()
    }

    fn table(key: Key) -> SortedTable {
        let manager = PageManager::shared(CacheConfig::default());
        let options = TableOptions::dream().with_page_size(4096).with_max_records(3);
        SortedTable::create(manager, "scores", schema(), key, &options).unwrap()
    }

    fn ids(table: &SortedTable) -> Vec<i64> {
        table
            .scan()
            .unwrap()
            .iter()
            .map(|r| r[0].as_int().unwrap())
            .collect()
    }

    #[test]
    fn test_insert_keeps_chain_sorted() {
        let mut table = table(Key::ascending(&[0]).unwrap());
        for id in [50, 10, 40, 20, 30, 60, 5, 45, 25, 15, 55, 35] {
            table.insert(record![id as i64, id as f64 / 2.0]).unwrap();
        }
        assert_eq!(
            ids(&table),
            vec![5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60]
        );
        assert_eq!(table.record_count().unwrap(), 12);
        let pages = table.core.header().unwrap().page_count;
        assert!(pages >= 4);
    }

    #[test]
    fn test_descending_key() {
        let key = Key::new(vec![(1, SortDirection::Descending)]).unwrap();
        let mut table = table(key);
        for id in 0..10i64 {
            table.insert(record![id, (id % 4) as f64]).unwrap();
        }
        let scores: Vec<f64> = table
            .scan()
            .unwrap()
            .iter()
            .map(|r| r[1].as_double().unwrap())
            .collect();
        let mut expected = scores.clone();
        expected.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_find() {
        let mut table = table(Key::ascending(&[0]).unwrap());
        assert_eq!(table.find(&record![1i64, 0.0]).unwrap(), None);
        for id in (0..20i64).rev() {
            table.insert(record![id, 0.5]).unwrap();
        }
        let at = table.find(&record![7i64, 0.0]).unwrap().unwrap();
        assert_eq!(table.select(at).unwrap(), record![7i64, 0.5]);
        assert_eq!(table.find(&record![20i64, 0.0]).unwrap(), None);
    }

    #[test]
    fn test_radix_follows_fork() {
        let mut table = table(Key::ascending(&[0]).unwrap());
        for id in 0..3i64 {
            table.insert(record![id, 0.0]).unwrap();
        }
        let first = table.radix_page_id().unwrap().unwrap();
        let upper = table.fork_page(first).unwrap();
        assert_eq!(table.radix_page_id().unwrap(), Some(upper));
        assert_eq!(table.terminal_page_id().unwrap(), Some(upper));
        assert_eq!(table.origin_page_id().unwrap(), Some(first));
        assert_eq!(ids(&table), vec![0, 1, 2]);
    }

    #[test]
    fn test_middle_inserts() {
        let mut table = table(Key::ascending(&[0]).unwrap());
        for id in (0..30i64).map(|i| i * 10) {
            table.insert(record![id, 0.0]).unwrap();
        }
        for id in (0..30i64).map(|i| i * 10 + 5) {
            table.insert(record![id, 1.0]).unwrap();
        }
        let expected: Vec<i64> = (0..60i64).map(|i| i * 5).collect();
        assert_eq!(ids(&table), expected);
    }

    /// Cache lookups spent locating the page for `id`.
    fn page_reads(manager: &PageManager, table: &SortedTable, id: i64) -> u64 {
        let before = manager.stats();
        table.search_page(&record![id, 0.0]).unwrap().unwrap();
        let after = manager.stats();
        (after.hits + after.misses) - (before.hits + before.misses)
    }

    #[test]
    fn test_search_reads_logarithmic_pages() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::with_data_dir(dir.path());
        let manager = PageManager::shared(CacheConfig::from_storage(&config));
        let options = TableOptions::from_config(&config, Residency::Scribe)
            .with_page_size(4096)
            .with_max_records(3);
        let mut table = SortedTable::create(
            manager.clone(),
            "ranked",
            schema(),
            Key::ascending(&[0]).unwrap(),
            &options,
        )
        .unwrap();

        let mut shuffled: Vec<i64> = (0..900).collect();
        shuffled.shuffle(&mut StdRng::seed_from_u64(5));
        for &id in &shuffled {
            table.insert(record![id, 0.0]).unwrap();
        }
        let pages = table.core.header().unwrap().page_count;
        assert!(pages > 300);
        let bound = 2 + (pages as f64).log2().ceil() as u64;

        for id in (0..900i64).step_by(37) {
            assert!(page_reads(&manager, &table, id) <= bound);
            let at = table.find(&record![id, 0.0]).unwrap().unwrap();
            assert_eq!(table.select(at).unwrap(), record![id, 0.0]);
        }

        // the directory is rebuilt from the chain on open
        table.close().unwrap();
        let table = SortedTable::open(manager.clone(), config.table_path("ranked")).unwrap();
        for id in (1..900i64).step_by(41) {
            assert!(page_reads(&manager, &table, id) <= bound);
            assert!(table.find(&record![id, 0.0]).unwrap().is_some());
        }
        assert_eq!(ids(&table), (0..900).collect::<Vec<_>>());
    }
}
