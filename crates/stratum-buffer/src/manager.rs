//! Page manager: the page cache shared by every table.
//!
//! Tables are registered as either disk-backed ("scribe") or memory-only
//! ("dream"). A table lives in exactly one of the two registries, so every
//! page has exactly one cache path. Scribe pages are loaded on demand,
//! tracked in a recency queue and written back when evicted; dream pages
//! stay resident until their table is dropped.

use crate::queue::FloatingQueue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use stratum_common::config::{DEFAULT_MEMORY_BUDGET, MIN_MEMORY_BUDGET};
use stratum_common::{PageUid, Result, StorageConfig, StratumError, TableKey};
use stratum_storage::{Page, TableFile, TableHeader};
use sysinfo::System;
use tracing::{debug, trace, warn};

/// Where a table's pages live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Memory only; pages are never evicted or written.
    Dream,
    /// Backed by a table file; pages are cached and written back.
    Scribe,
}

/// Configuration for the page manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory budget in bytes.
    pub memory_budget: usize,
    /// Sync table files after flushing.
    pub fsync_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            fsync_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Takes the cache settings from a storage configuration.
    pub fn from_storage(config: &StorageConfig) -> Self {
        Self {
            memory_budget: config.memory_budget,
            fsync_enabled: config.fsync_enabled,
        }
    }

    /// Sizes the budget to 25% of available system RAM.
    ///
    /// Never goes below the 8 MB floor.
    pub fn auto_sized() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        Self {
            memory_budget: (available_bytes / 4).max(MIN_MEMORY_BUDGET),
            ..Default::default()
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub evictions: u64,
    pub used_bytes: usize,
    pub budget_bytes: usize,
}

impl CacheStats {
    /// Fraction of requests served from memory.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A registered disk-backed table.
struct ScribeTable {
    header: TableHeader,
    file: TableFile,
    header_dirty: bool,
}

/// A cached scribe page.
struct CachedPage {
    page: Arc<Page>,
    /// Writes since the page was loaded or last flushed.
    writes: u32,
}

struct CacheState {
    scribe_tables: HashMap<TableKey, ScribeTable>,
    dream_tables: HashMap<TableKey, TableHeader>,
    scribe_pages: HashMap<PageUid, CachedPage>,
    dream_pages: HashMap<PageUid, Arc<Page>>,
    queue: FloatingQueue<PageUid>,
    used_bytes: usize,
    stats: CacheStats,
}

/// The page cache.
///
/// All methods take `&self`; state sits behind one mutex so the manager can
/// be shared as `Arc<PageManager>` between tables.
pub struct PageManager {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl PageManager {
    /// Creates a page manager, clamping the budget to the 8 MB floor.
    pub fn new(mut config: CacheConfig) -> Self {
        if config.memory_budget < MIN_MEMORY_BUDGET {
            warn!(
                requested = config.memory_budget,
                floor = MIN_MEMORY_BUDGET,
                "memory budget below floor, clamping"
            );
            config.memory_budget = MIN_MEMORY_BUDGET;
        }
        let stats = CacheStats {
            budget_bytes: config.memory_budget,
            ..Default::default()
        };
        Self {
            config,
            state: Mutex::new(CacheState {
                scribe_tables: HashMap::new(),
                dream_tables: HashMap::new(),
                scribe_pages: HashMap::new(),
                dream_pages: HashMap::new(),
                queue: FloatingQueue::new(),
                used_bytes: 0,
                stats,
            }),
        }
    }

    /// Creates a shareable page manager.
    pub fn shared(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Memory budget in bytes.
    pub fn budget(&self) -> usize {
        self.config.memory_budget
    }

    /// Bytes currently charged against the budget.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().used_bytes
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            used_bytes: state.used_bytes,
            ..state.stats
        }
    }

    // ---------------------------------------------------------------------
    // Table registry
    // ---------------------------------------------------------------------

    /// Registers a new table. Scribe tables get a fresh file at the header's
    /// location.
    pub fn create_table(&self, header: TableHeader, residency: Residency) -> Result<TableKey> {
        header.validate()?;
        let key = header.key();
        let mut state = self.state.lock();
        if state.contains_table(&key) {
            return Err(StratumError::ElementExists(key.to_string()));
        }
        self.ensure_budget(&mut state, TableHeader::SIZE)?;

        match residency {
            Residency::Dream => {
                state.dream_tables.insert(key.clone(), header);
            }
            Residency::Scribe => {
                let file = TableFile::create(&header, self.config.fsync_enabled)?;
                state.scribe_tables.insert(
                    key.clone(),
                    ScribeTable {
                        header,
                        file,
                        header_dirty: false,
                    },
                );
            }
        }
        state.used_bytes += TableHeader::SIZE;
        debug!(table = %key, ?residency, "created table");
        Ok(key)
    }

    /// Opens an existing table file and registers it as a scribe table.
    pub fn open_table(&self, path: impl AsRef<Path>) -> Result<TableKey> {
        let (file, header) = TableFile::open(path, self.config.fsync_enabled)?;
        let key = header.key();
        let mut state = self.state.lock();
        if state.contains_table(&key) {
            return Err(StratumError::ElementExists(key.to_string()));
        }
        self.ensure_budget(&mut state, TableHeader::SIZE)?;
        debug!(
            table = %key,
            pages = header.page_count,
            records = header.record_count,
            "opened table"
        );
        state.scribe_tables.insert(
            key.clone(),
            ScribeTable {
                header,
                file,
                header_dirty: false,
            },
        );
        state.used_bytes += TableHeader::SIZE;
        Ok(key)
    }

    /// Flushes a scribe table and unregisters it. A dream table's pages are
    /// discarded.
    pub fn close_table(&self, key: &TableKey) -> Result<()> {
        let mut state = self.state.lock();
        let residency = state
            .residency(key)
            .ok_or_else(|| StratumError::ElementDoesNotExist(key.to_string()))?;
        if residency == Residency::Scribe {
            Self::flush_table_locked(&mut state, key)?;
        }
        Self::burn_table_locked(&mut state, key);
        state.scribe_tables.remove(key);
        state.dream_tables.remove(key);
        state.used_bytes = state.used_bytes.saturating_sub(TableHeader::SIZE);
        debug!(table = %key, "closed table");
        Ok(())
    }

    /// Removes a table from the cache and deletes its file.
    pub fn drop_table(&self, key: &TableKey) -> Result<()> {
        let mut state = self.state.lock();
        if !state.contains_table(key) {
            return Err(StratumError::ElementDoesNotExist(key.to_string()));
        }
        Self::burn_table_locked(&mut state, key);
        state.dream_tables.remove(key);
        if let Some(table) = state.scribe_tables.remove(key) {
            table.file.delete()?;
        }
        state.used_bytes = state.used_bytes.saturating_sub(TableHeader::SIZE);
        debug!(table = %key, "dropped table");
        Ok(())
    }

    /// Returns true if the table is registered.
    pub fn contains_table(&self, key: &TableKey) -> bool {
        self.state.lock().contains_table(key)
    }

    /// Returns how the table is stored.
    pub fn residency(&self, key: &TableKey) -> Option<Residency> {
        self.state.lock().residency(key)
    }

    /// Copy of the table's header.
    pub fn header(&self, key: &TableKey) -> Result<TableHeader> {
        let state = self.state.lock();
        state
            .header(key)
            .cloned()
            .ok_or_else(|| StratumError::ElementDoesNotExist(key.to_string()))
    }

    /// Mutates the table's header in place.
    pub fn update_header<R, F>(&self, key: &TableKey, f: F) -> Result<R>
    where
        F: FnOnce(&mut TableHeader) -> R,
    {
        let mut state = self.state.lock();
        if let Some(table) = state.scribe_tables.get_mut(key) {
            table.header_dirty = true;
            return Ok(f(&mut table.header));
        }
        if let Some(header) = state.dream_tables.get_mut(key) {
            return Ok(f(header));
        }
        Err(StratumError::ElementDoesNotExist(key.to_string()))
    }

    /// Hands out the table's next page id.
    pub fn allocate_page_id(&self, key: &TableKey) -> Result<u32> {
        self.update_header(key, |header| header.allocate_page_id())
    }

    // ---------------------------------------------------------------------
    // Pages
    // ---------------------------------------------------------------------

    /// Returns a cached page, loading it from disk for scribe tables.
    pub fn request_page(&self, uid: &PageUid) -> Result<Arc<Page>> {
        let mut state = self.state.lock();

        if state.dream_tables.contains_key(&uid.table) {
            return state
                .dream_pages
                .get(uid)
                .cloned()
                .ok_or_else(|| StratumError::ElementDoesNotExist(uid.to_string()));
        }

        if let Some(cached) = state.scribe_pages.get(uid) {
            let page = Arc::clone(&cached.page);
            state.queue.enqueue_or_tag(uid.clone());
            state.stats.hits += 1;
            return Ok(page);
        }

        let page_size = match state.scribe_tables.get(&uid.table) {
            Some(table) => {
                if uid.page_id >= table.header.page_count {
                    return Err(StratumError::ElementDoesNotExist(uid.to_string()));
                }
                table.header.page_size as usize
            }
            None => return Err(StratumError::ElementDoesNotExist(uid.table.to_string())),
        };

        state.stats.misses += 1;
        self.ensure_budget(&mut state, page_size)?;
        let page = match state.scribe_tables.get(&uid.table) {
            Some(table) => Arc::new(table.file.read_page(uid.page_id)?),
            None => return Err(StratumError::ElementDoesNotExist(uid.table.to_string())),
        };
        state.stats.disk_reads += 1;
        trace!(page = %uid, "loaded page");

        state.scribe_pages.insert(
            uid.clone(),
            CachedPage {
                page: Arc::clone(&page),
                writes: 0,
            },
        );
        state.queue.enqueue_or_tag(uid.clone());
        state.used_bytes += page_size;
        Ok(page)
    }

    /// Inserts or replaces a page in the cache.
    ///
    /// `is_write` marks the page dirty so eviction writes it back.
    pub fn push_page(&self, key: &TableKey, page: Page, is_write: bool) -> Result<Arc<Page>> {
        let uid = PageUid::new(key.clone(), page.page_id());
        let page_size = page.page_size();
        let page = Arc::new(page);
        let mut state = self.state.lock();

        let residency = state
            .residency(key)
            .ok_or_else(|| StratumError::ElementDoesNotExist(key.to_string()))?;
        debug_assert!(
            state
                .header(key)
                .map(|h| uid.page_id < h.page_count)
                .unwrap_or(false),
            "page {} was never allocated",
            uid
        );

        match residency {
            Residency::Dream => {
                if !state.dream_pages.contains_key(&uid) {
                    self.ensure_budget(&mut state, page_size)?;
                    state.used_bytes += page_size;
                }
                state.dream_pages.insert(uid, Arc::clone(&page));
            }
            Residency::Scribe => {
                if let Some(cached) = state.scribe_pages.get_mut(&uid) {
                    cached.page = Arc::clone(&page);
                    cached.writes += is_write as u32;
                } else {
                    self.ensure_budget(&mut state, page_size)?;
                    state.scribe_pages.insert(
                        uid.clone(),
                        CachedPage {
                            page: Arc::clone(&page),
                            writes: is_write as u32,
                        },
                    );
                    state.used_bytes += page_size;
                }
                state.queue.enqueue_or_tag(uid);
            }
        }
        Ok(page)
    }

    /// Returns true if the page is resident, without touching it.
    pub fn contains_page(&self, uid: &PageUid) -> bool {
        let state = self.state.lock();
        state.scribe_pages.contains_key(uid) || state.dream_pages.contains_key(uid)
    }

    /// Number of resident pages.
    pub fn cached_pages(&self) -> usize {
        let state = self.state.lock();
        state.scribe_pages.len() + state.dream_pages.len()
    }

    /// Evicts least recently touched scribe pages until `needed` more bytes
    /// fit in the budget. Returns the number of bytes freed.
    pub fn release_memory(&self, needed: usize) -> Result<usize> {
        let mut state = self.state.lock();
        self.release_locked(&mut state, needed)
    }

    fn ensure_budget(&self, state: &mut CacheState, needed: usize) -> Result<()> {
        if state.used_bytes + needed > self.config.memory_budget {
            self.release_locked(state, needed)?;
        }
        Ok(())
    }

    fn release_locked(&self, state: &mut CacheState, needed: usize) -> Result<usize> {
        let budget = self.config.memory_budget;
        let mut freed = 0;
        while state.used_bytes + needed > budget {
            let uid = match state.queue.peek() {
                Some(uid) => uid.clone(),
                None => {
                    return Err(StratumError::OutOfMemory {
                        needed,
                        used: state.used_bytes,
                        budget,
                    })
                }
            };
            // a failed write leaves the page cached and at the queue head
            if let Some(cached) = state.scribe_pages.get(&uid) {
                if cached.writes > 0 {
                    if let Some(table) = state.scribe_tables.get(&uid.table) {
                        table.file.write_page(&cached.page)?;
                        state.stats.disk_writes += 1;
                    }
                }
            }
            state.queue.dequeue();
            let cached = match state.scribe_pages.remove(&uid) {
                Some(cached) => cached,
                None => continue,
            };
            let size = cached.page.page_size();
            state.used_bytes = state.used_bytes.saturating_sub(size);
            state.stats.evictions += 1;
            freed += size;
            debug!(page = %uid, dirty = cached.writes > 0, "evicted page");
        }
        Ok(freed)
    }

    /// Drops a page from the cache, writing it back first if `flush` is set
    /// and it is dirty.
    pub fn burn_page(&self, uid: &PageUid, flush: bool) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(page) = state.dream_pages.remove(uid) {
            state.used_bytes = state.used_bytes.saturating_sub(page.page_size());
            return Ok(());
        }
        if let Some(cached) = state.scribe_pages.get(uid) {
            if flush && cached.writes > 0 {
                if let Some(table) = state.scribe_tables.get(&uid.table) {
                    table.file.write_page(&cached.page)?;
                    state.stats.disk_writes += 1;
                }
            }
        }
        state.queue.remove(uid);
        if let Some(cached) = state.scribe_pages.remove(uid) {
            state.used_bytes = state.used_bytes.saturating_sub(cached.page.page_size());
        }
        Ok(())
    }

    /// Drops every cached page of a table, flushing first if `flush` is set.
    pub fn burn_table(&self, key: &TableKey, flush: bool) -> Result<()> {
        let mut state = self.state.lock();
        if flush && state.scribe_tables.contains_key(key) {
            Self::flush_table_locked(&mut state, key)?;
        }
        Self::burn_table_locked(&mut state, key);
        Ok(())
    }

    fn burn_table_locked(state: &mut CacheState, key: &TableKey) {
        let mut released = 0;
        state.dream_pages.retain(|uid, page| {
            let keep = &uid.table != key;
            if !keep {
                released += page.page_size();
            }
            keep
        });
        state.scribe_pages.retain(|uid, cached| {
            let keep = &uid.table != key;
            if !keep {
                released += cached.page.page_size();
            }
            keep
        });
        state.queue.remove_where(|uid| &uid.table == key);
        state.used_bytes = state.used_bytes.saturating_sub(released);
    }

    /// Writes a scribe table's dirty pages and header. Returns the number of
    /// pages written; dream tables write nothing.
    pub fn flush_table(&self, key: &TableKey) -> Result<usize> {
        let mut state = self.state.lock();
        match state.residency(key) {
            Some(Residency::Scribe) => Self::flush_table_locked(&mut state, key),
            Some(Residency::Dream) => Ok(0),
            None => Err(StratumError::ElementDoesNotExist(key.to_string())),
        }
    }

    fn flush_table_locked(state: &mut CacheState, key: &TableKey) -> Result<usize> {
        let CacheState {
            scribe_tables,
            scribe_pages,
            stats,
            ..
        } = state;
        let table = scribe_tables
            .get_mut(key)
            .ok_or_else(|| StratumError::ElementDoesNotExist(key.to_string()))?;

        let mut written = 0;
        for (uid, cached) in scribe_pages.iter_mut() {
            if &uid.table == key && cached.writes > 0 {
                table.file.write_page(&cached.page)?;
                cached.writes = 0;
                written += 1;
            }
        }
        stats.disk_writes += written as u64;

        table.file.write_header(&table.header)?;
        table.header_dirty = false;
        table.file.sync()?;
        debug!(table = %key, pages = written, "flushed table");
        Ok(written)
    }

    /// Flushes every scribe table.
    pub fn flush_all(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let keys: Vec<TableKey> = state.scribe_tables.keys().cloned().collect();
        let mut written = 0;
        for key in keys {
            written += Self::flush_table_locked(&mut state, &key)?;
        }
        Ok(written)
    }

    /// Flushes every scribe table, then empties both caches and registries.
    pub fn shutdown(&self) -> Result<()> {
        let written = self.flush_all()?;
        let mut state = self.state.lock();
        let tables = state.scribe_tables.len() + state.dream_tables.len();
        state.scribe_tables.clear();
        state.dream_tables.clear();
        state.scribe_pages.clear();
        state.dream_pages.clear();
        state.queue.clear();
        state.used_bytes = 0;
        debug!(tables, pages = written, "page manager shut down");
        Ok(())
    }
}

impl CacheState {
    fn contains_table(&self, key: &TableKey) -> bool {
        self.scribe_tables.contains_key(key) || self.dream_tables.contains_key(key)
    }

    fn residency(&self, key: &TableKey) -> Option<Residency> {
        if self.scribe_tables.contains_key(key) {
            Some(Residency::Scribe)
        } else if self.dream_tables.contains_key(key) {
            Some(Residency::Dream)
        } else {
            None
        }
    }

    fn header(&self, key: &TableKey) -> Option<&TableHeader> {
        self.scribe_tables
            .get(key)
            .map(|t| &t.header)
            .or_else(|| self.dream_tables.get(key))
    }
}

impl std::fmt::Debug for PageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("PageManager")
            .field("budget", &self.config.memory_budget)
            .field("used_bytes", &stats.used_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_common::{record, Affinity, Cell, Column, Record, Schema};
    use stratum_storage::TableKind;
    use tempfile::{tempdir, TempDir};

    const MB: usize = 1024 * 1024;

    fn schema() -> Schema {
        Schema::new(vec![Column::new("id", Affinity::Int, 0)]).unwrap()
    }

    fn scribe_header(dir: &TempDir, name: &str, page_size: usize) -> TableHeader {
        TableHeader::new(name, schema(), TableKind::Heap, page_size, 10)
            .unwrap()
            .with_location(dir.path().to_string_lossy(), "strat")
    }

    fn manager(budget: usize) -> PageManager {
        PageManager::new(CacheConfig {
            memory_budget: budget,
            fsync_enabled: false,
        })
    }

    fn push_new(pm: &PageManager, key: &TableKey, value: i64) -> u32 {
        let header = pm.header(key).unwrap();
        let id = pm.allocate_page_id(key).unwrap();
        let mut page = Page::new(id, None, None, header.page_size as usize, 1, 10);
        page.insert(record![value]).unwrap();
        pm.push_page(key, page, true).unwrap();
        id
    }

    #[test]
    fn test_budget_floor() {
        let pm = manager(1024);
        assert_eq!(pm.budget(), MIN_MEMORY_BUDGET);
        assert_eq!(PageManager::new(CacheConfig::default()).budget(), 32 * MB);
    }

    #[test]
    fn test_auto_sized_respects_floor() {
        assert!(CacheConfig::auto_sized().memory_budget >= MIN_MEMORY_BUDGET);
    }

    #[test]
    fn test_create_table_twice() {
        let pm = manager(8 * MB);
        let header = TableHeader::new("t", schema(), TableKind::Heap, 4096, 10).unwrap();
        pm.create_table(header.clone(), Residency::Dream).unwrap();
        assert!(matches!(
            pm.create_table(header, Residency::Dream),
            Err(StratumError::ElementExists(_))
        ));
        assert_eq!(pm.residency(&TableKey::new("T")), Some(Residency::Dream));
        assert_eq!(pm.used_bytes(), TableHeader::SIZE);
    }

    #[test]
    fn test_dream_pages() {
        let pm = manager(8 * MB);
        let header = TableHeader::new("mem", schema(), TableKind::Heap, 4096, 10).unwrap();
        let key = pm.create_table(header, Residency::Dream).unwrap();
        let id = push_new(&pm, &key, 5);

        let page = pm.request_page(&PageUid::new(key.clone(), id)).unwrap();
        assert_eq!(page.select(0).unwrap(), &record![5i64]);
        assert!(pm.request_page(&PageUid::new(key.clone(), 99)).is_err());
        assert_eq!(pm.flush_table(&key).unwrap(), 0);

        pm.drop_table(&key).unwrap();
        assert!(!pm.contains_table(&key));
        assert_eq!(pm.used_bytes(), 0);
    }

    #[test]
    fn test_scribe_reload_after_eviction() {
        let dir = tempdir().unwrap();
        let pm = manager(8 * MB);
        let key = pm
            .create_table(scribe_header(&dir, "disk", MB), Residency::Scribe)
            .unwrap();

        // Seven 1 MB pages fit alongside the 64 KB header; the eighth evicts.
        for v in 0..8 {
            push_new(&pm, &key, v);
        }
        let stats = pm.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.disk_writes, 1);
        assert!(!pm.contains_page(&PageUid::new(key.clone(), 0)));

        let page = pm.request_page(&PageUid::new(key.clone(), 0)).unwrap();
        assert_eq!(page.select(0).unwrap(), &record![0i64]);
        assert_eq!(pm.stats().disk_reads, 1);
        assert!(pm.used_bytes() <= pm.budget());
    }

    #[test]
    fn test_lru_respects_retouch() {
        let dir = tempdir().unwrap();
        let pm = manager(8 * MB);
        let key = pm
            .create_table(scribe_header(&dir, "lru", MB), Residency::Scribe)
            .unwrap();
        for v in 0..7 {
            push_new(&pm, &key, v);
        }
        pm.request_page(&PageUid::new(key.clone(), 0)).unwrap();
        push_new(&pm, &key, 7);

        assert!(pm.contains_page(&PageUid::new(key.clone(), 0)));
        assert!(!pm.contains_page(&PageUid::new(key.clone(), 1)));
        assert!(pm.contains_page(&PageUid::new(key.clone(), 2)));
    }

    #[test]
    fn test_release_memory_out_of_memory() {
        let pm = manager(8 * MB);
        let header = TableHeader::new("mem", schema(), TableKind::Heap, MB, 10).unwrap();
        let key = pm.create_table(header, Residency::Dream).unwrap();
        for v in 0..7 {
            push_new(&pm, &key, v);
        }
        assert!(matches!(
            pm.release_memory(2 * MB),
            Err(StratumError::OutOfMemory { .. })
        ));
        let id = pm.allocate_page_id(&key).unwrap();
        let page = Page::new(id, None, None, MB, 1, 10);
        assert!(matches!(
            pm.push_page(&key, page, true),
            Err(StratumError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_close_and_reopen() {
        let dir = tempdir().unwrap();
        let path;
        {
            let pm = manager(8 * MB);
            let header = scribe_header(&dir, "persist", 4096);
            path = header.path();
            let key = pm.create_table(header, Residency::Scribe).unwrap();
            push_new(&pm, &key, 11);
            push_new(&pm, &key, 22);
            pm.update_header(&key, |h| h.record_count = 2).unwrap();
            pm.close_table(&key).unwrap();
            assert!(!pm.contains_table(&key));
        }

        let pm = manager(8 * MB);
        let key = pm.open_table(&path).unwrap();
        let header = pm.header(&key).unwrap();
        assert_eq!(header.page_count, 2);
        assert_eq!(header.record_count, 2);
        let page = pm.request_page(&PageUid::new(key.clone(), 1)).unwrap();
        assert_eq!(page.select(0).unwrap(), &record![22i64]);
        assert!(matches!(
            pm.open_table(&path),
            Err(StratumError::ElementExists(_))
        ));
    }

    #[test]
    fn test_burn_page_flush() {
        let dir = tempdir().unwrap();
        let pm = manager(8 * MB);
        let key = pm
            .create_table(scribe_header(&dir, "burn", 4096), Residency::Scribe)
            .unwrap();
        let id = push_new(&pm, &key, 1);
        let uid = PageUid::new(key.clone(), id);

        pm.burn_page(&uid, true).unwrap();
        assert!(!pm.contains_page(&uid));
        assert_eq!(pm.request_page(&uid).unwrap().count(), 1);

        pm.burn_table(&key, false).unwrap();
        assert_eq!(pm.cached_pages(), 0);
    }

    /// A dirty page that cannot be serialized.
    fn push_unwritable(pm: &PageManager, key: &TableKey) -> PageUid {
        let header = pm.header(key).unwrap();
        let page_size = header.page_size as usize;
        let id = pm.allocate_page_id(key).unwrap();
        let mut page = Page::new(id, None, None, page_size, 1, 10);
        page.insert(Record::new(vec![Cell::Blob(vec![0; 2 * page_size])]))
            .unwrap();
        pm.push_page(key, page, true).unwrap();
        PageUid::new(key.clone(), id)
    }

    #[test]
    fn test_failed_eviction_keeps_page() {
        let dir = tempdir().unwrap();
        let pm = manager(8 * MB);
        let key = pm
            .create_table(scribe_header(&dir, "stuck", MB), Residency::Scribe)
            .unwrap();
        let stuck = push_unwritable(&pm, &key);
        for v in 1..7 {
            push_new(&pm, &key, v);
        }

        let id = pm.allocate_page_id(&key).unwrap();
        let page = Page::new(id, None, None, MB, 1, 10);
        assert!(matches!(
            pm.push_page(&key, page, true),
            Err(StratumError::PageOverflow { .. })
        ));
        assert_eq!(pm.stats().evictions, 0);
        assert!(pm.contains_page(&stuck));
        assert_eq!(pm.request_page(&stuck).unwrap().count(), 1);

        // once the page is fixed the same eviction goes through
        let mut fixed = Page::new(stuck.page_id, None, None, MB, 1, 10);
        fixed.insert(record![0i64]).unwrap();
        pm.push_page(&key, fixed, true).unwrap();
        pm.push_page(&key, Page::new(id, None, None, MB, 1, 10), true)
            .unwrap();
        assert_eq!(pm.stats().evictions, 1);
        assert!(pm.used_bytes() <= pm.budget());
    }

    #[test]
    fn test_failed_burn_keeps_page() {
        let dir = tempdir().unwrap();
        let pm = manager(8 * MB);
        let key = pm
            .create_table(scribe_header(&dir, "ash", 4096), Residency::Scribe)
            .unwrap();
        let uid = push_unwritable(&pm, &key);
        let used = pm.used_bytes();

        assert!(pm.burn_page(&uid, true).is_err());
        assert!(pm.contains_page(&uid));
        assert_eq!(pm.used_bytes(), used);
        assert_eq!(pm.request_page(&uid).unwrap().count(), 1);

        pm.burn_page(&uid, false).unwrap();
        assert!(!pm.contains_page(&uid));
    }

    #[test]
    fn test_drop_table_deletes_file() {
        let dir = tempdir().unwrap();
        let pm = manager(8 * MB);
        let header = scribe_header(&dir, "gone", 4096);
        let path = header.path();
        let key = pm.create_table(header, Residency::Scribe).unwrap();
        push_new(&pm, &key, 1);
        pm.drop_table(&key).unwrap();
        assert!(!path.exists());
        assert!(matches!(
            pm.drop_table(&key),
            Err(StratumError::ElementDoesNotExist(_))
        ));
    }

    #[test]
    fn test_shutdown_flushes() {
        let dir = tempdir().unwrap();
        let path;
        {
            let pm = manager(8 * MB);
            let header = scribe_header(&dir, "shut", 4096);
            path = header.path();
            let key = pm.create_table(header, Residency::Scribe).unwrap();
            push_new(&pm, &key, 3);
            pm.shutdown().unwrap();
            assert_eq!(pm.used_bytes(), 0);
            assert!(!pm.contains_table(&key));
        }
        let pm = manager(8 * MB);
        let key = pm.open_table(&path).unwrap();
        let page = pm.request_page(&PageUid::new(key, 0)).unwrap();
        assert_eq!(page.select(0).unwrap(), &record![3i64]);
    }

    #[test]
    fn test_hit_rate() {
        let pm = manager(8 * MB);
        let header = TableHeader::new("h", schema(), TableKind::Heap, 4096, 10).unwrap();
        let dir = tempdir().unwrap();
        let key = pm
            .create_table(header.with_location(dir.path().to_string_lossy(), "strat"), Residency::Scribe)
            .unwrap();
        let id = push_new(&pm, &key, 1);
        for _ in 0..3 {
            pm.request_page(&PageUid::new(key.clone(), id)).unwrap();
        }
        let stats = pm.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 1.0);
    }
}
