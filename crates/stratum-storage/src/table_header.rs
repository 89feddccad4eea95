//! Table and index metadata headers.
//!
//! A table file begins with a 64 KB [`TableHeader`] region; pages follow at
//! `TableHeader::SIZE + page_id * page_size`. Offsets (little-endian):
//!
//! ```text
//! 0     hash key (0)
//! 8     name        (u32 length + up to 100 bytes)
//! 112   directory   (u32 length + up to 200 bytes)
//! 316   extension   (u32 length + up to 32 bytes)
//! 352   page count            356  record count (u64)
//! 364   column count          368  origin page id
//! 372   terminal page id      376  page size
//! 380   root page id
//! 384   sort key: count, is-primary, 16 x (column index, direction)
//! 520   radix page id         524  table kind
//! 528   record disk cost
//! 2048  columns, 36 bytes each:
//!       name length (1) + name (32) + affinity (1) + size (1) + nullable (1)
//! ```

use crate::layout::*;
use std::path::PathBuf;
use stratum_common::page::{decode_page_id, encode_page_id, is_valid_page_size};
use stratum_common::schema::{MAX_COLUMN_NAME, MAX_KEY_COLUMNS};
use stratum_common::{
    Affinity, Column, Key, Result, Schema, SortDirection, StratumError, TableKey,
};

const OFFSET_HASH_KEY: usize = 0;
const OFFSET_NAME: usize = 8;
const OFFSET_DIRECTORY: usize = 112;
const OFFSET_EXTENSION: usize = 316;
const OFFSET_PAGE_COUNT: usize = 352;
const OFFSET_RECORD_COUNT: usize = 356;
const OFFSET_COLUMN_COUNT: usize = 364;
const OFFSET_ORIGIN: usize = 368;
const OFFSET_TERMINAL: usize = 372;
const OFFSET_PAGE_SIZE: usize = 376;
const OFFSET_ROOT: usize = 380;
const OFFSET_SORT_KEY: usize = 384;
const OFFSET_RADIX: usize = 520;
const OFFSET_TABLE_KIND: usize = 524;
const OFFSET_DISK_COST: usize = 528;
const OFFSET_COLUMNS: usize = 2048;

const MAX_NAME: usize = 100;
const MAX_DIRECTORY: usize = 200;
const MAX_EXTENSION: usize = 32;
const COLUMN_SIZE: usize = 36;

/// Hash key stamped at offset 0 of a table header.
pub const TABLE_HASH_KEY: u32 = 0;

/// Organization of a table's pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TableKind {
    /// Append-only plain pages.
    Heap = 0,
    /// Sorted pages in a key-ordered chain.
    Sorted = 1,
    /// Clustered B+Tree.
    Tree = 2,
    /// Pages stored inside a parent table.
    Derived = 3,
    /// Secondary B+Tree index stored inside a parent table.
    Index = 4,
}

impl TableKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(TableKind::Heap),
            1 => Some(TableKind::Sorted),
            2 => Some(TableKind::Tree),
            3 => Some(TableKind::Derived),
            4 => Some(TableKind::Index),
            _ => None,
        }
    }
}

/// Persistent metadata of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader {
    pub name: String,
    pub directory: String,
    pub extension: String,
    /// Number of page ids handed out so far.
    pub page_count: u32,
    pub record_count: u64,
    pub origin_page_id: Option<u32>,
    pub terminal_page_id: Option<u32>,
    pub page_size: u32,
    pub root_page_id: Option<u32>,
    pub sort_key: Key,
    pub is_primary_key: bool,
    pub radix_page_id: Option<u32>,
    pub kind: TableKind,
    /// Bytes charged per record, including any per-page record cap.
    pub record_disk_cost: u32,
    pub schema: Schema,
}

impl TableHeader {
    /// Size of the header region in bytes.
    pub const SIZE: usize = 64 * 1024;

    /// Maximum number of columns that fit in the header.
    pub const MAX_COLUMNS: usize = (Self::SIZE - OFFSET_COLUMNS) / COLUMN_SIZE;

    /// Creates a header for an empty table.
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        kind: TableKind,
        page_size: usize,
        record_disk_cost: usize,
    ) -> Result<Self> {
        let header = Self {
            name: name.into(),
            directory: String::new(),
            extension: String::new(),
            page_count: 0,
            record_count: 0,
            origin_page_id: None,
            terminal_page_id: None,
            page_size: page_size as u32,
            root_page_id: None,
            sort_key: Key::default(),
            is_primary_key: false,
            radix_page_id: None,
            kind,
            record_disk_cost: record_disk_cost as u32,
            schema,
        };
        header.validate()?;
        Ok(header)
    }

    /// Sets the on-disk location; only meaningful for disk-backed tables.
    pub fn with_location(mut self, directory: impl Into<String>, extension: impl Into<String>) -> Self {
        self.directory = directory.into();
        self.extension = extension.into();
        self
    }

    /// Sets the sort key.
    pub fn with_sort_key(mut self, key: Key, is_primary: bool) -> Self {
        self.sort_key = key;
        self.is_primary_key = is_primary;
        self
    }

    /// Cache identity of the table.
    pub fn key(&self) -> TableKey {
        TableKey::new(&self.name)
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(format!("{}.{}", self.name, self.extension))
    }

    /// Byte offset of `page_id` in the table file.
    pub fn page_offset(&self, page_id: u32) -> u64 {
        Self::SIZE as u64 + page_id as u64 * self.page_size as u64
    }

    /// Hands out the next page id.
    pub fn allocate_page_id(&mut self) -> u32 {
        let id = self.page_count;
        self.page_count += 1;
        id
    }

    /// Checks the fields the binary layout constrains.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > MAX_NAME || !self.name.is_ascii() {
            return Err(StratumError::ConfigError(format!(
                "invalid table name '{}'",
                self.name
            )));
        }
        if self.directory.len() > MAX_DIRECTORY || self.extension.len() > MAX_EXTENSION {
            return Err(StratumError::ConfigError(format!(
                "location of table '{}' is too long",
                self.name
            )));
        }
        if !is_valid_page_size(self.page_size as usize) {
            return Err(StratumError::ConfigError(format!(
                "page size {} is not a positive multiple of 4096",
                self.page_size
            )));
        }
        if self.schema.len() > Self::MAX_COLUMNS {
            return Err(StratumError::ConfigError(format!(
                "{} columns exceed the header limit of {}",
                self.schema.len(),
                Self::MAX_COLUMNS
            )));
        }
        if self.record_disk_cost == 0 {
            return Err(StratumError::ConfigError(
                "record disk cost must be positive".to_string(),
            ));
        }
        self.sort_key.validate(&self.schema)
    }

    /// Serializes the header into its 64 KB region.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut buf = vec![0u8; Self::SIZE];
        put_u32(&mut buf, OFFSET_HASH_KEY, TABLE_HASH_KEY);
        put_str(&mut buf, OFFSET_NAME, &self.name, MAX_NAME)?;
        put_str(&mut buf, OFFSET_DIRECTORY, &self.directory, MAX_DIRECTORY)?;
        put_str(&mut buf, OFFSET_EXTENSION, &self.extension, MAX_EXTENSION)?;
        put_u32(&mut buf, OFFSET_PAGE_COUNT, self.page_count);
        put_u64(&mut buf, OFFSET_RECORD_COUNT, self.record_count);
        put_u32(&mut buf, OFFSET_COLUMN_COUNT, self.schema.len() as u32);
        put_i32(&mut buf, OFFSET_ORIGIN, encode_page_id(self.origin_page_id));
        put_i32(&mut buf, OFFSET_TERMINAL, encode_page_id(self.terminal_page_id));
        put_u32(&mut buf, OFFSET_PAGE_SIZE, self.page_size);
        put_i32(&mut buf, OFFSET_ROOT, encode_page_id(self.root_page_id));
        write_key(&mut buf, OFFSET_SORT_KEY, &self.sort_key, self.is_primary_key);
        put_i32(&mut buf, OFFSET_RADIX, encode_page_id(self.radix_page_id));
        put_u32(&mut buf, OFFSET_TABLE_KIND, self.kind as u32);
        put_u32(&mut buf, OFFSET_DISK_COST, self.record_disk_cost);

        for (i, column) in self.schema.columns().iter().enumerate() {
            let offset = OFFSET_COLUMNS + i * COLUMN_SIZE;
            let name = column.name.as_bytes();
            buf[offset] = name.len() as u8;
            buf[offset + 1..offset + 1 + name.len()].copy_from_slice(name);
            buf[offset + 1 + MAX_COLUMN_NAME] = column.affinity.tag();
            buf[offset + 2 + MAX_COLUMN_NAME] = column.size;
            buf[offset + 3 + MAX_COLUMN_NAME] = column.nullable as u8;
        }
        Ok(buf)
    }

    /// Deserializes a header region.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(corrupt(format!(
                "header region of {} bytes is shorter than {}",
                buf.len(),
                Self::SIZE
            )));
        }
        let hash = get_u32(buf, OFFSET_HASH_KEY);
        if hash != TABLE_HASH_KEY {
            return Err(corrupt(format!("bad hash key {}", hash)));
        }

        let column_count = get_u32(buf, OFFSET_COLUMN_COUNT) as usize;
        if column_count > Self::MAX_COLUMNS {
            return Err(corrupt(format!("column count {}", column_count)));
        }
        let mut columns = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let offset = OFFSET_COLUMNS + i * COLUMN_SIZE;
            let len = buf[offset] as usize;
            if len > MAX_COLUMN_NAME {
                return Err(corrupt(format!("column {} name length {}", i, len)));
            }
            let name = String::from_utf8(buf[offset + 1..offset + 1 + len].to_vec())
                .map_err(|_| corrupt(format!("column {} name is not text", i)))?;
            let tag = buf[offset + 1 + MAX_COLUMN_NAME];
            let affinity = Affinity::from_tag(tag)
                .ok_or_else(|| corrupt(format!("column {} has type tag {}", i, tag)))?;
            columns.push(Column {
                name,
                affinity,
                size: buf[offset + 2 + MAX_COLUMN_NAME],
                nullable: buf[offset + 3 + MAX_COLUMN_NAME] != 0,
            });
        }
        let schema = Schema::new(columns).map_err(|e| corrupt(e.to_string()))?;

        let (sort_key, is_primary_key) = read_key(buf, OFFSET_SORT_KEY)?;
        let raw_kind = get_u32(buf, OFFSET_TABLE_KIND);
        let kind = TableKind::from_raw(raw_kind)
            .ok_or_else(|| corrupt(format!("unknown table kind {}", raw_kind)))?;

        let header = Self {
            name: get_str(buf, OFFSET_NAME, MAX_NAME)?,
            directory: get_str(buf, OFFSET_DIRECTORY, MAX_DIRECTORY)?,
            extension: get_str(buf, OFFSET_EXTENSION, MAX_EXTENSION)?,
            page_count: get_u32(buf, OFFSET_PAGE_COUNT),
            record_count: get_u64(buf, OFFSET_RECORD_COUNT),
            origin_page_id: decode_page_id(get_i32(buf, OFFSET_ORIGIN)),
            terminal_page_id: decode_page_id(get_i32(buf, OFFSET_TERMINAL)),
            page_size: get_u32(buf, OFFSET_PAGE_SIZE),
            root_page_id: decode_page_id(get_i32(buf, OFFSET_ROOT)),
            sort_key,
            is_primary_key,
            radix_page_id: decode_page_id(get_i32(buf, OFFSET_RADIX)),
            kind,
            record_disk_cost: get_u32(buf, OFFSET_DISK_COST),
            schema,
        };
        header.validate().map_err(|e| corrupt(e.to_string()))?;
        Ok(header)
    }
}

/// Persistent metadata of a table whose pages live inside a parent table.
///
/// Layout (512 bytes, little-endian):
///
/// ```text
/// 0    hash key (2)
/// 4    name    (u32 length + up to 100 bytes)
/// 108  parent  (u32 length + up to 100 bytes)
/// 212  origin page id      216  terminal page id
/// 220  root page id        224  record count (u64)
/// 232  page count          236  unique flag
/// 240  key: count, unused, 16 x (column index, direction)
/// 376  record disk cost    380  field count
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHeader {
    pub name: String,
    /// Name of the table holding the pages.
    pub parent: String,
    pub origin_page_id: Option<u32>,
    pub terminal_page_id: Option<u32>,
    pub root_page_id: Option<u32>,
    pub record_count: u64,
    /// Pages allocated to this table inside the parent.
    pub page_count: u32,
    pub is_unique: bool,
    /// Key columns, indexing the parent schema.
    pub key: Key,
    pub record_disk_cost: u32,
    pub field_count: u32,
}

const INDEX_OFFSET_NAME: usize = 4;
const INDEX_OFFSET_PARENT: usize = 108;
const INDEX_OFFSET_ORIGIN: usize = 212;
const INDEX_OFFSET_TERMINAL: usize = 216;
const INDEX_OFFSET_ROOT: usize = 220;
const INDEX_OFFSET_RECORD_COUNT: usize = 224;
const INDEX_OFFSET_PAGE_COUNT: usize = 232;
const INDEX_OFFSET_UNIQUE: usize = 236;
const INDEX_OFFSET_KEY: usize = 240;
const INDEX_OFFSET_DISK_COST: usize = 376;
const INDEX_OFFSET_FIELD_COUNT: usize = 380;

/// Hash key stamped at offset 0 of an index header.
pub const INDEX_HASH_KEY: u32 = 2;

impl IndexHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 512;

    /// Creates a header for an empty derived table.
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        key: Key,
        field_count: usize,
        record_disk_cost: usize,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            origin_page_id: None,
            terminal_page_id: None,
            root_page_id: None,
            record_count: 0,
            page_count: 0,
            is_unique: false,
            key,
            record_disk_cost: record_disk_cost as u32,
            field_count: field_count as u32,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; Self::SIZE];
        put_u32(&mut buf, 0, INDEX_HASH_KEY);
        put_str(&mut buf, INDEX_OFFSET_NAME, &self.name, MAX_NAME)?;
        put_str(&mut buf, INDEX_OFFSET_PARENT, &self.parent, MAX_NAME)?;
        put_i32(&mut buf, INDEX_OFFSET_ORIGIN, encode_page_id(self.origin_page_id));
        put_i32(&mut buf, INDEX_OFFSET_TERMINAL, encode_page_id(self.terminal_page_id));
        put_i32(&mut buf, INDEX_OFFSET_ROOT, encode_page_id(self.root_page_id));
        put_u64(&mut buf, INDEX_OFFSET_RECORD_COUNT, self.record_count);
        put_u32(&mut buf, INDEX_OFFSET_PAGE_COUNT, self.page_count);
        put_u32(&mut buf, INDEX_OFFSET_UNIQUE, self.is_unique as u32);
        write_key(&mut buf, INDEX_OFFSET_KEY, &self.key, false);
        put_u32(&mut buf, INDEX_OFFSET_DISK_COST, self.record_disk_cost);
        put_u32(&mut buf, INDEX_OFFSET_FIELD_COUNT, self.field_count);
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(corrupt(format!("index header of {} bytes", buf.len())));
        }
        let hash = get_u32(buf, 0);
        if hash != INDEX_HASH_KEY {
            return Err(corrupt(format!("bad index hash key {}", hash)));
        }
        let (key, _) = read_key(buf, INDEX_OFFSET_KEY)?;
        Ok(Self {
            name: get_str(buf, INDEX_OFFSET_NAME, MAX_NAME)?,
            parent: get_str(buf, INDEX_OFFSET_PARENT, MAX_NAME)?,
            origin_page_id: decode_page_id(get_i32(buf, INDEX_OFFSET_ORIGIN)),
            terminal_page_id: decode_page_id(get_i32(buf, INDEX_OFFSET_TERMINAL)),
            root_page_id: decode_page_id(get_i32(buf, INDEX_OFFSET_ROOT)),
            record_count: get_u64(buf, INDEX_OFFSET_RECORD_COUNT),
            page_count: get_u32(buf, INDEX_OFFSET_PAGE_COUNT),
            is_unique: get_u32(buf, INDEX_OFFSET_UNIQUE) != 0,
            key,
            record_disk_cost: get_u32(buf, INDEX_OFFSET_DISK_COST),
            field_count: get_u32(buf, INDEX_OFFSET_FIELD_COUNT),
        })
    }
}

fn write_key(buf: &mut [u8], offset: usize, key: &Key, is_primary: bool) {
    put_u32(buf, offset, key.len() as u32);
    put_u32(buf, offset + 4, is_primary as u32);
    for (i, &(column, direction)) in key.columns().iter().enumerate() {
        let at = offset + 8 + i * 8;
        put_u32(buf, at, column as u32);
        put_u32(buf, at + 4, direction as u32);
    }
}

fn read_key(buf: &[u8], offset: usize) -> Result<(Key, bool)> {
    let count = get_u32(buf, offset) as usize;
    if count > MAX_KEY_COLUMNS {
        return Err(corrupt(format!("sort key of {} columns", count)));
    }
    let is_primary = get_u32(buf, offset + 4) != 0;
    let mut columns = Vec::with_capacity(count);
    for i in 0..count {
        let at = offset + 8 + i * 8;
        let raw = get_u32(buf, at + 4);
        let direction = SortDirection::from_raw(raw)
            .ok_or_else(|| corrupt(format!("sort direction {}", raw)))?;
        columns.push((get_u32(buf, at) as usize, direction));
    }
    Ok((Key::new(columns)?, is_primary))
}

fn corrupt(reason: impl Into<String>) -> StratumError {
    StratumError::CorruptHeader {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", Affinity::Int, 0).not_null(),
            Column::new("name", Affinity::String, 24),
            Column::new("blob", Affinity::Blob, 200),
        ])
        .unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let mut header = TableHeader::new("Orders", schema(), TableKind::Tree, 8192, 120)
            .unwrap()
            .with_location("/tmp/db", "strat")
            .with_sort_key(
                Key::new(vec![(0, SortDirection::Ascending), (1, SortDirection::Descending)])
                    .unwrap(),
                true,
            );
        header.page_count = 12;
        header.record_count = 1 << 40;
        header.origin_page_id = Some(0);
        header.terminal_page_id = Some(11);
        header.root_page_id = Some(5);

        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), TableHeader::SIZE);
        assert_eq!(&bytes[352..356], &12u32.to_le_bytes());
        assert_eq!(&bytes[520..524], &(-1i32).to_le_bytes());
        assert_eq!(bytes[2048], 2);
        assert_eq!(&bytes[2049..2051], b"id");

        let decoded = TableHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.key(), TableKey::new("orders"));
        assert_eq!(decoded.path(), PathBuf::from("/tmp/db/Orders.strat"));
    }

    #[test]
    fn test_page_offsets() {
        let mut header = TableHeader::new("t", schema(), TableKind::Heap, 4096, 300).unwrap();
        assert_eq!(header.page_offset(0), 65536);
        assert_eq!(header.page_offset(3), 65536 + 3 * 4096);
        assert_eq!(header.allocate_page_id(), 0);
        assert_eq!(header.allocate_page_id(), 1);
        assert_eq!(header.page_count, 2);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(TableHeader::new("x".repeat(101), schema(), TableKind::Heap, 4096, 1).is_err());
        assert!(TableHeader::new("t", schema(), TableKind::Heap, 1000, 1).is_err());

        let mut bytes = TableHeader::new("t", schema(), TableKind::Heap, 4096, 300)
            .unwrap()
            .to_bytes()
            .unwrap();
        bytes[0] = 1;
        assert!(matches!(
            TableHeader::from_bytes(&bytes),
            Err(StratumError::CorruptHeader { .. })
        ));
    }

    #[test]
    fn test_index_header_roundtrip() {
        let mut header = IndexHeader::new("orders_by_name", "orders", Key::ascending(&[1]).unwrap(), 3, 70);
        header.is_unique = true;
        header.root_page_id = Some(4);
        header.record_count = 99;
        header.page_count = 6;

        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), IndexHeader::SIZE);
        assert_eq!(IndexHeader::from_bytes(&bytes).unwrap(), header);
    }
}
