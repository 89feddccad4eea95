//! Page and table identities for Stratum storage.

use serde::{Deserialize, Serialize};

/// Default page size in bytes (64 KB).
pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

/// Page sizes must be a multiple of this many bytes.
pub const PAGE_SIZE_QUANTUM: usize = 4096;

/// On-disk encoding of "no page" in link fields.
pub const NULL_PAGE_ID: i32 = -1;

/// Encodes an optional page id into its on-disk form.
#[inline]
pub fn encode_page_id(page_id: Option<u32>) -> i32 {
    match page_id {
        Some(id) => id as i32,
        None => NULL_PAGE_ID,
    }
}

/// Decodes an on-disk page id; any negative value means "none".
#[inline]
pub fn decode_page_id(raw: i32) -> Option<u32> {
    if raw < 0 {
        None
    } else {
        Some(raw as u32)
    }
}

/// Returns true if `page_size` is a usable page size.
pub fn is_valid_page_size(page_size: usize) -> bool {
    page_size > 0 && page_size % PAGE_SIZE_QUANTUM == 0 && page_size <= i32::MAX as usize
}

/// Case-insensitive table identity used by the page cache.
///
/// The key is normalized to lower case on construction, so derived
/// equality and hashing are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey(String);

impl TableKey {
    /// Creates a key from a table name or path.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    /// Returns the normalized key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of a cached page: the owning table plus the page id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageUid {
    /// Owning table.
    pub table: TableKey,
    /// Page number within the table's page address space.
    pub page_id: u32,
}

impl PageUid {
    /// Creates a new PageUid.
    pub fn new(table: TableKey, page_id: u32) -> Self {
        Self { table, page_id }
    }
}

impl std::fmt::Display for PageUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table, self.page_id)
    }
}

/// Location of a record: page id plus row index within the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Page containing the record.
    pub page_id: u32,
    /// Row position within the page.
    pub row_id: u32,
}

impl RecordKey {
    /// Creates a new record key.
    pub fn new(page_id: u32, row_id: u32) -> Self {
        Self { page_id, row_id }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.page_id, self.row_id)
    }
}
