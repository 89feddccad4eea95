//! Page header and page kinds.
//!
//! Layout (64 bytes, little-endian):
//! ```text
//! 0   hash key (always 1)     4   page id
//! 8   last page id (-1)       12  next page id (-1)
//! 16  page size               20  field count
//! 24  record count            28  checksum (unused, 0)
//! 32  page type               36  record disk cost
//! 40  x0 .. x3                56  reserved
//! ```

use super::constants::*;
use crate::layout::{get_i32, get_u32, put_i32, put_u32};
use stratum_common::error::corrupt_page;
use stratum_common::page::{decode_page_id, encode_page_id, is_valid_page_size};
use stratum_common::Result;

/// Kind of a page, stored in the page type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PageKind {
    /// Records in insertion order.
    Plain = 0,
    /// Records in comparator order.
    Sorted = 1,
    /// B+Tree leaf or branch node.
    BPlusTree = 2,
}

impl PageKind {
    /// Decodes the page type field.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(PageKind::Plain),
            1 => Some(PageKind::Sorted),
            2 => Some(PageKind::BPlusTree),
            _ => None,
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageKind::Plain => f.write_str("plain"),
            PageKind::Sorted => f.write_str("sorted"),
            PageKind::BPlusTree => f.write_str("b+tree"),
        }
    }
}

/// Fixed page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Slot of this page within its table.
    pub page_id: u32,
    /// Previous page in the table chain.
    pub last_page_id: Option<u32>,
    /// Next page in the table chain.
    pub next_page_id: Option<u32>,
    /// Page size in bytes.
    pub page_size: u32,
    /// Cells per record.
    pub field_count: u32,
    /// Number of records; maintained by the owning page on serialization.
    pub record_count: u32,
    /// Page kind.
    pub kind: PageKind,
    /// Bytes charged per record when computing capacity.
    pub data_disk_cost: u32,
    /// Kind-specific extension slots.
    pub extension: [i32; EXTENSION_SLOTS],
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = PAGE_HEADER_SIZE;

    /// Creates a header with no links and zeroed extension slots.
    pub fn new(page_id: u32, page_size: u32, field_count: u32, data_disk_cost: u32) -> Self {
        Self {
            page_id,
            last_page_id: None,
            next_page_id: None,
            page_size,
            field_count,
            record_count: 0,
            kind: PageKind::Plain,
            data_disk_cost,
            extension: [0; EXTENSION_SLOTS],
        }
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        put_u32(&mut buf, OFFSET_HASH_KEY, PAGE_HASH_KEY);
        put_u32(&mut buf, OFFSET_PAGE_ID, self.page_id);
        put_i32(&mut buf, OFFSET_LAST_PAGE_ID, encode_page_id(self.last_page_id));
        put_i32(&mut buf, OFFSET_NEXT_PAGE_ID, encode_page_id(self.next_page_id));
        put_u32(&mut buf, OFFSET_PAGE_SIZE, self.page_size);
        put_u32(&mut buf, OFFSET_FIELD_COUNT, self.field_count);
        put_u32(&mut buf, OFFSET_RECORD_COUNT, self.record_count);
        put_u32(&mut buf, OFFSET_CHECKSUM, 0);
        put_u32(&mut buf, OFFSET_PAGE_TYPE, self.kind as u32);
        put_u32(&mut buf, OFFSET_DATA_DISK_COST, self.data_disk_cost);
        for (i, x) in self.extension.iter().enumerate() {
            put_i32(&mut buf, OFFSET_EXTENSION + i * 4, *x);
        }
        buf
    }

    /// Deserializes and validates a header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < PAGE_HEADER_SIZE {
            return Err(corrupt_page(format!(
                "buffer of {} bytes is shorter than the page header",
                buf.len()
            )));
        }
        let hash = get_u32(buf, OFFSET_HASH_KEY);
        if hash != PAGE_HASH_KEY {
            return Err(corrupt_page(format!("bad hash key {}", hash)));
        }
        let raw_kind = get_u32(buf, OFFSET_PAGE_TYPE);
        let kind = PageKind::from_raw(raw_kind)
            .ok_or_else(|| corrupt_page(format!("unknown page type {}", raw_kind)))?;
        let page_size = get_u32(buf, OFFSET_PAGE_SIZE);
        if !is_valid_page_size(page_size as usize) {
            return Err(corrupt_page(format!("invalid page size {}", page_size)));
        }
        let data_disk_cost = get_u32(buf, OFFSET_DATA_DISK_COST);
        if data_disk_cost == 0 {
            return Err(corrupt_page("zero record disk cost"));
        }

        let mut extension = [0i32; EXTENSION_SLOTS];
        for (i, x) in extension.iter_mut().enumerate() {
            *x = get_i32(buf, OFFSET_EXTENSION + i * 4);
        }

        Ok(Self {
            page_id: get_u32(buf, OFFSET_PAGE_ID),
            last_page_id: decode_page_id(get_i32(buf, OFFSET_LAST_PAGE_ID)),
            next_page_id: decode_page_id(get_i32(buf, OFFSET_NEXT_PAGE_ID)),
            page_size,
            field_count: get_u32(buf, OFFSET_FIELD_COUNT),
            record_count: get_u32(buf, OFFSET_RECORD_COUNT),
            kind,
            data_disk_cost,
            extension,
        })
    }

    /// Maximum number of records the page holds.
    pub fn capacity(&self) -> usize {
        payload_size(self.page_size as usize) / self.data_disk_cost.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_common::StratumError;

    #[test]
    fn test_header_roundtrip() {
        let mut header = PageHeader::new(7, 4096, 3, 40);
        header.last_page_id = Some(6);
        header.record_count = 12;
        header.kind = PageKind::BPlusTree;
        header.extension = [5, 1, 0, -1];

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &(-1i32).to_le_bytes());

        let decoded = PageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_rejects_bad_hash() {
        let mut bytes = PageHeader::new(0, 4096, 1, 10).to_bytes();
        bytes[0] = 0;
        assert!(matches!(
            PageHeader::from_bytes(&bytes),
            Err(StratumError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let mut bytes = PageHeader::new(0, 4096, 1, 10).to_bytes();
        bytes[OFFSET_PAGE_TYPE] = 9;
        assert!(PageHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_capacity() {
        let header = PageHeader::new(0, 4096, 1, 10);
        assert_eq!(header.capacity(), (4096 - 64) / 10);
    }
}
