//! Page layout constants.

/// Size of the page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 64;

/// Hash key stamped at offset 0 of every page.
pub const PAGE_HASH_KEY: u32 = 1;

/// Number of generic extension slots in the page header.
pub const EXTENSION_SLOTS: usize = 4;

/// Header field offsets.
pub const OFFSET_HASH_KEY: usize = 0;
pub const OFFSET_PAGE_ID: usize = 4;
pub const OFFSET_LAST_PAGE_ID: usize = 8;
pub const OFFSET_NEXT_PAGE_ID: usize = 12;
pub const OFFSET_PAGE_SIZE: usize = 16;
pub const OFFSET_FIELD_COUNT: usize = 20;
pub const OFFSET_RECORD_COUNT: usize = 24;
pub const OFFSET_CHECKSUM: usize = 28;
pub const OFFSET_PAGE_TYPE: usize = 32;
pub const OFFSET_DATA_DISK_COST: usize = 36;
pub const OFFSET_EXTENSION: usize = 40;

/// Extension slot holding a tree node's parent page id.
pub const SLOT_PARENT: usize = 0;
/// Extension slot holding the leaf flag.
pub const SLOT_IS_LEAF: usize = 1;
/// Extension slot holding the highest-sibling flag.
pub const SLOT_IS_HIGHEST: usize = 2;

/// Bytes available for records in a page of `page_size` bytes.
#[inline]
pub fn payload_size(page_size: usize) -> usize {
    page_size.saturating_sub(PAGE_HEADER_SIZE)
}

/// Per-record disk cost used for capacity, folding in an optional record cap.
///
/// A cap of `n` raises the cost to `ceil(payload / n)`, so the page never
/// holds more than `n` records while the cost still round-trips on disk.
pub fn record_disk_cost(schema_cost: usize, page_size: usize, max_records: Option<usize>) -> usize {
    let schema_cost = schema_cost.max(1);
    match max_records {
        Some(limit) if limit > 0 => schema_cost.max(payload_size(page_size).div_ceil(limit)),
        _ => schema_cost,
    }
}
