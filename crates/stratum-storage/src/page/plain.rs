//! Plain page: a fixed-size container of records in insertion order.

use super::codec::{read_record, write_record};
use super::constants::*;
use super::header::{PageHeader, PageKind};
use bytes::BytesMut;
use stratum_common::error::corrupt_page;
use stratum_common::{Record, Result, StratumError};

/// A page of records plus its header.
///
/// The record count in the header is derived from the record list when the
/// page is serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    header: PageHeader,
    records: Vec<Record>,
}

impl Page {
    /// Creates an empty plain page.
    pub fn new(
        page_id: u32,
        last_page_id: Option<u32>,
        next_page_id: Option<u32>,
        page_size: usize,
        field_count: usize,
        data_disk_cost: usize,
    ) -> Self {
        let mut header = PageHeader::new(
            page_id,
            page_size as u32,
            field_count as u32,
            data_disk_cost as u32,
        );
        header.last_page_id = last_page_id;
        header.next_page_id = next_page_id;
        Self {
            header,
            records: Vec::new(),
        }
    }

    /// Returns the header.
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn page_id(&self) -> u32 {
        self.header.page_id
    }

    pub fn last_page_id(&self) -> Option<u32> {
        self.header.last_page_id
    }

    pub fn next_page_id(&self) -> Option<u32> {
        self.header.next_page_id
    }

    pub fn set_last_page_id(&mut self, page_id: Option<u32>) {
        debug_assert!(page_id != Some(self.header.page_id));
        self.header.last_page_id = page_id;
    }

    pub fn set_next_page_id(&mut self, page_id: Option<u32>) {
        debug_assert!(page_id != Some(self.header.page_id));
        self.header.next_page_id = page_id;
    }

    pub fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    pub fn field_count(&self) -> usize {
        self.header.field_count as usize
    }

    pub fn data_disk_cost(&self) -> usize {
        self.header.data_disk_cost as usize
    }

    pub fn kind(&self) -> PageKind {
        self.header.kind
    }

    pub(crate) fn set_kind(&mut self, kind: PageKind) {
        self.header.kind = kind;
    }

    /// Reads extension slot `slot` (x0..x3).
    pub fn extension(&self, slot: usize) -> i32 {
        self.header.extension[slot]
    }

    /// Writes extension slot `slot` (x0..x3).
    pub fn set_extension(&mut self, slot: usize, value: i32) {
        self.header.extension[slot] = value;
    }

    /// Number of records.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.header.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity()
    }

    /// All records in page order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// First record, if any.
    pub fn origin(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Last record, if any.
    pub fn terminal(&self) -> Option<&Record> {
        self.records.last()
    }

    fn check_room(&self) -> Result<()> {
        if self.is_full() {
            return Err(StratumError::PageFull {
                page_id: self.header.page_id,
            });
        }
        Ok(())
    }

    fn check_row(&self, row_id: usize) -> Result<()> {
        if row_id >= self.records.len() {
            return Err(StratumError::OutOfRange {
                index: row_id,
                count: self.records.len(),
            });
        }
        Ok(())
    }

    /// Appends a record, returning its row id.
    pub fn insert(&mut self, record: Record) -> Result<usize> {
        self.check_room()?;
        debug_assert_eq!(record.len(), self.field_count());
        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    /// Inserts a record at `row_id`, shifting later records up.
    pub fn insert_at(&mut self, row_id: usize, record: Record) -> Result<()> {
        self.check_room()?;
        if row_id > self.records.len() {
            return Err(StratumError::OutOfRange {
                index: row_id,
                count: self.records.len(),
            });
        }
        debug_assert_eq!(record.len(), self.field_count());
        self.records.insert(row_id, record);
        Ok(())
    }

    /// Removes and returns the record at `row_id`.
    pub fn delete(&mut self, row_id: usize) -> Result<Record> {
        self.check_row(row_id)?;
        Ok(self.records.remove(row_id))
    }

    /// Replaces the record at `row_id`.
    pub fn update(&mut self, row_id: usize, record: Record) -> Result<()> {
        self.check_row(row_id)?;
        self.records[row_id] = record;
        Ok(())
    }

    /// Returns the record at `row_id`.
    pub fn select(&self, row_id: usize) -> Result<&Record> {
        self.check_row(row_id)?;
        Ok(&self.records[row_id])
    }

    /// Row id of the first record matching `predicate`.
    pub fn seek_first<F: Fn(&Record) -> bool>(&self, predicate: F) -> Option<usize> {
        self.records.iter().position(predicate)
    }

    /// Row id of the last record matching `predicate`.
    pub fn seek_last<F: Fn(&Record) -> bool>(&self, predicate: F) -> Option<usize> {
        self.records.iter().rposition(predicate)
    }

    /// Row ids of every record matching `predicate`.
    pub fn seek_all<F: Fn(&Record) -> bool>(&self, predicate: F) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| predicate(r))
            .map(|(i, _)| i)
            .collect()
    }

    /// Moves records `[pivot, count)` into a new page.
    ///
    /// The new page has the same kind, size, field count, disk cost and
    /// extension slots as this page, and the given id and links. This page's
    /// own links are left for the caller to rewire.
    pub fn split(
        &mut self,
        new_page_id: u32,
        last_page_id: Option<u32>,
        next_page_id: Option<u32>,
        pivot: usize,
    ) -> Result<Page> {
        let count = self.records.len();
        if count < 2 || pivot == 0 || pivot + 1 >= count {
            return Err(StratumError::InvalidSplit { count, pivot });
        }

        let mut header = self.header;
        header.page_id = new_page_id;
        header.last_page_id = last_page_id;
        header.next_page_id = next_page_id;
        header.record_count = 0;

        let moved = self.records.split_off(pivot);
        Ok(Page {
            header,
            records: moved,
        })
    }

    /// Serializes the page into exactly `page_size` bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let page_size = self.page_size();
        let mut buf = BytesMut::with_capacity(page_size);

        let mut header = self.header;
        header.record_count = self.records.len() as u32;
        buf.extend_from_slice(&header.to_bytes());
        for record in &self.records {
            write_record(&mut buf, record);
        }

        if buf.len() > page_size {
            return Err(StratumError::PageOverflow {
                size: buf.len(),
                page_size,
            });
        }
        buf.resize(page_size, 0);
        Ok(buf.to_vec())
    }

    /// Deserializes a page of any kind.
    pub fn from_bytes(buf: &[u8]) -> Result<Page> {
        let mut header = PageHeader::from_bytes(buf)?;
        let end = (header.page_size as usize).min(buf.len());
        let mut body = &buf[PAGE_HEADER_SIZE..end];

        let count = header.record_count as usize;
        // every cell takes at least its two tag bytes
        let min_record = 2 * (header.field_count as usize).max(1);
        if count > header.capacity() || count.saturating_mul(min_record) > body.len() {
            return Err(corrupt_page(format!(
                "page {} claims {} records",
                header.page_id, count
            )));
        }
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(read_record(&mut body, header.field_count as usize)?);
        }
        header.record_count = 0;
        Ok(Page { header, records })
    }
}
