//! Record serialization.
//!
//! Each cell is written as a one-byte type tag and a one-byte null flag,
//! followed by the payload when non-null:
//! - BOOL: 1 byte
//! - INT, DOUBLE, DATE_TIME: 8 bytes little-endian
//! - STRING: 4-byte length in UTF-16 code units, then big-endian code units
//! - BLOB: 4-byte length in bytes, then the bytes

use bytes::{Buf, BufMut};
use stratum_common::error::corrupt_page;
use stratum_common::{Affinity, Cell, Record, Result};

/// Appends one record to `buf`.
pub fn write_record<B: BufMut>(buf: &mut B, record: &Record) {
    for cell in record.cells() {
        write_cell(buf, cell);
    }
}

/// Appends one cell to `buf`.
pub fn write_cell<B: BufMut>(buf: &mut B, cell: &Cell) {
    buf.put_u8(cell.affinity().tag());
    buf.put_u8(cell.is_null() as u8);
    match cell {
        Cell::Null(_) => {}
        Cell::Bool(v) => buf.put_u8(*v as u8),
        Cell::Int(v) | Cell::DateTime(v) => buf.put_i64_le(*v),
        Cell::Double(v) => buf.put_f64_le(*v),
        Cell::String(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            buf.put_i32_le(units.len() as i32);
            for unit in units {
                buf.put_u16(unit);
            }
        }
        Cell::Blob(b) => {
            buf.put_i32_le(b.len() as i32);
            buf.put_slice(b);
        }
    }
}

/// Reads one record of `field_count` cells from `buf`.
pub fn read_record<B: Buf>(buf: &mut B, field_count: usize) -> Result<Record> {
    let mut cells = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        cells.push(read_cell(buf)?);
    }
    Ok(Record::new(cells))
}

/// Reads one cell from `buf`.
pub fn read_cell<B: Buf>(buf: &mut B) -> Result<Cell> {
    ensure(buf, 2)?;
    let tag = buf.get_u8();
    let affinity =
        Affinity::from_tag(tag).ok_or_else(|| corrupt_page(format!("unknown type tag {}", tag)))?;
    if buf.get_u8() != 0 {
        return Ok(Cell::Null(affinity));
    }

    let cell = match affinity {
        Affinity::Bool => {
            ensure(buf, 1)?;
            Cell::Bool(buf.get_u8() != 0)
        }
        Affinity::Int => {
            ensure(buf, 8)?;
            Cell::Int(buf.get_i64_le())
        }
        Affinity::DateTime => {
            ensure(buf, 8)?;
            Cell::DateTime(buf.get_i64_le())
        }
        Affinity::Double => {
            ensure(buf, 8)?;
            Cell::Double(buf.get_f64_le())
        }
        Affinity::String => {
            let len = read_length(buf)?;
            ensure(buf, len * 2)?;
            let units: Vec<u16> = (0..len).map(|_| buf.get_u16()).collect();
            let text = String::from_utf16(&units)
                .map_err(|_| corrupt_page("string cell is not valid UTF-16"))?;
            Cell::String(text)
        }
        Affinity::Blob => {
            let len = read_length(buf)?;
            ensure(buf, len)?;
            let mut bytes = vec![0u8; len];
            buf.copy_to_slice(&mut bytes);
            Cell::Blob(bytes)
        }
    };
    Ok(cell)
}

fn read_length<B: Buf>(buf: &mut B) -> Result<usize> {
    ensure(buf, 4)?;
    let len = buf.get_i32_le();
    if len < 0 {
        return Err(corrupt_page(format!("negative cell length {}", len)));
    }
    Ok(len as usize)
}

#[inline]
fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(corrupt_page(format!(
            "record truncated: need {} bytes, {} remain",
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}
