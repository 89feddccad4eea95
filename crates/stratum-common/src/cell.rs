//! Typed cell values.

use crate::types::Affinity;
use std::cmp::Ordering;

/// A single typed value inside a record.
///
/// Nulls keep their affinity so that a serialized null still carries the
/// column's type tag.
#[derive(Debug, Clone)]
pub enum Cell {
    Null(Affinity),
    Bool(bool),
    Int(i64),
    Double(f64),
    /// Ticks since the epoch.
    DateTime(i64),
    String(String),
    Blob(Vec<u8>),
}

impl Cell {
    /// Returns the cell's type.
    pub fn affinity(&self) -> Affinity {
        match self {
            Cell::Null(affinity) => *affinity,
            Cell::Bool(_) => Affinity::Bool,
            Cell::Int(_) => Affinity::Int,
            Cell::Double(_) => Affinity::Double,
            Cell::DateTime(_) => Affinity::DateTime,
            Cell::String(_) => Affinity::String,
            Cell::Blob(_) => Affinity::Blob,
        }
    }

    /// Returns true if the cell is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null(_))
    }

    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the double payload, widening integers.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Cell::Double(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(v) => Some(v),
            _ => None,
        }
    }

    /// Largest value representable for a column of this type and size.
    ///
    /// Strings use U+FFFF, the largest single UTF-16 code unit, so the
    /// sentinel never exceeds the column's declared disk cost.
    pub fn max_value(affinity: Affinity, size: usize) -> Cell {
        match affinity {
            Affinity::Bool => Cell::Bool(true),
            Affinity::Int => Cell::Int(i64::MAX),
            Affinity::Double => Cell::Double(f64::INFINITY),
            Affinity::DateTime => Cell::DateTime(i64::MAX),
            Affinity::String => Cell::String("\u{FFFF}".repeat(size)),
            Affinity::Blob => Cell::Blob(vec![0xFF; size]),
        }
    }

    /// Serialized size of this cell in bytes.
    pub fn disk_size(&self) -> usize {
        2 + match self {
            Cell::Null(_) => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Double(_) | Cell::DateTime(_) => 8,
            Cell::String(s) => 4 + 2 * s.encode_utf16().count(),
            Cell::Blob(b) => 4 + b.len(),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Null(_), Cell::Null(_)) => Ordering::Equal,
            (Cell::Null(_), _) => Ordering::Less,
            (_, Cell::Null(_)) => Ordering::Greater,
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Double(a), Cell::Double(b)) => a.total_cmp(b),
            (Cell::Int(a), Cell::Double(b)) => (*a as f64).total_cmp(b),
            (Cell::Double(a), Cell::Int(b)) => a.total_cmp(&(*b as f64)),
            (Cell::DateTime(a), Cell::DateTime(b)) => a.cmp(b),
            (Cell::String(a), Cell::String(b)) => a.cmp(b),
            (Cell::Blob(a), Cell::Blob(b)) => a.cmp(b),
            (a, b) => a.affinity().cmp(&b.affinity()),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null(_) => f.write_str("NULL"),
            Cell::Bool(v) => write!(f, "{}", v),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Double(v) => write!(f, "{}", v),
            Cell::DateTime(v) => write!(f, "@{}", v),
            Cell::String(v) => write!(f, "'{}'", v),
            Cell::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Double(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(value: Vec<u8>) -> Self {
        Cell::Blob(value)
    }
}
