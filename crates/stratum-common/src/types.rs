//! Type identifiers for Stratum cell values.

use serde::{Deserialize, Serialize};

/// Value type ("affinity") of a cell or column.
///
/// The discriminant is the one-byte type tag written in front of every
/// serialized cell and in column definitions of the table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Affinity {
    /// Boolean, 1 byte payload.
    Bool = 0,
    /// Signed 64-bit integer.
    Int = 1,
    /// IEEE-754 double.
    Double = 2,
    /// Timestamp stored as signed 64-bit ticks.
    DateTime = 3,
    /// Text stored as UTF-16 code units.
    String = 4,
    /// Opaque bytes.
    Blob = 5,
}

impl Affinity {
    /// Decodes a type tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Affinity::Bool),
            1 => Some(Affinity::Int),
            2 => Some(Affinity::Double),
            3 => Some(Affinity::DateTime),
            4 => Some(Affinity::String),
            5 => Some(Affinity::Blob),
            _ => None,
        }
    }

    /// Returns the type tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Returns the fixed payload size, or None for length-prefixed types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Affinity::Bool => Some(1),
            Affinity::Int | Affinity::Double | Affinity::DateTime => Some(8),
            Affinity::String | Affinity::Blob => None,
        }
    }

    /// Returns true for types whose payload carries a 4-byte length prefix.
    pub fn is_variable(self) -> bool {
        self.fixed_size().is_none()
    }

    /// Worst-case serialized size of one cell of this type, including the
    /// tag and null-flag bytes. `size` is the declared column size
    /// (characters for strings, bytes for blobs).
    pub fn disk_cost(self, size: usize) -> usize {
        2 + match self {
            Affinity::String => 4 + 2 * size,
            Affinity::Blob => 4 + size,
            fixed => fixed.fixed_size().unwrap_or(0),
        }
    }
}

impl std::fmt::Display for Affinity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Affinity::Bool => "BOOL",
            Affinity::Int => "INT",
            Affinity::Double => "DOUBLE",
            Affinity::DateTime => "DATE_TIME",
            Affinity::String => "STRING",
            Affinity::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// Direction of one column in a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum SortDirection {
    #[default]
    Ascending = 0,
    Descending = 1,
}

impl SortDirection {
    /// Decodes the on-disk enum value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SortDirection::Ascending),
            1 => Some(SortDirection::Descending),
            _ => None,
        }
    }

    /// Applies this direction to an ascending comparison result.
    #[inline]
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    const ALL: [Affinity; 6] = [
        Affinity::Bool,
        Affinity::Int,
        Affinity::Double,
        Affinity::DateTime,
        Affinity::String,
        Affinity::Blob,
    ];

    #[test]
    fn test_tag_roundtrip() {
        for affinity in ALL {
            assert_eq!(Affinity::from_tag(affinity.tag()), Some(affinity));
        }
        assert_eq!(Affinity::from_tag(6), None);
        assert_eq!(Affinity::from_tag(255), None);
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(Affinity::Bool.fixed_size(), Some(1));
        assert_eq!(Affinity::Int.fixed_size(), Some(8));
        assert_eq!(Affinity::Double.fixed_size(), Some(8));
        assert_eq!(Affinity::DateTime.fixed_size(), Some(8));
        assert!(Affinity::String.is_variable());
        assert!(Affinity::Blob.is_variable());
    }

    #[test]
    fn test_disk_cost() {
        assert_eq!(Affinity::Bool.disk_cost(0), 3);
        assert_eq!(Affinity::Int.disk_cost(0), 10);
        assert_eq!(Affinity::String.disk_cost(16), 2 + 4 + 32);
        assert_eq!(Affinity::Blob.disk_cost(16), 2 + 4 + 16);
    }

    #[test]
    fn test_display() {
        assert_eq!(Affinity::DateTime.to_string(), "DATE_TIME");
        assert_eq!(Affinity::String.to_string(), "STRING");
    }

    #[test]
    fn test_sort_direction_apply() {
        assert_eq!(SortDirection::Ascending.apply(Ordering::Less), Ordering::Less);
        assert_eq!(
            SortDirection::Descending.apply(Ordering::Less),
            Ordering::Greater
        );
        assert_eq!(SortDirection::from_raw(1), Some(SortDirection::Descending));
        assert_eq!(SortDirection::from_raw(2), None);
    }
}
