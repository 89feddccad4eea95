//! Multi-column record comparison.

use crate::record::Record;
use crate::schema::Key;
use crate::types::SortDirection;
use std::cmp::Ordering;

/// Compares a column set of one record against a column set of another.
///
/// Column `i` of the left set is compared with column `i` of the right set
/// under direction `i`; the first non-equal pair decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMatcher {
    left: Vec<usize>,
    right: Vec<usize>,
    directions: Vec<SortDirection>,
}

impl RecordMatcher {
    /// Creates a matcher from explicit column sets.
    ///
    /// # Panics
    /// Panics if the three vectors differ in length.
    pub fn new(left: Vec<usize>, right: Vec<usize>, directions: Vec<SortDirection>) -> Self {
        assert!(
            left.len() == right.len() && left.len() == directions.len(),
            "matcher column sets differ in length"
        );
        Self {
            left,
            right,
            directions,
        }
    }

    /// Compares two records of the same layout on the key's columns.
    pub fn symmetric(key: &Key) -> Self {
        let indices = key.indices();
        Self::new(indices.clone(), indices, key.directions())
    }

    /// Compares a key-only record (columns `0..n`) against full records.
    pub fn probe(key: &Key) -> Self {
        Self::new((0..key.len()).collect(), key.indices(), key.directions())
    }

    /// Compares the leading `width` columns of two records, ascending.
    pub fn prefix(width: usize) -> Self {
        Self::new(
            (0..width).collect(),
            (0..width).collect(),
            vec![SortDirection::Ascending; width],
        )
    }

    /// Like [`prefix`](Self::prefix) but with explicit directions.
    pub fn prefix_with(directions: Vec<SortDirection>) -> Self {
        let width = directions.len();
        Self::new((0..width).collect(), (0..width).collect(), directions)
    }

    /// Number of compared columns.
    pub fn width(&self) -> usize {
        self.left.len()
    }

    /// Returns the directions.
    pub fn directions(&self) -> &[SortDirection] {
        &self.directions
    }

    /// Three-way compare of `left` (left columns) against `right` (right columns).
    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        for ((&l, &r), &direction) in self.left.iter().zip(&self.right).zip(&self.directions) {
            let ordering = direction.apply(left[l].cmp(&right[r]));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Tests whether `x` (left columns) lies within `[lo, hi]` (right columns).
    ///
    /// Returns `Less` if `x` sorts before `lo`, `Greater` if it sorts after
    /// `hi`, `Equal` when inside the closed range.
    pub fn is_between(&self, x: &Record, lo: &Record, hi: &Record) -> Ordering {
        if self.compare(x, lo) == Ordering::Less {
            Ordering::Less
        } else if self.compare(x, hi) == Ordering::Greater {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}
