//! Record (row) representation.

use crate::cell::Cell;
use std::ops::Index;

/// An ordered set of typed cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    cells: Vec<Cell>,
}

impl Record {
    /// Creates a record from its cells.
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the record has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the cell at `index`.
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Returns all cells.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Consumes the record, returning its cells.
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Projects the record onto the given column positions, in order.
    ///
    /// # Panics
    /// Panics if an index is out of bounds; projections are built from the
    /// record's own schema.
    pub fn split(&self, indices: &[usize]) -> Record {
        Record {
            cells: indices.iter().map(|&i| self.cells[i].clone()).collect(),
        }
    }

    /// Appends one cell.
    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Concatenates two records.
    pub fn join(mut self, other: Record) -> Record {
        self.cells.extend(other.cells);
        self
    }

    /// Serialized size of the record in bytes.
    pub fn disk_size(&self) -> usize {
        self.cells.iter().map(Cell::disk_size).sum()
    }
}

impl Index<usize> for Record {
    type Output = Cell;

    fn index(&self, index: usize) -> &Cell {
        &self.cells[index]
    }
}

impl From<Vec<Cell>> for Record {
    fn from(cells: Vec<Cell>) -> Self {
        Self::new(cells)
    }
}

impl FromIterator<Cell> for Record {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", cell)?;
        }
        f.write_str(")")
    }
}

/// Builds a record from a list of values convertible into cells.
#[macro_export]
macro_rules! record {
    ($($value:expr),* $(,)?) => {
        $crate::record::Record::new(vec![$($crate::cell::Cell::from($value)),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Affinity;

    #[test]
    fn test_split_projects_in_order() {
        let record = record![1i64, "a", 2.5f64];
        let key = record.split(&[2, 0]);
        assert_eq!(key, record![2.5f64, 1i64]);
    }

    #[test]
    fn test_join() {
        let joined = record![1i64].join(record!["x"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[1], Cell::from("x"));
    }

    #[test]
    fn test_display() {
        let mut record = record![7i64, "bob"];
        record.push(Cell::Null(Affinity::Double));
        assert_eq!(record.to_string(), "(7, 'bob', NULL)");
    }

    #[test]
    fn test_disk_size() {
        let record = record![7i64, true];
        assert_eq!(record.disk_size(), 10 + 3);
    }
}
