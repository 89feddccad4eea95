//! Column definitions, schemas and sort keys.

use crate::cell::Cell;
use crate::error::{Result, StratumError};
use crate::record::Record;
use crate::types::{Affinity, SortDirection};
use serde::{Deserialize, Serialize};

/// Maximum length of a column name in bytes.
pub const MAX_COLUMN_NAME: usize = 32;

/// Maximum number of columns in a sort key.
pub const MAX_KEY_COLUMNS: usize = 16;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name (ASCII, at most 32 bytes).
    pub name: String,
    /// Value type.
    pub affinity: Affinity,
    /// Declared size: characters for strings, bytes for blobs, 0 otherwise.
    pub size: u8,
    /// Whether nulls are allowed.
    pub nullable: bool,
}

impl Column {
    /// Creates a nullable column.
    pub fn new(name: impl Into<String>, affinity: Affinity, size: u8) -> Self {
        Self {
            name: name.into(),
            affinity,
            size,
            nullable: true,
        }
    }

    /// Marks the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Worst-case serialized size of a cell in this column.
    pub fn disk_cost(&self) -> usize {
        self.affinity.disk_cost(self.size as usize)
    }
}

/// Ordered set of columns describing a record layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema, rejecting over-long or non-ASCII column names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        for column in &columns {
            if column.name.is_empty()
                || column.name.len() > MAX_COLUMN_NAME
                || !column.name.is_ascii()
            {
                return Err(StratumError::ConfigError(format!(
                    "invalid column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column at `index`.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Finds a column by case-insensitive name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Projects the schema onto the given column positions.
    pub fn split(&self, indices: &[usize]) -> Schema {
        Schema {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    /// Appends a column.
    pub fn push(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Worst-case serialized size of one record.
    pub fn disk_cost(&self) -> usize {
        self.columns.iter().map(Column::disk_cost).sum()
    }

    /// A record whose every cell is the largest value of its column.
    pub fn max_record(&self) -> Record {
        self.columns
            .iter()
            .map(|c| Cell::max_value(c.affinity, c.size as usize))
            .collect()
    }

    /// Checks that a record matches this schema cell for cell.
    pub fn validate(&self, record: &Record) -> Result<()> {
        if record.len() != self.columns.len() {
            return Err(StratumError::TypeMismatch {
                expected: format!("{} cells", self.columns.len()),
                actual: format!("{} cells", record.len()),
            });
        }
        for (column, cell) in self.columns.iter().zip(record.cells()) {
            if cell.is_null() {
                if !column.nullable {
                    return Err(StratumError::TypeMismatch {
                        expected: format!("non-null {}", column.name),
                        actual: "NULL".to_string(),
                    });
                }
                continue;
            }
            if cell.affinity() != column.affinity {
                return Err(StratumError::TypeMismatch {
                    expected: column.affinity.to_string(),
                    actual: cell.affinity().to_string(),
                });
            }
            // page capacity assumes no cell outgrows its declared size
            let length = match cell {
                Cell::String(text) => text.encode_utf16().count(),
                Cell::Blob(bytes) => bytes.len(),
                _ => continue,
            };
            if length > column.size as usize {
                return Err(StratumError::TypeMismatch {
                    expected: format!("{}({}) for {}", column.affinity, column.size, column.name),
                    actual: format!("{}({})", column.affinity, length),
                });
            }
        }
        Ok(())
    }
}

/// A sort key: column positions with per-column direction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Key {
    columns: Vec<(usize, SortDirection)>,
}

impl Key {
    /// Creates a key from explicit (column, direction) pairs.
    pub fn new(columns: Vec<(usize, SortDirection)>) -> Result<Self> {
        if columns.len() > MAX_KEY_COLUMNS {
            return Err(StratumError::ConfigError(format!(
                "sort key has {} columns (max {})",
                columns.len(),
                MAX_KEY_COLUMNS
            )));
        }
        Ok(Self { columns })
    }

    /// An ascending key over the given columns.
    pub fn ascending(indices: &[usize]) -> Result<Self> {
        Self::new(
            indices
                .iter()
                .map(|&i| (i, SortDirection::Ascending))
                .collect(),
        )
    }

    /// Number of key columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the key has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the (column, direction) pairs.
    pub fn columns(&self) -> &[(usize, SortDirection)] {
        &self.columns
    }

    /// Returns the column positions.
    pub fn indices(&self) -> Vec<usize> {
        self.columns.iter().map(|&(i, _)| i).collect()
    }

    /// Returns the directions in key order.
    pub fn directions(&self) -> Vec<SortDirection> {
        self.columns.iter().map(|&(_, d)| d).collect()
    }

    /// The same directions over positions `0..len`, for key-only records.
    pub fn compacted(&self) -> Key {
        Key {
            columns: self
                .columns
                .iter()
                .enumerate()
                .map(|(i, &(_, d))| (i, d))
                .collect(),
        }
    }

    /// Checks that every key column exists in `schema`.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for &(index, _) in &self.columns {
            if index >= schema.len() {
                return Err(StratumError::ConfigError(format!(
                    "key column {} outside schema of {} columns",
                    index,
                    schema.len()
                )));
            }
        }
        Ok(())
    }
}
