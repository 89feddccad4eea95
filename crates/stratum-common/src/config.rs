//! Configuration structures for Stratum.

use crate::error::{Result, StratumError};
use crate::page::{is_valid_page_size, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default page cache memory budget (32 MB).
pub const DEFAULT_MEMORY_BUDGET: usize = 32 * 1024 * 1024;

/// Smallest memory budget the page cache will run with (8 MB).
pub const MIN_MEMORY_BUDGET: usize = 8 * 1024 * 1024;

/// Smallest per-page record limit; a split needs at least three records.
pub const MIN_RECORDS_PER_PAGE: usize = 3;

/// Storage configuration for tables and the page cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for table files.
    pub data_dir: PathBuf,
    /// File extension for table files, without the dot.
    pub extension: String,
    /// Page size in bytes for newly created tables.
    pub page_size: usize,
    /// Page cache memory budget in bytes.
    pub memory_budget: usize,
    /// Sync table files to disk after flushing.
    pub fsync_enabled: bool,
    /// Caps the number of records per page, regardless of record size.
    pub max_records_per_page: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            extension: "strat".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            fsync_enabled: true,
            max_records_per_page: None,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration rooted at `data_dir` with default settings.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Checks page size and record limit.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_page_size(self.page_size) {
            return Err(StratumError::ConfigError(format!(
                "page size {} is not a positive multiple of 4096",
                self.page_size
            )));
        }
        if let Some(limit) = self.max_records_per_page {
            if limit < MIN_RECORDS_PER_PAGE {
                return Err(StratumError::ConfigError(format!(
                    "max_records_per_page {} is below {}",
                    limit, MIN_RECORDS_PER_PAGE
                )));
            }
        }
        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(StratumError::ConfigError(format!(
                "invalid table file extension '{}'",
                self.extension
            )));
        }
        Ok(())
    }

    /// Memory budget after applying the floor.
    pub fn effective_memory_budget(&self) -> usize {
        self.memory_budget.max(MIN_MEMORY_BUDGET)
    }

    /// Path of the file backing table `name`.
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", name, self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.extension, "strat");
        assert_eq!(config.page_size, 65536);
        assert_eq!(config.memory_budget, 32 * 1024 * 1024);
        assert!(config.fsync_enabled);
        assert!(config.max_records_per_page.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_page_size() {
        let config = StorageConfig {
            page_size: 5000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StratumError::ConfigError(_))));
    }

    #[test]
    fn test_validate_record_limit() {
        let mut config = StorageConfig {
            max_records_per_page: Some(2),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.max_records_per_page = Some(3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_budget_floor() {
        let config = StorageConfig {
            memory_budget: 1024,
            ..Default::default()
        };
        assert_eq!(config.effective_memory_budget(), MIN_MEMORY_BUDGET);
    }

    #[test]
    fn test_table_path() {
        let config = StorageConfig::with_data_dir("/var/lib/stratum");
        assert_eq!(
            config.table_path("orders"),
            PathBuf::from("/var/lib/stratum/orders.strat")
        );
    }

    #[test]
    fn test_storage_config_serde_roundtrip() {
        let original = StorageConfig {
            max_records_per_page: Some(4),
            page_size: 8192,
            ..Default::default()
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: StorageConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.data_dir, deserialized.data_dir);
        assert_eq!(original.page_size, deserialized.page_size);
        assert_eq!(original.max_records_per_page, deserialized.max_records_per_page);
        assert_eq!(original.extension, deserialized.extension);
    }
}
