//! Error types for Stratum.

use thiserror::Error;

/// Result type alias using StratumError.
pub type Result<T> = std::result::Result<T, StratumError>;

/// Errors that can occur in Stratum operations.
///
/// `DuplicateKey`, `OutOfMemory` and the identity lookups are ordinary
/// conditions a caller is expected to branch on. The structural variants
/// (`OutOfRange`, `InvalidSplit`, `NotFound`, `KeyOutOfBounds`, ...) mean a
/// page or tree invariant is already broken and must not be retried.
#[derive(Debug, Error)]
pub enum StratumError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Page format errors
    #[error("Corrupt page: {reason}")]
    CorruptPage { reason: String },

    #[error("Corrupt table header: {reason}")]
    CorruptHeader { reason: String },

    #[error("Page kind mismatch: expected {expected}, got {actual}")]
    PageKindMismatch { expected: String, actual: String },

    #[error("Page overflow: {size} bytes do not fit in a {page_size} byte page")]
    PageOverflow { size: usize, page_size: usize },

    #[error("Page {page_id} is full")]
    PageFull { page_id: u32 },

    // Structural errors
    #[error("Index {index} out of range (count {count})")]
    OutOfRange { index: usize, count: usize },

    #[error("Invalid split of {count} records at pivot {pivot}")]
    InvalidSplit { count: usize, pivot: usize },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Key {key} exceeds the maximum of non-highest page {page_id}")]
    KeyOutOfBounds { page_id: u32, key: String },

    // B+ tree errors
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // Cache errors
    #[error("Out of memory: need {needed} bytes, {used} of {budget} in use")]
    OutOfMemory {
        needed: usize,
        used: usize,
        budget: usize,
    },

    // Identity errors
    #[error("Element does not exist: {0}")]
    ElementDoesNotExist(String),

    #[error("Element already exists: {0}")]
    ElementExists(String),

    // Type errors
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StratumError {
    /// Returns true for conditions a caller is expected to handle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StratumError::Io(_)
                | StratumError::DuplicateKey(_)
                | StratumError::OutOfMemory { .. }
                | StratumError::ElementDoesNotExist(_)
                | StratumError::ElementExists(_)
                | StratumError::ConfigError(_)
        )
    }
}

/// Builds a `CorruptPage` error.
pub fn corrupt_page(reason: impl Into<String>) -> StratumError {
    StratumError::CorruptPage {
        reason: reason.into(),
    }
}
