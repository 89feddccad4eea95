//! Stratum common types, errors, and utilities.
//!
//! This crate provides the value layer and shared definitions used across all
//! Stratum components.

pub mod cell;
pub mod config;
pub mod error;
pub mod matcher;
pub mod page;
pub mod record;
pub mod schema;
pub mod types;

pub use cell::Cell;
pub use config::StorageConfig;
pub use error::{Result, StratumError};
pub use matcher::RecordMatcher;
pub use page::{PageUid, RecordKey, TableKey, DEFAULT_PAGE_SIZE};
pub use record::Record;
pub use schema::{Column, Key, Schema};
pub use types::{Affinity, SortDirection};
