//! Page cache for Stratum.
//!
//! This crate provides the page manager shared by all tables:
//! - Disk-backed (scribe) and memory-only (dream) table registries
//! - A byte-budgeted page cache with least-recently-touched eviction
//! - Write-back of dirty pages on eviction, flush and shutdown

mod manager;
mod queue;

pub use manager::{CacheConfig, CacheStats, PageManager, Residency};
pub use queue::FloatingQueue;
