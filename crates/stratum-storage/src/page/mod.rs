//! Page formats.
//!
//! - Page: plain record container in insertion order
//! - SortedPage: records in comparator order with binary search
//! - BPlusTreePage: leaf or branch node of a B+Tree
//!
//! All three share one 64-byte header and one record encoding; the page
//! type field says which view applies.

pub mod codec;
pub mod constants;
mod header;
mod plain;
mod sorted;
mod tree;

pub use header::{PageHeader, PageKind};
pub use plain::Page;
pub use sorted::{SearchMode, SortedPage};
pub use tree::{branch_entry, BPlusTreePage, NodeOrder};
