//! Storage formats for Stratum.
//!
//! This crate provides:
//! - Page formats (plain, sorted, B+Tree node) sharing one binary layout
//! - The record codec
//! - Table and index headers
//! - Table files with fixed-offset page I/O

mod disk;
mod layout;
pub mod page;
mod table_header;

pub use disk::TableFile;
pub use page::{
    BPlusTreePage, NodeOrder, Page, PageHeader, PageKind, SearchMode, SortedPage,
};
pub use table_header::{IndexHeader, TableHeader, TableKind};
