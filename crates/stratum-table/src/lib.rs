//! Tables for Stratum.
//!
//! This crate provides the table family built on the page manager:
//! - Heap tables that append to the chain's tail
//! - Sorted tables whose page chain reads back in key order
//! - Clustered B+Tree tables
//! - Derived tables and secondary indexes stored inside a parent table
//! - Record readers and writers over any page chain

mod base;
mod btree;
mod derived;
mod heap;
mod index;
mod sorted;
mod store;
mod stream;
mod table_core;
mod tree;

pub use base::BaseTable;
pub use btree::{BPlusTree, TreeLayout};
pub use derived::DerivedTable;
pub use heap::HeapTable;
pub use index::{IndexTable, PAGE_ID_COLUMN, ROW_ID_COLUMN};
pub use sorted::SortedTable;
pub use store::{PageSource, PageStore};
pub use stream::{RecordReader, RecordWriter};
pub use table_core::{TableCore, TableOptions};
pub use tree::TreeTable;
