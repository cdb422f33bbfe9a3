//! Embedded single-file key-value store built on a page-addressed B-tree.

pub mod btree;
pub mod error;
pub mod storage;

pub use btree::{Collection, Item, Node};
pub use error::{Error, Result};
pub use storage::{Options, PageId, PageManager};
