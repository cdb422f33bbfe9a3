//! Error types for the btreekv storage engine

use thiserror::Error;

use crate::btree::node::{MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::storage::page::PageId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("corrupt page {page}: {reason}")]
    CorruptPage { page: PageId, reason: String },

    #[error("key is {0} bytes, limit is {}", MAX_KEY_SIZE)]
    KeyTooLarge(usize),

    #[error("value is {0} bytes, limit is {}", MAX_VALUE_SIZE)]
    ValueTooLarge(usize),

    #[error("node needs {size} bytes but pages are {page_size} bytes")]
    PageOverflow { size: usize, page_size: usize },

    #[error("{} is over-populated and has no valid split index", describe_node(.0))]
    Unsplittable(Option<PageId>),

    #[error("freelist holds {count} released pages, a page fits {capacity}")]
    FreeListFull { count: usize, capacity: usize },

    #[error("node has not been written to a page")]
    DetachedNode,

    #[error("store is closed")]
    Closed,
}

fn describe_node(page: &Option<PageId>) -> String {
    match page {
        Some(page) => format!("node on page {page}"),
        None => "unwritten node".to_string(),
    }
}
