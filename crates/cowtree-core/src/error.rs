//! Error types for cowtree operations.
//!
//! Only failures that can come from data or from the page store are errors.
//! Broken caller contracts (oversized keys, out-of-range node indices) panic,
//! and a missing key is an ordinary `false` / `None` result.

use std::io;
use thiserror::Error;

use crate::types::PageId;

/// Top-level error type for cowtree operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures surfaced by a page store or found while decoding pages.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupted page: {0}")]
    CorruptedPage(String),

    #[error("page not found: {page_id}")]
    PageNotFound { page_id: PageId },

    #[error("node encodes to {size} bytes, page holds {max}")]
    PageOverflow { size: usize, max: usize },

    #[error("page store error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
