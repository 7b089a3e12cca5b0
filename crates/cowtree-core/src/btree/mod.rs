//! Copy-on-write B+Tree over fixed-size pages.

pub mod builder;
pub mod node;
pub mod ops;
pub mod split;
pub mod tree;
pub mod verify;

use std::collections::HashMap;

use crate::error::StorageError;
use crate::types::{PAGE_SIZE, PageId};

pub use node::{Node, NodeType};
pub use tree::BTree;
pub use verify::TreeStats;

/// Abstraction over page get/new/del for the B+Tree.
///
/// The B+Tree never edits a page in place: it reads nodes, builds new ones,
/// hands them to [`allocate_page`](PageStore::allocate_page) and frees the
/// pages they replace. Where the bytes live is up to the implementation.
pub trait PageStore {
    /// Read the node stored in a page.
    fn read_page(&self, page_id: PageId) -> Result<Node, StorageError>;
    /// Persist a node into a fresh, non-zero page id.
    fn allocate_page(&mut self, node: &Node) -> Result<PageId, StorageError>;
    /// Release a page. Its id must not be read again.
    fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError>;
}

/// In-memory page store backed by a `HashMap`.
///
/// Page ids are handed out from 1 upward and never reused.
#[derive(Debug)]
pub struct InMemoryPageStore {
    pages: HashMap<PageId, [u8; PAGE_SIZE]>,
    next_page_id: PageId,
    allocations: u64,
    frees: u64,
}

impl InMemoryPageStore {
    /// Create a new empty in-memory page store.
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            next_page_id: 1,
            allocations: 0,
            frees: 0,
        }
    }

    /// Number of live pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    /// Live page ids in ascending order.
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.pages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Total successful `allocate_page` calls.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Total successful `free_page` calls.
    pub fn frees(&self) -> u64 {
        self.frees
    }
}

impl Default for InMemoryPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for InMemoryPageStore {
    fn read_page(&self, page_id: PageId) -> Result<Node, StorageError> {
        let buf = self
            .pages
            .get(&page_id)
            .ok_or(StorageError::PageNotFound { page_id })?;
        Ok(Node::from_bytes(buf))
    }

    fn allocate_page(&mut self, node: &Node) -> Result<PageId, StorageError> {
        let bytes = node.as_bytes();
        if bytes.len() > PAGE_SIZE {
            return Err(StorageError::PageOverflow {
                size: bytes.len(),
                max: PAGE_SIZE,
            });
        }
        let mut buf = [0u8; PAGE_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);

        let page_id = self.next_page_id;
        self.next_page_id += 1;
        self.pages.insert(page_id, buf);
        self.allocations += 1;
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> Result<(), StorageError> {
        self.pages
            .remove(&page_id)
            .ok_or(StorageError::PageNotFound { page_id })?;
        self.frees += 1;
        Ok(())
    }
}
