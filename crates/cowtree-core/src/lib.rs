//! # cowtree
//!
//! A copy-on-write B+Tree whose nodes are encoded into fixed 4 KiB pages.
//!
//! The tree never edits a page in place. Inserts and deletes rebuild the
//! nodes on the path to the affected key, free the pages they replace and
//! allocate fresh ones through a [`PageStore`](btree::PageStore), yielding a
//! new root page id. Any store that can read, allocate and free pages can
//! host a tree; [`InMemoryPageStore`](btree::InMemoryPageStore) keeps them in
//! a `HashMap`.
//!
//! ## Quick Start
//!
//! ```
//! use cowtree_core::btree::{BTree, InMemoryPageStore};
//!
//! let mut tree = BTree::new(InMemoryPageStore::new());
//! for i in 0..1000u32 {
//!     let key = format!("user#{i:05}");
//!     tree.insert(key.as_bytes(), b"profile").unwrap();
//! }
//!
//! let page = tree
//!     .range_scan(Some(b"user#00100"), Some(b"user#00110"))
//!     .unwrap();
//! assert_eq!(page.len(), 10);
//!
//! let stats = tree.verify().unwrap();
//! assert_eq!(stats.entries, 1000);
//! ```

pub mod btree;
pub mod error;
pub mod types;
