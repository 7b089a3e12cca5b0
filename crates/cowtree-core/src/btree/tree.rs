//! [`BTree`]: a root page id bundled with the store that holds its pages.

use crate::error::Result;
use crate::types::{KeyValuePair, NULL_PAGE, PageId};

use super::PageStore;
use super::ops;
use super::verify::{self, TreeStats};

/// A copy-on-write B+Tree over a [`PageStore`].
///
/// Every edit writes new pages and moves the root, so the root id is the
/// only state the handle keeps. Edits only fail when the store does: every
/// node the tree writes fits a page, so an error always comes from
/// reading, allocating or freeing a page. A failed edit leaves the root
/// untouched, and pages the store had already freed or allocated are its
/// own to reconcile.
///
/// ```
/// use cowtree_core::btree::{BTree, InMemoryPageStore};
///
/// let mut tree = BTree::new(InMemoryPageStore::new());
/// tree.insert(b"hello", b"world").unwrap();
/// assert_eq!(tree.get(b"hello").unwrap(), Some(b"world".to_vec()));
/// assert!(tree.delete(b"hello").unwrap());
/// assert!(tree.is_empty());
/// ```
#[derive(Debug)]
pub struct BTree<S: PageStore> {
    store: S,
    root: PageId,
}

impl<S: PageStore> BTree<S> {
    /// An empty tree.
    pub fn new(store: S) -> Self {
        Self::open(store, NULL_PAGE)
    }

    /// A tree whose root already lives in `store`.
    pub fn open(store: S, root: PageId) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root == NULL_PAGE
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give up the tree, returning the store and the root to reopen it with.
    pub fn into_parts(self) -> (S, PageId) {
        (self.store, self.root)
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Insert or overwrite `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty or longer than
    /// [`MAX_KEY_SIZE`](crate::types::MAX_KEY_SIZE), or if `value` is longer
    /// than [`MAX_VALUE_SIZE`](crate::types::MAX_VALUE_SIZE).
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.root = ops::insert(&mut self.store, self.root, key, value)?;
        Ok(())
    }

    /// Delete `key`, returning whether it was present.
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty or longer than
    /// [`MAX_KEY_SIZE`](crate::types::MAX_KEY_SIZE).
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let (found, root) = ops::delete(&mut self.store, self.root, key)?;
        self.root = root;
        Ok(found)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(ops::search(&self.store, self.root, key)?)
    }

    /// All pairs with `start <= key < end`, in key order. `None` leaves that
    /// side of the range open.
    pub fn range_scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<Vec<KeyValuePair>> {
        Ok(ops::range_scan(&self.store, self.root, start, end)?)
    }

    /// Free every page of the tree and reset it to empty.
    pub fn clear(&mut self) -> Result<()> {
        if self.root != NULL_PAGE {
            ops::free_tree(&mut self.store, self.root)?;
            self.root = NULL_PAGE;
        }
        Ok(())
    }

    /// Walk the whole tree checking its structure.
    pub fn verify(&self) -> Result<TreeStats> {
        Ok(verify::verify(&self.store, self.root)?)
    }
}
