//! Structural verification of a whole tree.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::types::{NULL_PAGE, PAGE_SIZE, PageId};

use super::PageStore;
use super::node::NodeType;

/// Shape of a tree gathered by [`verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Levels from root to leaf; 0 for an empty tree.
    pub height: usize,
    pub internal_pages: usize,
    pub leaf_pages: usize,
    /// Key-value pairs, not counting the empty-key sentinel.
    pub entries: usize,
    /// Sum of the encoded sizes of all pages.
    pub used_bytes: usize,
}

/// What a node must satisfy given its place in the tree.
struct Bounds<'a> {
    /// The separator its parent holds for it.
    first: Option<&'a [u8]>,
    /// The next separator to its right anywhere above it.
    upper: Option<&'a [u8]>,
    leftmost: bool,
}

/// Check every node reachable from `root` and summarize the tree.
///
/// Each node must carry a valid type tag, at least one entry, fit a page and
/// hold strictly ascending keys. Its first key must equal the separator its
/// parent stores for it, its keys must sort below the next separator, and
/// all leaves must sit at the same depth. The first key on the leftmost path
/// is the empty key and appears nowhere else.
pub fn verify(store: &impl PageStore, root: PageId) -> Result<TreeStats, StorageError> {
    let mut stats = TreeStats::default();
    if root == NULL_PAGE {
        return Ok(stats);
    }
    let bounds = Bounds {
        first: None,
        upper: None,
        leftmost: true,
    };
    stats.height = verify_node(store, root, &bounds, &mut stats)?;
    Ok(stats)
}

/// Returns the height of the subtree rooted at `page_id`.
fn verify_node(
    store: &impl PageStore,
    page_id: PageId,
    bounds: &Bounds<'_>,
    stats: &mut TreeStats,
) -> Result<usize, StorageError> {
    let corrupt = |msg: String| StorageError::CorruptedPage(format!("page {page_id}: {msg}"));

    let node = store.read_page(page_id)?;
    node.validate()?;
    let node_type = node.node_type()?;
    let n = node.key_count();
    if n == 0 {
        return Err(corrupt("node has no entries".to_string()));
    }
    let size = node.encoded_size();
    if size > PAGE_SIZE {
        return Err(corrupt(format!("node encodes to {size} bytes")));
    }
    for i in 1..n {
        if node.key(i - 1) >= node.key(i) {
            return Err(corrupt(format!("keys {} and {i} out of order", i - 1)));
        }
    }
    if let Some(first) = bounds.first
        && node.key(0) != first
    {
        return Err(corrupt("first key differs from parent separator".to_string()));
    }
    if node.key(0).is_empty() != bounds.leftmost {
        return Err(corrupt(if bounds.leftmost {
            "leftmost node does not start with the empty key".to_string()
        } else {
            "empty key outside the leftmost path".to_string()
        }));
    }
    if let Some(upper) = bounds.upper
        && node.key(n - 1) >= upper
    {
        return Err(corrupt("last key not below the next separator".to_string()));
    }
    stats.used_bytes += size;

    match node_type {
        NodeType::Leaf => {
            stats.leaf_pages += 1;
            stats.entries += n as usize - usize::from(bounds.leftmost);
            Ok(1)
        }
        NodeType::Internal => {
            stats.internal_pages += 1;
            let mut height = None;
            for i in 0..n {
                let child_bounds = Bounds {
                    first: Some(node.key(i)),
                    upper: if i + 1 < n {
                        Some(node.key(i + 1))
                    } else {
                        bounds.upper
                    },
                    leftmost: bounds.leftmost && i == 0,
                };
                let child_height = verify_node(store, node.child(i), &child_bounds, stats)?;
                match height {
                    None => height = Some(child_height),
                    Some(h) if h != child_height => {
                        return Err(corrupt(format!(
                            "child {i} has height {child_height}, expected {h}"
                        )));
                    }
                    Some(_) => {}
                }
            }
            Ok(height.unwrap_or(0) + 1)
        }
    }
}
