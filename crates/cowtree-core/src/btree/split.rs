//! Cutting an oversized node back into page-sized nodes.
//!
//! A builder can leave a node at most one maximal entry (or, for internal
//! nodes, two extra links) over a page. Two cuts always suffice to bring every
//! part under [`PAGE_SIZE`]; a node that needs more is a broken invariant.

use crate::error::StorageError;
use crate::types::PAGE_SIZE;

use super::builder::copy_range;
use super::node::Node;

/// Split `node` into one, two or three nodes that each fit a page.
///
/// A node that already fits is returned unchanged as the only part.
///
/// # Panics
///
/// Panics if two cuts cannot bring every part under a page.
pub fn split(node: Node) -> Result<Vec<Node>, StorageError> {
    if node.fits_page() {
        return Ok(vec![node]);
    }

    let (left, right) = split_in_two(&node)?;
    if left.fits_page() {
        return Ok(vec![left, right]);
    }

    let (left, middle) = split_in_two(&left)?;
    assert!(
        left.fits_page(),
        "left part still {} bytes after two splits",
        left.encoded_size()
    );
    Ok(vec![left, middle, right])
}

/// Split `old` into a left part, which may still exceed a page, and a right
/// part that fits one.
///
/// Trailing entries move to the right part one at a time until the left part
/// fits or the right part cannot take another entry. Both parts keep at
/// least one entry.
///
/// # Panics
///
/// Panics if `old` has fewer than two entries.
pub fn split_in_two(old: &Node) -> Result<(Node, Node), StorageError> {
    let node_type = old.node_type()?;
    let n = old.key_count();
    assert!(n >= 2, "cannot split a node with {n} entries");

    let mut nleft = n - 1;
    while nleft > 1
        && old.range_size(0, nleft) > PAGE_SIZE
        && old.range_size(nleft - 1, n) <= PAGE_SIZE
    {
        nleft -= 1;
    }
    let nright = n - nleft;

    let mut left = Node::new();
    left.set_header(node_type, nleft);
    copy_range(&mut left, old, 0, 0, nleft);

    let mut right = Node::new();
    right.set_header(node_type, nright);
    copy_range(&mut right, old, 0, nleft, nright);

    debug_assert!(right.fits_page());
    Ok((left, right))
}
