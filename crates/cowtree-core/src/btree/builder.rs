//! Node builders: each takes immutable input nodes and returns a freshly
//! encoded node. Nothing here ever edits a node that came from a page.
//!
//! The two primitives, [`copy_range`] and [`append_entry`], write into a node
//! whose final key count is already in the header, so pointer and offset
//! slots land at their final positions. Entries must be written in order:
//! each write reads the running offset left by the previous one.

use crate::error::StorageError;
use crate::types::{KV_HEADER_SIZE, NULL_PAGE, PageId};

use super::node::{Node, NodeType};

/// A child link to splice into an internal node: the child's page and the
/// first key of its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLink<'a> {
    pub page_id: PageId,
    pub key: &'a [u8],
}

/// Copy entries `[src_start, src_start + n)` of `src` into entries
/// `[dst_start, dst_start + n)` of `dst`.
///
/// Pointers and raw KV bytes are copied as-is; offsets are rebased onto the
/// running offset of `dst`.
///
/// # Panics
///
/// Panics if either range runs past its node's key count.
pub fn copy_range(dst: &mut Node, src: &Node, dst_start: u16, src_start: u16, n: u16) {
    assert!(
        src_start as usize + n as usize <= src.key_count() as usize,
        "copy of {n} entries from {src_start} overruns source with {} keys",
        src.key_count()
    );
    assert!(
        dst_start as usize + n as usize <= dst.key_count() as usize,
        "copy of {n} entries to {dst_start} overruns destination with {} keys",
        dst.key_count()
    );
    if n == 0 {
        return;
    }

    for i in 0..n {
        dst.set_child(dst_start + i, src.child(src_start + i));
    }

    let dst_begin = dst.offset(dst_start);
    let src_begin = src.offset(src_start);
    for i in 1..=n {
        let offset = dst_begin + (src.offset(src_start + i) - src_begin);
        dst.set_offset(dst_start + i, offset);
    }

    let begin = src.kv_pos(src_start);
    let end = src.kv_pos(src_start + n);
    let at = dst.kv_pos(dst_start);
    dst.data_mut()[at..at + (end - begin)].copy_from_slice(&src.data()[begin..end]);
}

/// Write one entry at `idx` and set the offset of the entry after it.
///
/// # Panics
///
/// Panics if `idx >= dst.key_count()`.
pub fn append_entry(dst: &mut Node, idx: u16, child: PageId, key: &[u8], value: &[u8]) {
    dst.set_child(idx, child);

    let pos = dst.kv_pos(idx);
    let data = dst.data_mut();
    data[pos..pos + 2].copy_from_slice(&(key.len() as u16).to_le_bytes());
    data[pos + 2..pos + 4].copy_from_slice(&(value.len() as u16).to_le_bytes());
    let key_at = pos + KV_HEADER_SIZE;
    data[key_at..key_at + key.len()].copy_from_slice(key);
    let val_at = key_at + key.len();
    data[val_at..val_at + value.len()].copy_from_slice(value);

    let next = dst.offset(idx) + (KV_HEADER_SIZE + key.len() + value.len()) as u16;
    dst.set_offset(idx + 1, next);
}

/// The first leaf of a tree: the empty-key sentinel followed by one entry.
pub fn first_leaf(key: &[u8], value: &[u8]) -> Node {
    let mut new = Node::new();
    new.set_header(NodeType::Leaf, 2);
    append_entry(&mut new, 0, NULL_PAGE, &[], &[]);
    append_entry(&mut new, 1, NULL_PAGE, key, value);
    new
}

/// `old` with a new entry inserted at position `idx`.
pub fn leaf_insert(old: &Node, idx: u16, key: &[u8], value: &[u8]) -> Node {
    let n = old.key_count();
    let mut new = Node::new();
    new.set_header(NodeType::Leaf, n + 1);
    copy_range(&mut new, old, 0, 0, idx);
    append_entry(&mut new, idx, NULL_PAGE, key, value);
    copy_range(&mut new, old, idx + 1, idx, n - idx);
    new
}

/// `old` with entry `idx` replaced.
pub fn leaf_update(old: &Node, idx: u16, key: &[u8], value: &[u8]) -> Node {
    let n = old.key_count();
    let mut new = Node::new();
    new.set_header(NodeType::Leaf, n);
    copy_range(&mut new, old, 0, 0, idx);
    append_entry(&mut new, idx, NULL_PAGE, key, value);
    copy_range(&mut new, old, idx + 1, idx + 1, n - idx - 1);
    new
}

/// Given `idx` from a less-or-equal lookup, replace entry `idx` when it holds
/// `key`, otherwise insert `key` right after it.
pub fn leaf_insert_or_replace(old: &Node, idx: u16, key: &[u8], value: &[u8]) -> Node {
    if old.key(idx) == key {
        leaf_update(old, idx, key, value)
    } else {
        leaf_insert(old, idx + 1, key, value)
    }
}

/// `old` without entry `idx`.
pub fn leaf_delete(old: &Node, idx: u16) -> Node {
    let n = old.key_count();
    let mut new = Node::new();
    new.set_header(NodeType::Leaf, n - 1);
    copy_range(&mut new, old, 0, 0, idx);
    copy_range(&mut new, old, idx, idx + 1, n - idx - 1);
    new
}

/// Concatenate two sibling nodes of the same type.
pub fn merge_nodes(left: &Node, right: &Node) -> Result<Node, StorageError> {
    let node_type = left.node_type()?;
    let right_type = right.node_type()?;
    if node_type != right_type {
        return Err(StorageError::CorruptedPage(format!(
            "cannot merge {node_type:?} node with {right_type:?} sibling"
        )));
    }
    let (nl, nr) = (left.key_count(), right.key_count());
    let mut new = Node::new();
    new.set_header(node_type, nl + nr);
    copy_range(&mut new, left, 0, 0, nl);
    copy_range(&mut new, right, nl, 0, nr);
    Ok(new)
}

/// An internal node pointing at `links`, in order.
pub fn internal_node(links: &[ChildLink<'_>]) -> Node {
    let mut new = Node::new();
    new.set_header(NodeType::Internal, links.len() as u16);
    for (i, link) in links.iter().enumerate() {
        append_entry(&mut new, i as u16, link.page_id, link.key, &[]);
    }
    new
}

/// `old` with child link `idx` replaced by `links`.
///
/// # Panics
///
/// Panics if `links` is empty.
pub fn replace_children(old: &Node, idx: u16, links: &[ChildLink<'_>]) -> Node {
    assert!(!links.is_empty(), "replacing child {idx} with no links");
    let n = old.key_count();
    let inc = links.len() as u16;
    let mut new = Node::new();
    new.set_header(NodeType::Internal, n + inc - 1);
    copy_range(&mut new, old, 0, 0, idx);
    for (i, link) in links.iter().enumerate() {
        append_entry(&mut new, idx + i as u16, link.page_id, link.key, &[]);
    }
    copy_range(&mut new, old, idx + inc, idx + 1, n - idx - 1);
    new
}

/// `old` with child links `idx` and `idx + 1` replaced by one link.
pub fn replace_two_children(old: &Node, idx: u16, link: ChildLink<'_>) -> Node {
    let n = old.key_count();
    let mut new = Node::new();
    new.set_header(NodeType::Internal, n - 1);
    copy_range(&mut new, old, 0, 0, idx);
    append_entry(&mut new, idx, link.page_id, link.key, &[]);
    copy_range(&mut new, old, idx + 1, idx + 2, n - idx - 2);
    new
}

/// An internal node with no entries, left behind when its only child empties.
pub fn empty_internal() -> Node {
    let mut new = Node::new();
    new.set_header(NodeType::Internal, 0);
    new
}
