//! Core B+Tree operations: search, insert, delete, and range scan.
//!
//! Every edit is copy-on-write. The path from the root to the affected leaf
//! is rebuilt bottom-up; each superseded page is freed and each rebuilt node
//! is allocated a fresh page, so an edit always returns a new root page id.

use tracing::{debug, trace};

use crate::error::StorageError;
use crate::types::{
    KeyValuePair, MAX_KEY_SIZE, MAX_VALUE_SIZE, MERGE_THRESHOLD, NODE_HEADER_SIZE, NULL_PAGE,
    PAGE_SIZE, PageId,
};

use super::PageStore;
use super::builder::{
    ChildLink, empty_internal, first_leaf, internal_node, leaf_delete, leaf_insert_or_replace,
    merge_nodes, replace_children, replace_two_children,
};
use super::node::{Node, NodeType};
use super::split::split;

/// Index of the last entry whose key is `<= key`.
///
/// Only entries `1..key_count()` are compared. Entry 0 is the fallback: in
/// an internal node it covers everything below the second separator, and in
/// the leftmost leaf it is the empty-key sentinel.
pub fn lookup_le(node: &Node, key: &[u8]) -> u16 {
    let (mut lo, mut hi) = (1, node.key_count());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if node.key(mid) <= key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo - 1
}

/// Whether a rewritten child of `child_size` bytes should be merged with a
/// sibling of `sibling_size` bytes.
pub fn should_merge(child_size: usize, sibling_size: usize) -> bool {
    child_size <= MERGE_THRESHOLD && child_size + sibling_size - NODE_HEADER_SIZE <= PAGE_SIZE
}

/// Read a node that is part of a tree. Tree pages always hold at least one
/// entry.
fn read_node(store: &impl PageStore, page_id: PageId) -> Result<Node, StorageError> {
    let node = store.read_page(page_id)?;
    node.validate()?;
    if node.key_count() == 0 {
        return Err(StorageError::CorruptedPage(format!(
            "page {page_id} holds an empty node"
        )));
    }
    Ok(node)
}

fn check_key(key: &[u8]) {
    assert!(!key.is_empty(), "key must not be empty");
    assert!(
        key.len() <= MAX_KEY_SIZE,
        "key of {} bytes exceeds the {MAX_KEY_SIZE} byte limit",
        key.len()
    );
}

fn check_value(value: &[u8]) {
    assert!(
        value.len() <= MAX_VALUE_SIZE,
        "value of {} bytes exceeds the {MAX_VALUE_SIZE} byte limit",
        value.len()
    );
}

/// Search for a key in the B+Tree. Returns the value if found.
///
/// An empty tree and the empty key both report `None`.
pub fn search(
    store: &impl PageStore,
    root_page: PageId,
    key: &[u8],
) -> Result<Option<Vec<u8>>, StorageError> {
    if root_page == NULL_PAGE || key.is_empty() {
        return Ok(None);
    }

    let mut node = read_node(store, root_page)?;
    loop {
        let idx = lookup_le(&node, key);
        match node.node_type()? {
            NodeType::Internal => node = read_node(store, node.child(idx))?,
            NodeType::Leaf => {
                return Ok((node.key(idx) == key).then(|| node.value(idx).to_vec()));
            }
        }
    }
}

/// Insert or overwrite `key`. Returns the new root page id.
///
/// # Panics
///
/// Panics if `key` is empty or longer than [`MAX_KEY_SIZE`], or if `value`
/// is longer than [`MAX_VALUE_SIZE`].
pub fn insert(
    store: &mut impl PageStore,
    root_page: PageId,
    key: &[u8],
    value: &[u8],
) -> Result<PageId, StorageError> {
    check_key(key);
    check_value(value);
    trace!(key_len = key.len(), value_len = value.len(), "insert");

    if root_page == NULL_PAGE {
        let root = store.allocate_page(&first_leaf(key, value))?;
        debug!(root, "created first leaf");
        return Ok(root);
    }

    let node = read_node(store, root_page)?;
    store.free_page(root_page)?;
    let updated = insert_recursive(store, &node, key, value)?;

    let parts = split(updated)?;
    if let [single] = parts.as_slice() {
        return store.allocate_page(single);
    }
    grow_root(store, &parts)
}

/// Allocate the parts of a split root and a new internal root above them.
fn grow_root(store: &mut impl PageStore, parts: &[Node]) -> Result<PageId, StorageError> {
    let links = allocate_parts(store, parts)?;
    let root = store.allocate_page(&internal_node(&links))?;
    debug!(root, parts = parts.len(), "root split");
    Ok(root)
}

/// Rebuild `node` with `key` inserted somewhere beneath it. The result may
/// exceed a page; the caller splits it.
fn insert_recursive(
    store: &mut impl PageStore,
    node: &Node,
    key: &[u8],
    value: &[u8],
) -> Result<Node, StorageError> {
    let idx = lookup_le(node, key);
    match node.node_type()? {
        NodeType::Leaf => Ok(leaf_insert_or_replace(node, idx, key, value)),
        NodeType::Internal => {
            let child_id = node.child(idx);
            let child = read_node(store, child_id)?;
            store.free_page(child_id)?;
            let updated = insert_recursive(store, &child, key, value)?;

            let parts = split(updated)?;
            let links = allocate_parts(store, &parts)?;
            Ok(replace_children(node, idx, &links))
        }
    }
}

/// Allocate a page for each part and return the links an internal node
/// needs to point at them.
fn allocate_parts<'a>(
    store: &mut impl PageStore,
    parts: &'a [Node],
) -> Result<Vec<ChildLink<'a>>, StorageError> {
    let mut links = Vec::with_capacity(parts.len());
    for part in parts {
        let page_id = store.allocate_page(part)?;
        links.push(ChildLink {
            page_id,
            key: part.key(0),
        });
    }
    Ok(links)
}

/// Delete `key`. Returns `(found, new_root)`.
///
/// When the key is absent nothing is read past the search path, nothing is
/// allocated or freed, and the root is returned unchanged. Deleting the last
/// key returns [`NULL_PAGE`].
///
/// # Panics
///
/// Panics if `key` is empty or longer than [`MAX_KEY_SIZE`].
pub fn delete(
    store: &mut impl PageStore,
    root_page: PageId,
    key: &[u8],
) -> Result<(bool, PageId), StorageError> {
    check_key(key);
    trace!(key_len = key.len(), "delete");

    if root_page == NULL_PAGE {
        return Ok((false, root_page));
    }

    let node = read_node(store, root_page)?;
    let Some(updated) = delete_recursive(store, &node, key)? else {
        return Ok((false, root_page));
    };
    store.free_page(root_page)?;

    // A longer first key in a child can push the root past a page.
    let root = match <[Node; 1]>::try_from(split(updated)?) {
        Ok([single]) => new_root_after_delete(store, single)?,
        Err(parts) => grow_root(store, &parts)?,
    };
    Ok((true, root))
}

/// Turn the rebuilt root into a root page id, dropping levels that hold a
/// single child and releasing a tree with no keys left.
fn new_root_after_delete(
    store: &mut impl PageStore,
    updated: Node,
) -> Result<PageId, StorageError> {
    // `page` is where `node` lives, or `None` while it is still unallocated.
    let mut node = updated;
    let mut page: Option<PageId> = None;
    loop {
        let n = node.key_count();
        match node.node_type()? {
            NodeType::Internal if n == 1 => {
                if let Some(page_id) = page {
                    store.free_page(page_id)?;
                }
                let child = node.child(0);
                debug!(root = child, "root collapsed");
                node = read_node(store, child)?;
                page = Some(child);
            }
            NodeType::Internal if n == 0 => {
                if let Some(page_id) = page {
                    store.free_page(page_id)?;
                }
                debug!("tree emptied");
                return Ok(NULL_PAGE);
            }
            NodeType::Leaf if n == 0 || (n == 1 && node.key(0).is_empty()) => {
                if let Some(page_id) = page {
                    store.free_page(page_id)?;
                }
                debug!("tree emptied");
                return Ok(NULL_PAGE);
            }
            _ => {
                return match page {
                    Some(page_id) => Ok(page_id),
                    None => store.allocate_page(&node),
                };
            }
        }
    }
}

/// A sibling chosen to absorb a shrunken child.
enum Merge {
    Left(Node),
    Right(Node),
}

/// Rebuild `node` without `key`, or `None` when the key is absent.
///
/// The result may exceed a page: when a child loses its first key, the
/// separator pointing at it becomes the child's next key, which can be
/// longer. The caller splits it.
fn delete_recursive(
    store: &mut impl PageStore,
    node: &Node,
    key: &[u8],
) -> Result<Option<Node>, StorageError> {
    let idx = lookup_le(node, key);
    match node.node_type()? {
        NodeType::Leaf => {
            if node.key(idx) != key {
                return Ok(None);
            }
            Ok(Some(leaf_delete(node, idx)))
        }
        NodeType::Internal => {
            let child_id = node.child(idx);
            let child = read_node(store, child_id)?;
            let Some(updated) = delete_recursive(store, &child, key)? else {
                return Ok(None);
            };
            store.free_page(child_id)?;

            let rebuilt = match merge_sibling(store, node, idx, &updated)? {
                Some(Merge::Left(sibling)) => {
                    debug!(child = idx, "merging with left sibling");
                    let merged = merge_nodes(&sibling, &updated)?;
                    store.free_page(node.child(idx - 1))?;
                    let page_id = store.allocate_page(&merged)?;
                    replace_two_children(
                        node,
                        idx - 1,
                        ChildLink {
                            page_id,
                            key: merged.key(0),
                        },
                    )
                }
                Some(Merge::Right(sibling)) => {
                    debug!(child = idx, "merging with right sibling");
                    let merged = merge_nodes(&updated, &sibling)?;
                    store.free_page(node.child(idx + 1))?;
                    let page_id = store.allocate_page(&merged)?;
                    replace_two_children(
                        node,
                        idx,
                        ChildLink {
                            page_id,
                            key: merged.key(0),
                        },
                    )
                }
                None if updated.key_count() == 0 => {
                    // Only child emptied; the level above merges this node away.
                    debug_assert_eq!(node.key_count(), 1);
                    empty_internal()
                }
                None => {
                    let parts = split(updated)?;
                    let links = allocate_parts(store, &parts)?;
                    replace_children(node, idx, &links)
                }
            };
            Ok(Some(rebuilt))
        }
    }
}

/// Pick a sibling of child `idx` to merge `updated` into, preferring the
/// left one. Only reads pages.
fn merge_sibling(
    store: &impl PageStore,
    node: &Node,
    idx: u16,
    updated: &Node,
) -> Result<Option<Merge>, StorageError> {
    let size = updated.encoded_size();
    if size > MERGE_THRESHOLD {
        return Ok(None);
    }
    if idx > 0 {
        let sibling = read_node(store, node.child(idx - 1))?;
        if should_merge(size, sibling.encoded_size()) {
            return Ok(Some(Merge::Left(sibling)));
        }
    }
    if idx + 1 < node.key_count() {
        let sibling = read_node(store, node.child(idx + 1))?;
        if should_merge(size, sibling.encoded_size()) {
            return Ok(Some(Merge::Right(sibling)));
        }
    }
    Ok(None)
}

/// Range scan: returns all key-value pairs where start_key <= key < end_key.
///
/// If `start_key` is `None`, scanning starts from the very first leaf entry.
/// If `end_key` is `None`, scanning continues to the end of the tree. The
/// empty-key sentinel is never returned.
pub fn range_scan(
    store: &impl PageStore,
    root_page: PageId,
    start_key: Option<&[u8]>,
    end_key: Option<&[u8]>,
) -> Result<Vec<KeyValuePair>, StorageError> {
    let mut results = Vec::new();
    if root_page != NULL_PAGE {
        tree_range_scan(store, root_page, start_key, end_key, &mut results)?;
    }
    Ok(results)
}

/// Returns `false` once `end_key` is reached and the caller should stop
/// visiting further children.
fn tree_range_scan(
    store: &impl PageStore,
    page_id: PageId,
    start_key: Option<&[u8]>,
    end_key: Option<&[u8]>,
    results: &mut Vec<KeyValuePair>,
) -> Result<bool, StorageError> {
    let node = read_node(store, page_id)?;
    let first = start_key.map_or(0, |sk| lookup_le(&node, sk));

    match node.node_type()? {
        NodeType::Leaf => {
            for i in first..node.key_count() {
                let key = node.key(i);
                if key.is_empty() {
                    continue;
                }
                if let Some(sk) = start_key
                    && key < sk
                {
                    continue;
                }
                if let Some(ek) = end_key
                    && key >= ek
                {
                    return Ok(false);
                }
                results.push((key.to_vec(), node.value(i).to_vec()));
            }
            Ok(true)
        }
        NodeType::Internal => {
            for i in first..node.key_count() {
                // Child `i` holds nothing below its separator.
                if let Some(ek) = end_key
                    && node.key(i) >= ek
                {
                    return Ok(false);
                }
                if !tree_range_scan(store, node.child(i), start_key, end_key, results)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Recursively free all pages of a tree, children before parents.
pub fn free_tree(store: &mut impl PageStore, page_id: PageId) -> Result<(), StorageError> {
    let node = store.read_page(page_id)?;
    if node.node_type()? == NodeType::Internal {
        for i in 0..node.key_count() {
            free_tree(store, node.child(i))?;
        }
    }
    store.free_page(page_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::InMemoryPageStore;
    use crate::btree::builder::append_entry;
    use crate::btree::verify::verify;

    fn setup() -> (InMemoryPageStore, PageId) {
        (InMemoryPageStore::new(), NULL_PAGE)
    }

    fn leaf(keys: &[&str]) -> Node {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, keys.len() as u16);
        for (i, key) in keys.iter().enumerate() {
            append_entry(&mut node, i as u16, NULL_PAGE, key.as_bytes(), b"");
        }
        node
    }

    /// A leaf of `(key, value length)` entries with `v`-filled values.
    fn sized_leaf(entries: &[(&str, usize)]) -> Node {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, entries.len() as u16);
        for (i, (key, len)) in entries.iter().enumerate() {
            append_entry(&mut node, i as u16, NULL_PAGE, key.as_bytes(), &vec![b'v'; *len]);
        }
        node
    }

    /// Store `leaves` under a freshly allocated internal root.
    fn two_level(store: &mut InMemoryPageStore, leaves: &[Node]) -> PageId {
        let links: Vec<ChildLink<'_>> = leaves
            .iter()
            .map(|leaf| ChildLink {
                page_id: store.allocate_page(leaf).unwrap(),
                key: leaf.key(0),
            })
            .collect();
        store.allocate_page(&internal_node(&links)).unwrap()
    }

    fn depth(store: &InMemoryPageStore, page_id: PageId) -> usize {
        let node = store.read_page(page_id).unwrap();
        match node.node_type().unwrap() {
            NodeType::Leaf => 1,
            NodeType::Internal => 1 + depth(store, node.child(0)),
        }
    }

    #[test]
    fn test_lookup_le() {
        let node = leaf(&["", "b", "d", "f"]);
        assert_eq!(lookup_le(&node, b"a"), 0);
        assert_eq!(lookup_le(&node, b"b"), 1);
        assert_eq!(lookup_le(&node, b"c"), 1);
        assert_eq!(lookup_le(&node, b"f"), 3);
        assert_eq!(lookup_le(&node, b"zzz"), 3);
    }

    #[test]
    fn test_lookup_le_falls_back_to_first_entry() {
        // Entry 0 is never compared, even when it sorts above the key.
        let node = leaf(&["m", "p"]);
        assert_eq!(lookup_le(&node, b"a"), 0);
        assert_eq!(lookup_le(&node, b"q"), 1);
    }

    #[test]
    fn test_should_merge_boundaries() {
        assert!(should_merge(MERGE_THRESHOLD, 100));
        assert!(!should_merge(MERGE_THRESHOLD + 1, 100));
        let sibling = PAGE_SIZE + NODE_HEADER_SIZE - MERGE_THRESHOLD;
        assert!(should_merge(MERGE_THRESHOLD, sibling));
        assert!(!should_merge(MERGE_THRESHOLD, sibling + 1));
    }

    #[test]
    fn test_insert_into_empty_tree() {
        let (mut store, root) = setup();
        let root = insert(&mut store, root, b"a", b"1").unwrap();
        assert_ne!(root, NULL_PAGE);

        let node = store.read_page(root).unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Leaf);
        let entries: Vec<_> = node.entries().collect();
        assert_eq!(entries, vec![(&b""[..], &b""[..]), (&b"a"[..], &b"1"[..])]);
    }

    #[test]
    fn test_insert_replaces_root_page() {
        let (mut store, mut root) = setup();
        let mut seen = Vec::new();
        for i in [7u8, 2, 9, 0, 5] {
            let old_root = root;
            root = insert(&mut store, root, &[b'a' + i], &vec![i; i as usize]).unwrap();
            assert!(!seen.contains(&root), "page {root} handed out twice");
            seen.push(root);
            if old_root != NULL_PAGE {
                assert!(!store.contains(old_root));
            }
            assert_eq!(store.page_count(), 1);
            assert_eq!(store.allocations() - store.frees(), 1);
        }
        for i in [0u8, 2, 5, 7, 9] {
            assert_eq!(search(&store, root, &[b'a' + i]).unwrap(), Some(vec![i; i as usize]));
        }
        assert_eq!(search(&store, root, b"b").unwrap(), None);
    }

    #[test]
    fn test_split_accounts_for_every_page() {
        let (mut store, mut root) = setup();
        let mut last = None;
        for i in 0..60u32 {
            let key = format!("{:04}", i * 37 % 60);
            root = insert(&mut store, root, key.as_bytes(), &[0u8; 150]).unwrap();
            let stats = verify(&store, root).unwrap();
            assert_eq!(stats.internal_pages + stats.leaf_pages, store.page_count());
            assert_eq!(store.allocations() - store.frees(), store.page_count() as u64);
            // Each insert rewrites one page per level, plus one per split.
            if let Some((allocations, height)) = last {
                assert!(store.allocations() - allocations >= height as u64);
            }
            last = Some((store.allocations(), stats.height));
        }
        assert!(verify(&store, root).unwrap().height >= 2);
    }

    #[test]
    fn test_insert_overwrites() {
        let (mut store, mut root) = setup();
        root = insert(&mut store, root, b"key", b"old_value").unwrap();
        root = insert(&mut store, root, b"key", b"new_value").unwrap();
        let result = search(&store, root, b"key").unwrap();
        assert_eq!(result, Some(b"new_value".to_vec()));

        let node = store.read_page(root).unwrap();
        assert_eq!(node.key_count(), 2);
    }

    #[test]
    fn test_insert_is_copy_on_write() {
        let (mut store, mut root) = setup();
        root = insert(&mut store, root, b"a", b"1").unwrap();
        let old_root = root;
        root = insert(&mut store, root, b"b", b"2").unwrap();
        assert_ne!(root, old_root);
        assert!(!store.contains(old_root));
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn test_search_missing() {
        let (mut store, mut root) = setup();
        root = insert(&mut store, root, b"exists", b"yes").unwrap();
        assert_eq!(search(&store, root, b"missing").unwrap(), None);
        assert_eq!(search(&store, root, b"").unwrap(), None);
    }

    #[test]
    fn test_empty_tree_search() {
        let (store, root) = setup();
        assert_eq!(search(&store, root, b"anything").unwrap(), None);
    }

    #[test]
    fn test_leaf_split() {
        let (mut store, mut root) = setup();
        for i in 0..100u32 {
            let key = format!("key_{i:05}");
            let val = format!("value_{i:05}_padding_to_make_it_bigger");
            root = insert(&mut store, root, key.as_bytes(), val.as_bytes()).unwrap();
        }

        for i in 0..100u32 {
            let key = format!("key_{i:05}");
            let val = format!("value_{i:05}_padding_to_make_it_bigger");
            let result = search(&store, root, key.as_bytes()).unwrap();
            assert_eq!(result, Some(val.into_bytes()), "failed to find key {key}");
        }

        let root_node = store.read_page(root).unwrap();
        assert_eq!(
            root_node.node_type().unwrap(),
            NodeType::Internal,
            "root should be internal after splits"
        );
        assert!(root_node.key_count() >= 2);
        assert!(root_node.key(0).is_empty());
    }

    #[test]
    fn test_multi_level_split() {
        let (mut store, mut root) = setup();
        // Large values and long keys keep fan-out low on both levels.
        let padding = "x".repeat(1000);
        let key_padding = "k".repeat(200);
        for i in 0..1000u32 {
            let key = format!("{key_padding}{i:06}");
            let val = format!("v{i:06}_{padding}");
            root = insert(&mut store, root, key.as_bytes(), val.as_bytes()).unwrap();
        }

        for i in (0..1000u32).step_by(7) {
            let key = format!("{key_padding}{i:06}");
            let val = format!("v{i:06}_{padding}");
            let result = search(&store, root, key.as_bytes()).unwrap();
            assert_eq!(result, Some(val.into_bytes()), "failed at key {i:06}");
        }

        let depth = depth(&store, root);
        assert!(depth >= 3, "expected depth >= 3, got {depth}");
    }

    #[test]
    fn test_insert_reverse_order() {
        let (mut store, mut root) = setup();
        for i in (0..300u32).rev() {
            let key = format!("rev_{i:05}");
            root = insert(&mut store, root, key.as_bytes(), b"v").unwrap();
        }
        let results = range_scan(&store, root, None, None).unwrap();
        assert_eq!(results.len(), 300);
        assert!(results.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_insert_max_sized_entries() {
        let (mut store, mut root) = setup();
        for i in 0..20u8 {
            let mut key = vec![b'k'; MAX_KEY_SIZE];
            key[MAX_KEY_SIZE - 1] = i;
            root = insert(&mut store, root, &key, &vec![i; MAX_VALUE_SIZE]).unwrap();
        }
        for i in 0..20u8 {
            let mut key = vec![b'k'; MAX_KEY_SIZE];
            key[MAX_KEY_SIZE - 1] = i;
            assert_eq!(
                search(&store, root, &key).unwrap(),
                Some(vec![i; MAX_VALUE_SIZE])
            );
        }
    }

    #[test]
    #[should_panic(expected = "key must not be empty")]
    fn test_insert_empty_key_panics() {
        let (mut store, root) = setup();
        let _ = insert(&mut store, root, b"", b"v");
    }

    #[test]
    #[should_panic(expected = "exceeds the 1000 byte limit")]
    fn test_insert_oversized_key_panics() {
        let (mut store, root) = setup();
        let _ = insert(&mut store, root, &[b'k'; MAX_KEY_SIZE + 1], b"v");
    }

    #[test]
    #[should_panic(expected = "exceeds the 3000 byte limit")]
    fn test_insert_oversized_value_panics() {
        let (mut store, root) = setup();
        let _ = insert(&mut store, root, b"k", &[0; MAX_VALUE_SIZE + 1]);
    }

    #[test]
    fn test_delete_basic() {
        let (mut store, mut root) = setup();
        root = insert(&mut store, root, b"key1", b"val1").unwrap();
        root = insert(&mut store, root, b"key2", b"val2").unwrap();

        let (found, new_root) = delete(&mut store, root, b"key1").unwrap();
        assert!(found);
        root = new_root;
        assert_eq!(search(&store, root, b"key1").unwrap(), None);
        assert_eq!(
            search(&store, root, b"key2").unwrap(),
            Some(b"val2".to_vec())
        );
    }

    #[test]
    fn test_delete_nonexistent() {
        let (mut store, mut root) = setup();
        root = insert(&mut store, root, b"key1", b"val1").unwrap();
        let (allocations, frees) = (store.allocations(), store.frees());

        let (found, new_root) = delete(&mut store, root, b"nope").unwrap();
        assert!(!found);
        assert_eq!(new_root, root);
        assert_eq!(store.allocations(), allocations);
        assert_eq!(store.frees(), frees);
        assert_eq!(
            search(&store, root, b"key1").unwrap(),
            Some(b"val1".to_vec())
        );
    }

    #[test]
    fn test_delete_from_empty_tree() {
        let (mut store, root) = setup();
        assert_eq!(delete(&mut store, root, b"a").unwrap(), (false, NULL_PAGE));
    }

    #[test]
    fn test_delete_last_key_empties_tree() {
        let (mut store, mut root) = setup();
        root = insert(&mut store, root, b"only", b"1").unwrap();
        let (found, root) = delete(&mut store, root, b"only").unwrap();
        assert!(found);
        assert_eq!(root, NULL_PAGE);
        assert_eq!(store.page_count(), 0);
    }

    #[test]
    fn test_delete_collapses_root() {
        let (mut store, mut root) = setup();
        let value = vec![b'v'; 500];
        for i in 0..40u32 {
            let key = format!("key{i:03}");
            root = insert(&mut store, root, key.as_bytes(), &value).unwrap();
        }
        assert!(depth(&store, root) >= 2);

        for i in 1..40u32 {
            let key = format!("key{i:03}");
            let (found, new_root) = delete(&mut store, root, key.as_bytes()).unwrap();
            assert!(found, "key{i:03} missing");
            root = new_root;
        }

        assert_eq!(depth(&store, root), 1);
        assert_eq!(store.page_count(), 1);
        assert_eq!(search(&store, root, b"key000").unwrap(), Some(value));
    }

    #[test]
    fn test_interleaved_edits_free_every_replaced_page() {
        let (mut store, mut root) = setup();
        let key = |i: u32| format!("{:08x}", i.wrapping_mul(0x9e37_79b9)).into_bytes();
        for i in 0..600u32 {
            root = insert(&mut store, root, &key(i), &i.to_le_bytes()).unwrap();
            if i % 3 == 2 {
                let (found, new_root) = delete(&mut store, root, &key(i - 1)).unwrap();
                assert!(found);
                root = new_root;
            }
            let stats = verify(&store, root).unwrap();
            assert_eq!(stats.internal_pages + stats.leaf_pages, store.page_count());
            assert_eq!(store.allocations() - store.frees(), store.page_count() as u64);
        }

        for i in 0..600u32 {
            let expected = (i % 3 != 1).then(|| i.to_le_bytes().to_vec());
            assert_eq!(search(&store, root, &key(i)).unwrap(), expected, "key {i}");
        }
    }

    #[test]
    fn test_range_scan_is_read_only() {
        let (mut store, mut root) = setup();
        for i in 0..20u32 {
            let key = format!("k{i:03}");
            root = insert(&mut store, root, key.as_bytes(), &[i as u8; 3]).unwrap();
        }
        let (allocations, frees) = (store.allocations(), store.frees());

        let results = range_scan(&store, root, Some(b"k004x"), Some(b"k009")).unwrap();
        let expected: Vec<KeyValuePair> = (5..9u32)
            .map(|i| (format!("k{i:03}").into_bytes(), vec![i as u8; 3]))
            .collect();
        assert_eq!(results, expected);
        assert_eq!(store.allocations(), allocations);
        assert_eq!(store.frees(), frees);
    }

    #[test]
    fn test_range_scan_full_excludes_sentinel() {
        let (mut store, mut root) = setup();
        for i in 0..10u32 {
            let key = format!("k{i:03}");
            root = insert(&mut store, root, key.as_bytes(), b"v").unwrap();
        }

        let results = range_scan(&store, root, None, None).unwrap();
        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|(k, _)| !k.is_empty()));
    }

    #[test]
    fn test_range_scan_with_splits() {
        let (mut store, mut root) = setup();
        let padding = "p".repeat(100);
        for i in 0..500u32 {
            let key = format!("k{i:05}");
            root = insert(&mut store, root, key.as_bytes(), padding.as_bytes()).unwrap();
        }
        assert!(depth(&store, root) >= 2);

        let results = range_scan(&store, root, Some(b"k00100"), Some(b"k00400")).unwrap();
        assert_eq!(results.len(), 300);
        assert_eq!(results[0].0, b"k00100");
        assert_eq!(results[299].0, b"k00399");

        let head = range_scan(&store, root, None, Some(b"k00050")).unwrap();
        assert_eq!(head.len(), 50);
        let tail = range_scan(&store, root, Some(b"k00450"), None).unwrap();
        assert_eq!(tail.len(), 50);
    }

    #[test]
    fn test_range_scan_after_deletes() {
        let (mut store, mut root) = setup();
        for i in 0..10u32 {
            let key = format!("k{i:03}");
            root = insert(&mut store, root, key.as_bytes(), b"v").unwrap();
        }
        (_, root) = delete(&mut store, root, b"k003").unwrap();
        (_, root) = delete(&mut store, root, b"k007").unwrap();

        let keys: Vec<Vec<u8>> = range_scan(&store, root, None, None)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys.len(), 8);
        assert!(!keys.contains(&b"k003".to_vec()));
        assert!(!keys.contains(&b"k007".to_vec()));
    }

    #[test]
    fn test_empty_tree_range_scan() {
        let (store, root) = setup();
        assert!(range_scan(&store, root, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_delete_splits_parent_grown_by_longer_separator() {
        let mut store = InMemoryPageStore::new();
        let b_long = format!("b{}", "x".repeat(MAX_KEY_SIZE - 1));
        let c = "c".repeat(MAX_KEY_SIZE);
        let d = "d".repeat(MAX_KEY_SIZE);
        let e = "e".repeat(MAX_KEY_SIZE);
        let f = "f".repeat(40);
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 0)]),
                sized_leaf(&[("b", 0), (b_long.as_str(), 100)]),
                sized_leaf(&[(c.as_str(), 0)]),
                sized_leaf(&[(d.as_str(), 0)]),
                sized_leaf(&[(e.as_str(), 0)]),
                sized_leaf(&[(f.as_str(), 0)]),
            ],
        );
        assert_eq!(store.read_page(root).unwrap().encoded_size(), 3129);

        // The separator "b" becomes `b_long`, pushing the root past a page.
        let (found, root) = delete(&mut store, root, b"b").unwrap();
        assert!(found);

        let stats = verify(&store, root).unwrap();
        assert_eq!(stats.height, 3);
        assert_eq!(stats.entries, 6);
        assert_eq!(stats.internal_pages + stats.leaf_pages, store.page_count());
        assert_eq!(search(&store, root, b"b").unwrap(), None);
        assert_eq!(
            search(&store, root, b_long.as_bytes()).unwrap(),
            Some(vec![b'v'; 100])
        );
        for key in ["a", c.as_str(), d.as_str(), e.as_str(), f.as_str()] {
            assert_eq!(search(&store, root, key.as_bytes()).unwrap(), Some(Vec::new()));
        }
    }

    #[test]
    fn test_delete_merges_child_at_threshold() {
        let mut store = InMemoryPageStore::new();
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 1)]),
                sized_leaf(&[("m", 1005), ("n", 0)]),
            ],
        );

        // The shrunken child is exactly `MERGE_THRESHOLD` bytes.
        let (found, root) = delete(&mut store, root, b"n").unwrap();
        assert!(found);
        assert_eq!(store.page_count(), 1);
        let node = store.read_page(root).unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Leaf);
        let keys: Vec<&[u8]> = node.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b""[..], &b"a"[..], &b"m"[..]]);
    }

    #[test]
    fn test_delete_keeps_child_above_threshold() {
        let mut store = InMemoryPageStore::new();
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 1)]),
                sized_leaf(&[("m", 1006), ("n", 0)]),
            ],
        );

        let (found, root) = delete(&mut store, root, b"n").unwrap();
        assert!(found);
        assert_eq!(store.page_count(), 3);
        let node = store.read_page(root).unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Internal);
        assert_eq!(node.key_count(), 2);
        assert_eq!(
            store.read_page(node.child(1)).unwrap().encoded_size(),
            MERGE_THRESHOLD + 1
        );
    }

    #[test]
    fn test_delete_merge_filling_exactly_one_page() {
        let mut store = InMemoryPageStore::new();
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 1500), ("b", 1528)]),
                sized_leaf(&[("m", 1005), ("n", 0)]),
            ],
        );

        let (_, root) = delete(&mut store, root, b"n").unwrap();
        assert_eq!(store.page_count(), 1);
        let node = store.read_page(root).unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Leaf);
        assert_eq!(node.encoded_size(), PAGE_SIZE);
    }

    #[test]
    fn test_delete_skips_merge_one_byte_over_a_page() {
        let mut store = InMemoryPageStore::new();
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 1500), ("b", 1529)]),
                sized_leaf(&[("m", 1005), ("n", 0)]),
            ],
        );

        let (_, root) = delete(&mut store, root, b"n").unwrap();
        assert_eq!(store.page_count(), 3);
        let node = store.read_page(root).unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Internal);
        assert_eq!(node.key_count(), 2);
        assert_eq!(verify(&store, root).unwrap().entries, 3);
    }

    #[test]
    fn test_delete_prefers_left_sibling() {
        let mut store = InMemoryPageStore::new();
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 1)]),
                sized_leaf(&[("m", 1005), ("n", 0)]),
                sized_leaf(&[("x", 1)]),
            ],
        );

        let (_, root) = delete(&mut store, root, b"n").unwrap();
        let node = store.read_page(root).unwrap();
        let separators: Vec<&[u8]> = (0..node.key_count()).map(|i| node.key(i)).collect();
        assert_eq!(separators, vec![&b""[..], &b"x"[..]]);
        let left = store.read_page(node.child(0)).unwrap();
        assert_eq!(left.key(2), b"m");
        assert_eq!(store.page_count(), 3);
    }

    #[test]
    fn test_delete_merges_right_when_left_is_full() {
        let mut store = InMemoryPageStore::new();
        let root = two_level(
            &mut store,
            &[
                sized_leaf(&[("", 0), ("a", 1500), ("b", 1529)]),
                sized_leaf(&[("m", 1005), ("n", 0)]),
                sized_leaf(&[("x", 1)]),
            ],
        );

        let (_, root) = delete(&mut store, root, b"n").unwrap();
        let node = store.read_page(root).unwrap();
        let separators: Vec<&[u8]> = (0..node.key_count()).map(|i| node.key(i)).collect();
        assert_eq!(separators, vec![&b""[..], &b"m"[..]]);
        let right = store.read_page(node.child(1)).unwrap();
        let keys: Vec<&[u8]> = right.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"m"[..], &b"x"[..]]);
        assert_eq!(store.page_count(), 3);
    }

    #[test]
    fn test_free_tree() {
        let (mut store, mut root) = setup();
        for i in 0..300u32 {
            let key = format!("free_{i:05}");
            root = insert(&mut store, root, key.as_bytes(), &[0u8; 64]).unwrap();
        }
        assert!(store.page_count() > 1);
        free_tree(&mut store, root).unwrap();
        assert_eq!(store.page_count(), 0);
    }

    #[test]
    fn test_corrupted_empty_page_is_rejected() {
        let mut store = InMemoryPageStore::new();
        let root = store.allocate_page(&leaf(&[])).unwrap();
        let err = search(&store, root, b"a").unwrap_err();
        assert!(matches!(err, StorageError::CorruptedPage(_)));
    }
}
