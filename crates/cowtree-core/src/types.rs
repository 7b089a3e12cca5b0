//! Core types and the fixed size budget of a tree page.

/// Page identifier handed out by a [`PageStore`](crate::btree::PageStore).
///
/// `0` is never a valid page; it stands for "no page" and, as a root, for
/// the empty tree.
pub type PageId = u64;

/// The page id that means "no page".
pub const NULL_PAGE: PageId = 0;

/// Size of every page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of the node header: type tag (u16) + key count (u16).
pub const NODE_HEADER_SIZE: usize = 4;

/// Bytes per child pointer slot.
pub const POINTER_SIZE: usize = 8;

/// Bytes per offset table slot.
pub const OFFSET_SIZE: usize = 2;

/// Bytes of the key-length + value-length prefix of every KV record.
pub const KV_HEADER_SIZE: usize = 4;

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 1000;

/// Maximum value size in bytes.
pub const MAX_VALUE_SIZE: usize = 3000;

/// A rewritten child at or below this encoded size is a merge candidate.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

/// Capacity of a node under construction. Builders may overflow one page
/// until the splitter cuts the result back down.
pub const BUILD_BUFFER_SIZE: usize = 2 * PAGE_SIZE;

/// A node holding a single maximal entry must fit one page, otherwise the
/// splitter could be handed an entry it cannot place.
const _: () = assert!(
    NODE_HEADER_SIZE + POINTER_SIZE + OFFSET_SIZE + KV_HEADER_SIZE + MAX_KEY_SIZE + MAX_VALUE_SIZE
        <= PAGE_SIZE
);

/// A key-value pair returned by range scans.
pub type KeyValuePair = (Vec<u8>, Vec<u8>);
