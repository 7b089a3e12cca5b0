//! Binary encoding of a B+Tree node inside one page buffer.
//!
//! ## Node layout
//!
//! ```text
//! [0..2]                type tag: u16 LE (1 = internal, 2 = leaf)
//! [2..4]                key count n: u16 LE
//! [4..4+8n]             child pointers: u64 BE, one per entry (0 in leaves)
//! [4+8n..4+10n]         offsets 1..=n: u16 LE, cumulative start of record i
//!                       in the KV region (offset 0 is implicit)
//! [4+10n..]             KV records
//! ```
//!
//! Each KV record: `[key_len: u16 LE][val_len: u16 LE][key bytes][val bytes]`.
//! Internal entries carry an empty value.
//!
//! Offset slot `n` marks the end of the KV region, so the encoded size of a
//! node is `kv_pos(n)`.
//!
//! Indices outside the documented range panic: they are caller bugs, never
//! data errors. Only a bad type tag, which can arrive from a damaged page, is
//! reported as [`StorageError::CorruptedPage`].

use std::fmt;

use crate::error::StorageError;
use crate::types::{
    BUILD_BUFFER_SIZE, KV_HEADER_SIZE, NODE_HEADER_SIZE, OFFSET_SIZE, PAGE_SIZE, POINTER_SIZE,
    PageId,
};

/// Discriminant values for node types stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NodeType {
    Internal = 1,
    Leaf = 2,
}

impl NodeType {
    /// Convert a u16 discriminant to a `NodeType`.
    pub fn from_u16(value: u16) -> Result<Self, StorageError> {
        match value {
            1 => Ok(NodeType::Internal),
            2 => Ok(NodeType::Leaf),
            other => Err(StorageError::CorruptedPage(format!(
                "invalid node type tag: {other}"
            ))),
        }
    }

    /// Return the u16 discriminant for this node type.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// One tree node backed by an owned byte buffer.
///
/// Nodes read from a store hold exactly one page. Nodes under construction
/// hold [`BUILD_BUFFER_SIZE`] bytes so a builder can overflow before the
/// splitter runs.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    buf: Vec<u8>,
}

impl Node {
    /// Create a zeroed node buffer sized for construction.
    pub fn new() -> Self {
        Self::with_capacity(BUILD_BUFFER_SIZE)
    }

    /// Create a zeroed node buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= NODE_HEADER_SIZE,
            "node capacity {capacity} smaller than header"
        );
        Self {
            buf: vec![0u8; capacity],
        }
    }

    /// Wrap raw page bytes. The buffer is padded to at least one page.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buf = vec![0u8; data.len().max(PAGE_SIZE)];
        buf[..data.len()].copy_from_slice(data);
        Self { buf }
    }

    // -- header ------------------------------------------------------------

    /// Read and validate the type tag.
    pub fn node_type(&self) -> Result<NodeType, StorageError> {
        NodeType::from_u16(read_u16(&self.buf, 0))
    }

    pub fn key_count(&self) -> u16 {
        read_u16(&self.buf, 2)
    }

    pub fn set_header(&mut self, node_type: NodeType, key_count: u16) {
        write_u16(&mut self.buf, 0, node_type.as_u16());
        write_u16(&mut self.buf, 2, key_count);
    }

    // -- child pointers ----------------------------------------------------

    /// Child page of entry `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= key_count()`.
    pub fn child(&self, idx: u16) -> PageId {
        let pos = self.pointer_pos(idx);
        u64::from_be_bytes(self.buf[pos..pos + POINTER_SIZE].try_into().unwrap())
    }

    /// # Panics
    ///
    /// Panics if `idx >= key_count()`.
    pub fn set_child(&mut self, idx: u16, page_id: PageId) {
        let pos = self.pointer_pos(idx);
        self.buf[pos..pos + POINTER_SIZE].copy_from_slice(&page_id.to_be_bytes());
    }

    fn pointer_pos(&self, idx: u16) -> usize {
        let n = self.key_count();
        assert!(idx < n, "child index {idx} out of range for {n} keys");
        NODE_HEADER_SIZE + POINTER_SIZE * idx as usize
    }

    // -- offset table ------------------------------------------------------

    /// Start of record `idx` relative to the KV region. `offset(key_count())`
    /// is the length of the KV region.
    ///
    /// # Panics
    ///
    /// Panics if `idx > key_count()`.
    pub fn offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        read_u16(&self.buf, self.offset_pos(idx))
    }

    /// # Panics
    ///
    /// Panics unless `1 <= idx <= key_count()`.
    pub fn set_offset(&mut self, idx: u16, offset: u16) {
        let pos = self.offset_pos(idx);
        write_u16(&mut self.buf, pos, offset);
    }

    fn offset_pos(&self, idx: u16) -> usize {
        let n = self.key_count();
        assert!(
            1 <= idx && idx <= n,
            "offset index {idx} out of range for {n} keys"
        );
        NODE_HEADER_SIZE + POINTER_SIZE * n as usize + OFFSET_SIZE * (idx as usize - 1)
    }

    // -- KV records --------------------------------------------------------

    /// Absolute byte position of record `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx > key_count()`.
    pub fn kv_pos(&self, idx: u16) -> usize {
        let n = self.key_count();
        assert!(idx <= n, "kv index {idx} out of range for {n} keys");
        NODE_HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * n as usize + self.offset(idx) as usize
    }

    /// # Panics
    ///
    /// Panics if `idx >= key_count()`.
    pub fn key(&self, idx: u16) -> &[u8] {
        let pos = self.record_pos(idx);
        let key_len = read_u16(&self.buf, pos) as usize;
        &self.buf[pos + KV_HEADER_SIZE..pos + KV_HEADER_SIZE + key_len]
    }

    /// # Panics
    ///
    /// Panics if `idx >= key_count()`.
    pub fn value(&self, idx: u16) -> &[u8] {
        let pos = self.record_pos(idx);
        let key_len = read_u16(&self.buf, pos) as usize;
        let val_len = read_u16(&self.buf, pos + 2) as usize;
        let start = pos + KV_HEADER_SIZE + key_len;
        &self.buf[start..start + val_len]
    }

    fn record_pos(&self, idx: u16) -> usize {
        let n = self.key_count();
        assert!(idx < n, "entry index {idx} out of range for {n} keys");
        self.kv_pos(idx)
    }

    /// Iterate over `(key, value)` pairs in entry order.
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        (0..self.key_count()).map(move |i| (self.key(i), self.value(i)))
    }

    // -- sizing ------------------------------------------------------------

    /// Total bytes used by header, pointers, offsets and all records.
    pub fn encoded_size(&self) -> usize {
        self.kv_pos(self.key_count())
    }

    /// Encoded size of a node holding only entries `[start, end)`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end` or `end > key_count()`.
    pub fn range_size(&self, start: u16, end: u16) -> usize {
        assert!(start <= end, "range start {start} after end {end}");
        let records = (self.offset(end) - self.offset(start)) as usize;
        NODE_HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * (end - start) as usize + records
    }

    pub fn fits_page(&self) -> bool {
        self.encoded_size() <= PAGE_SIZE
    }

    /// The encoded bytes of this node, without trailing slack.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.encoded_size()]
    }

    /// Size of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Raw buffer access (read-only).
    pub(crate) fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Raw buffer access (mutable).
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Check that the header, offset table and records are self-consistent
    /// and lie inside the buffer, without panicking on damaged input.
    pub fn validate(&self) -> Result<(), StorageError> {
        self.node_type()?;
        let n = self.key_count() as usize;
        let kv_start = NODE_HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * n;
        if kv_start > self.buf.len() {
            return Err(StorageError::CorruptedPage(format!(
                "{n} keys do not fit a {}-byte buffer",
                self.buf.len()
            )));
        }
        let mut prev = 0usize;
        for i in 1..=n {
            let off = read_u16(&self.buf, kv_start - OFFSET_SIZE * (n - i + 1)) as usize;
            let pos = kv_start + prev;
            if off < prev + KV_HEADER_SIZE || kv_start + off > self.buf.len() {
                return Err(StorageError::CorruptedPage(format!(
                    "offset {off} of entry {i} out of order or out of bounds"
                )));
            }
            let key_len = read_u16(&self.buf, pos) as usize;
            let val_len = read_u16(&self.buf, pos + 2) as usize;
            if prev + KV_HEADER_SIZE + key_len + val_len != off {
                return Err(StorageError::CorruptedPage(format!(
                    "record {} length does not match offset table",
                    i - 1
                )));
            }
            prev = off;
        }
        Ok(())
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node_type = self.node_type().ok();
        f.debug_struct("Node")
            .field("node_type", &node_type)
            .field("key_count", &self.key_count())
            .field("capacity", &self.buf.len())
            .finish()
    }
}

fn read_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap())
}

fn write_u16(buf: &mut [u8], pos: usize, value: u16) {
    buf[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
}
