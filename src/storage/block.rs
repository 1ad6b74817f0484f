//! # Block Header Layout and Degree Derivation
//!
//! Every block in the index file stores exactly one tree node. A block starts
//! with a fixed 40-byte header followed by the key array and the payload
//! array; the payload slots hold values for a leaf and child offsets for a
//! non-leaf.
//!
//! ## Block Layout
//!
//! ```text
//! Offset          Size        Field        Description
//! ------          ----        -----------  ----------------------------------
//! 0               8           self_offset  Byte offset of this block in the file
//! 8               8           prev         Previous leaf in the chain (leaves only)
//! 16              8           next         Next leaf in the chain (leaves only)
//! 24              8           last_child   (DEGREE+1)-th child of a saturated non-leaf
//! 32              4           node_type    0 = leaf, 1 = non-leaf
//! 36              4           count        Number of keys stored
//! 40              8*DEGREE    keys         i64 key slots, strictly ascending
//! 40+8*DEGREE     8*DEGREE    payload      i64 values (leaf) / u64 children (non-leaf)
//! ```
//!
//! Offsets that can be absent (`prev`, `next`, `last_child`, and the root
//! recorded in the boot file) hold [`INVALID_OFFSET`](crate::config::INVALID_OFFSET).
//! `last_child` is live exactly when a non-leaf holds `DEGREE` keys: a node
//! with `count` keys has `count + 1` children, and the saturated case needs
//! one more pointer than the payload array can carry.
//!
//! ## Degree
//!
//! `DEGREE = (block_size - 40) / 16` — how many (key, offset) pairs fit after
//! the header. It is a property of the tree instance, derived once from the
//! block size at open time and required to be at least
//! [`MIN_DEGREE`](crate::config::MIN_DEGREE). A 128-byte block gives degree 5.
//!
//! ## Endianness
//!
//! All header and slot fields are little-endian, handled by the zerocopy
//! `U32`/`U64` wrappers. (The boot file is the big-endian exception; see
//! [`boot`](super::boot).)

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{INVALID_OFFSET, MIN_DEGREE};

/// Fixed header size at the start of every block.
pub const BLOCK_HEADER_SIZE: usize = 40;

/// Width of one key slot and of one payload slot (value or child offset).
pub const SLOT_WIDTH: usize = 8;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf = 0,
    NonLeaf = 1,
}

impl NodeType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(NodeType::Leaf),
            1 => Some(NodeType::NonLeaf),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockHeader {
    self_offset: U64,
    prev: U64,
    next: U64,
    last_child: U64,
    node_type: U32,
    count: U32,
}

const _: () = assert!(std::mem::size_of::<BlockHeader>() == BLOCK_HEADER_SIZE);

impl BlockHeader {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            self_offset: U64::new(INVALID_OFFSET),
            prev: U64::new(INVALID_OFFSET),
            next: U64::new(INVALID_OFFSET),
            last_child: U64::new(INVALID_OFFSET),
            node_type: U32::new(node_type as u32),
            count: U32::new(0),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= BLOCK_HEADER_SIZE,
            "buffer too small for BlockHeader: {} < {}",
            data.len(),
            BLOCK_HEADER_SIZE
        );

        Self::ref_from_bytes(&data[..BLOCK_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read BlockHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= BLOCK_HEADER_SIZE,
            "buffer too small for BlockHeader: {} < {}",
            data.len(),
            BLOCK_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut data[..BLOCK_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read BlockHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= BLOCK_HEADER_SIZE,
            "buffer too small for BlockHeader: {} < {}",
            data.len(),
            BLOCK_HEADER_SIZE
        );

        data[..BLOCK_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn self_offset(&self) -> u64 {
        self.self_offset.get()
    }

    pub fn set_self_offset(&mut self, offset: u64) {
        self.self_offset = U64::new(offset);
    }

    pub fn prev(&self) -> u64 {
        self.prev.get()
    }

    pub fn set_prev(&mut self, offset: u64) {
        self.prev = U64::new(offset);
    }

    pub fn next(&self) -> u64 {
        self.next.get()
    }

    pub fn set_next(&mut self, offset: u64) {
        self.next = U64::new(offset);
    }

    pub fn last_child(&self) -> u64 {
        self.last_child.get()
    }

    pub fn set_last_child(&mut self, offset: u64) {
        self.last_child = U64::new(offset);
    }

    pub fn node_type(&self) -> Option<NodeType> {
        NodeType::from_u32(self.node_type.get())
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.node_type = U32::new(node_type as u32);
    }

    pub fn count(&self) -> usize {
        self.count.get() as usize
    }

    pub fn set_count(&mut self, count: usize) {
        self.count = U32::new(count as u32);
    }
}

/// Derives the tree degree from the block size.
pub fn degree_for_block_size(block_size: usize) -> Result<usize> {
    ensure!(
        block_size > BLOCK_HEADER_SIZE,
        "block size {} does not fit the {}-byte block header",
        block_size,
        BLOCK_HEADER_SIZE
    );

    let degree = (block_size - BLOCK_HEADER_SIZE) / (2 * SLOT_WIDTH);
    ensure!(
        degree >= MIN_DEGREE,
        "block size {} derives degree {}, minimum is {}",
        block_size,
        degree,
        MIN_DEGREE
    );

    Ok(degree)
}

/// Validates a block read back from disk before the engine interprets it.
pub fn validate_block(data: &[u8], degree: usize, expected_offset: u64) -> Result<()> {
    let header = BlockHeader::from_bytes(data)?;

    ensure!(
        header.node_type().is_some(),
        "corrupt block at {}: invalid node type {:#x}",
        expected_offset,
        u32::from_le_bytes(data[32..36].try_into().unwrap())
    );

    ensure!(
        header.count() <= degree,
        "corrupt block at {}: count {} exceeds degree {}",
        expected_offset,
        header.count(),
        degree
    );

    ensure!(
        header.self_offset() == expected_offset,
        "corrupt block at {}: self offset field says {}",
        expected_offset,
        header.self_offset()
    );

    Ok(())
}
