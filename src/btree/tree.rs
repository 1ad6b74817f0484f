//! # B+ Tree Engine
//!
//! This module implements the tree proper: construction from the index/boot
//! file pair, root-to-leaf traversal, point search, the structural dump, the
//! linked-leaf scan, and the invariant verifier. The insert and remove
//! engines live in [`insert`](super::insert) and [`remove`](super::remove)
//! and build on the plumbing defined here.
//!
//! ## Traversal and the Path Stack
//!
//! Blocks carry no parent pointers. Each operation descends from the root,
//! pushing the byte offset of every non-leaf it passes onto a small scratch
//! stack. When an insert splits a leaf or a remove underflows one, the engine
//! pops that stack to find the parent again, fetching it fresh from the
//! cache. Only offsets are recorded — holding cached buffers for the whole
//! ancestor chain would turn a constant-size working set into one that grows
//! with tree depth.
//!
//! ```text
//! insert/remove:
//!   1. descend root → leaf, pushing non-leaf offsets
//!   2. act on the leaf
//!   3. on split/underflow: pop the stack, fetch the parent, recurse upward
//! ```
//!
//! ## Buffer Discipline
//!
//! Every node the engine touches is a checked-out cache buffer. A mutated
//! node is flushed (written back, then released); an untouched node is
//! released. Both paths return the buffer, so a public operation always ends
//! with the whole pool at rest. The root block is fetched through the
//! dedicated root buffer so a descent never charges it against the pool.
//!
//! ## Durability
//!
//! Mutations are flushed child-before-parent inside an operation, and the
//! boot file (root offset, file size, free list) is rewritten by
//! [`BPlusTree::persist`], on [`BPlusTree::close`], and best-effort on drop.
//! There is no crash-consistency: a mid-operation failure can leave the
//! index file inconsistent.

use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::config::INVALID_OFFSET;
use crate::storage::{
    degree_for_block_size, validate_block, BlockCache, BlockFile, BootRecord, FreeMap, NodeType,
};

use super::node::{Node, SearchResult};

/// Per-operation stack of ancestor block offsets, root first.
pub(crate) type PathStack = SmallVec<[u64; 8]>;

/// A disk-resident B+ tree mapping `i64` keys to `i64` values.
pub struct BPlusTree {
    file: BlockFile,
    boot_path: PathBuf,
    cache: BlockCache,
    free: FreeMap,
    root: u64,
    degree: usize,
    block_size: usize,
}

impl BPlusTree {
    /// Opens the tree at `path`, creating a fresh one when neither the index
    /// nor the boot file exists. A boot file on disk wins over the
    /// `block_size` argument.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let boot_path = PathBuf::from(format!("{}.boot", path.display()));

        let (root, block_size, file_size, free_blocks) = match BootRecord::load(&boot_path)? {
            Some(boot) => {
                if boot.block_size as usize != block_size {
                    log::debug!(
                        "boot file says block size {}, ignoring requested {}",
                        boot.block_size,
                        block_size
                    );
                }
                (
                    boot.root,
                    boot.block_size as usize,
                    boot.file_size,
                    boot.free_blocks,
                )
            }
            None => (INVALID_OFFSET, block_size, 0, Vec::new()),
        };

        let degree = degree_for_block_size(block_size)?;
        let file = BlockFile::open(path, block_size)?;
        let on_disk = file.len()?;
        ensure!(
            on_disk >= file_size,
            "index file {:?} is shorter ({}) than the boot file says ({})",
            path,
            on_disk,
            file_size
        );

        log::debug!(
            "opened {:?}: block size {}, degree {}, root {:#x}, {} free block(s)",
            path,
            block_size,
            degree,
            root,
            free_blocks.len()
        );

        Ok(Self {
            file,
            boot_path,
            cache: BlockCache::new(block_size),
            free: FreeMap::new(block_size as u64, file_size, free_blocks),
            root,
            degree,
            block_size,
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Offset of the root block; the sentinel for an empty tree.
    pub fn root_offset(&self) -> u64 {
        self.root
    }

    pub fn file_size(&self) -> u64 {
        self.free.file_size()
    }

    pub fn free_blocks(&self) -> &[u64] {
        self.free.free_blocks()
    }

    pub fn is_empty(&self) -> bool {
        self.root == INVALID_OFFSET
    }

    /// Smallest key count a non-root leaf may hold.
    pub(crate) fn min_leaf_count(&self) -> usize {
        self.degree.div_ceil(2)
    }

    /// Smallest key count a non-root non-leaf may hold (one fewer than a
    /// leaf: merges route the parent separator into the survivor).
    pub(crate) fn min_nonleaf_count(&self) -> usize {
        self.min_leaf_count() - 1
    }

    /// Writes the boot file and syncs the index file.
    pub fn persist(&mut self) -> Result<()> {
        let boot = BootRecord {
            root: self.root,
            block_size: self.block_size as u64,
            file_size: self.free.file_size(),
            free_blocks: self.free.free_blocks().to_vec(),
        };
        boot.save(&self.boot_path)?;
        self.file.sync()
    }

    /// Persists and consumes the tree.
    pub fn close(mut self) -> Result<()> {
        self.persist()
    }

    /// Point lookup.
    pub fn search(&mut self, key: i64) -> Result<Option<i64>> {
        if self.root == INVALID_OFFSET {
            return Ok(None);
        }

        let (leaf, _path) = self.descend_to_leaf(key)?;
        let found = match leaf.search(key) {
            SearchResult::Found(pos) => Some(leaf.value(pos)),
            SearchResult::NotFound(_) => None,
        };
        self.release_node(leaf);
        Ok(found)
    }

    /// Descends from the root to the leaf that owns `key`, recording the
    /// offsets of the non-leaves passed on the way.
    pub(crate) fn descend_to_leaf(&mut self, key: i64) -> Result<(Node, PathStack)> {
        debug_assert_ne!(self.root, INVALID_OFFSET);

        let mut path = PathStack::new();
        let mut node = self.load_root()?;

        while !node.is_leaf() {
            path.push(node.self_offset());
            let child = node.child(node.search(key).child_index());
            self.release_node(node);
            node = self.load_node(child)?;
        }

        Ok((node, path))
    }

    /// Fetches the root block into the dedicated root buffer.
    pub(crate) fn load_root(&mut self) -> Result<Node> {
        let buf = self.cache.acquire_root();
        self.read_into(buf, self.root)
    }

    /// Fetches the block at `offset` into a pool buffer.
    pub(crate) fn load_node(&mut self, offset: u64) -> Result<Node> {
        let buf = self.cache.acquire();
        self.read_into(buf, offset)
    }

    fn read_into(&mut self, mut buf: crate::storage::BlockBuf, offset: u64) -> Result<Node> {
        if let Err(e) = self.file.read_block(offset, buf.bytes_mut()) {
            self.cache.release(buf);
            return Err(e);
        }
        if let Err(e) = validate_block(buf.bytes(), self.degree, offset) {
            self.cache.release(buf);
            return Err(e);
        }
        Ok(Node::from_buf(buf, self.degree))
    }

    /// Creates a fresh node in a pool buffer and assigns it a block offset.
    pub(crate) fn new_node(&mut self, node_type: NodeType) -> Node {
        let mut node = Node::init(self.cache.acquire(), self.degree, node_type);
        node.set_self_offset(self.free.allocate());
        node
    }

    /// Writes the node back to its block and releases its buffer.
    pub(crate) fn flush_node(&mut self, node: Node) -> Result<()> {
        let offset = node.self_offset();
        debug_assert_ne!(offset, INVALID_OFFSET);
        let result = self.file.write_block(offset, node.bytes());
        self.cache.release(node.into_buf());
        result
    }

    /// Releases the node's buffer without writing.
    pub(crate) fn release_node(&mut self, node: Node) {
        self.cache.release(node.into_buf());
    }

    /// Returns the node's block to the free map and drops the buffer. When
    /// the release shrinks the file envelope the index file is truncated to
    /// match.
    pub(crate) fn free_node(&mut self, node: Node) -> Result<()> {
        let offset = node.self_offset();
        self.release_node(node);
        if self.free.release(offset) {
            self.file.truncate(self.free.file_size())?;
        }
        Ok(())
    }

    pub(crate) fn set_root(&mut self, offset: u64) {
        self.root = offset;
    }

    /// Preorder dump of the tree structure, one node per line, children
    /// indented under their parent.
    pub fn dump(&mut self, out: &mut dyn Write) -> Result<()> {
        if self.root == INVALID_OFFSET {
            writeln!(out, "<empty>")?;
            return Ok(());
        }
        self.dump_block(self.root, 0, out)
    }

    fn dump_block(&mut self, offset: u64, level: usize, out: &mut dyn Write) -> Result<()> {
        let node = self.load_node(offset)?;
        let count = node.count();
        let keys: Vec<i64> = (0..count).map(|i| node.key(i)).collect();
        let children: Vec<u64> = if node.is_leaf() {
            Vec::new()
        } else {
            (0..=count).map(|i| node.child(i)).collect()
        };
        let kind = if node.is_leaf() { "leaf" } else { "node" };
        self.release_node(node);

        writeln!(out, "{:indent$}{} {:?}", "", kind, keys, indent = level * 2)?;
        for child in children {
            self.dump_block(child, level + 1, out)?;
        }
        Ok(())
    }

    /// Every `(key, value)` pair in ascending key order, gathered by walking
    /// the leaf chain from the leftmost leaf.
    pub fn leaf_entries(&mut self) -> Result<Vec<(i64, i64)>> {
        let mut entries = Vec::new();
        if self.root == INVALID_OFFSET {
            return Ok(entries);
        }

        let mut offset = self.root;
        let mut node = loop {
            let node = self.load_node(offset)?;
            if node.is_leaf() {
                break node;
            }
            offset = node.child(0);
            self.release_node(node);
        };

        loop {
            for i in 0..node.count() {
                entries.push((node.key(i), node.value(i)));
            }
            let next = node.next();
            self.release_node(node);
            if next == INVALID_OFFSET {
                break;
            }
            node = self.load_node(next)?;
        }

        Ok(entries)
    }

    /// Writes every stored value in ascending key order.
    pub fn scan_leaves(&mut self, out: &mut dyn Write) -> Result<()> {
        let entries = self.leaf_entries()?;
        let mut first = true;
        for (_, value) in entries {
            if first {
                write!(out, "{}", value)?;
                first = false;
            } else {
                write!(out, " {}", value)?;
            }
        }
        writeln!(out)?;
        Ok(())
    }

    /// Full structural check: key ordering, occupancy bounds, separator
    /// fencing, saturated-child slot state, leaf-chain linkage, uniform leaf
    /// depth, and block accounting (live blocks and free blocks tile the
    /// file envelope exactly).
    pub fn verify(&mut self) -> Result<()> {
        let mut live = Vec::new();
        let mut leaves = Vec::new();

        if self.root != INVALID_OFFSET {
            self.verify_block(self.root, true, None, None, &mut live, &mut leaves)?;
        }

        // Leaf chain runs left-to-right over the leaves the walk discovered.
        for (idx, leaf) in leaves.iter().enumerate() {
            let expect_prev = if idx == 0 {
                INVALID_OFFSET
            } else {
                leaves[idx - 1].offset
            };
            let expect_next = if idx + 1 == leaves.len() {
                INVALID_OFFSET
            } else {
                leaves[idx + 1].offset
            };
            ensure!(
                leaf.prev == expect_prev,
                "leaf at {} has prev {:#x}, expected {:#x}",
                leaf.offset,
                leaf.prev,
                expect_prev
            );
            ensure!(
                leaf.next == expect_next,
                "leaf at {} has next {:#x}, expected {:#x}",
                leaf.offset,
                leaf.next,
                expect_next
            );
        }

        let depths: Vec<usize> = leaves.iter().map(|l| l.depth).collect();
        if let Some(&first) = depths.first() {
            ensure!(
                depths.iter().all(|&d| d == first),
                "leaves at unequal depths: {:?}",
                depths
            );
        }

        // Live blocks plus free blocks tile [0, file_size) exactly.
        let mut all: Vec<u64> = live.iter().copied().chain(self.free.free_blocks().iter().copied()).collect();
        all.sort_unstable();
        let block = self.block_size as u64;
        ensure!(
            all.len() as u64 * block == self.free.file_size(),
            "{} live + {} free blocks do not fill {} bytes",
            live.len(),
            self.free.free_blocks().len(),
            self.free.file_size()
        );
        for (idx, &offset) in all.iter().enumerate() {
            ensure!(
                offset == idx as u64 * block,
                "block accounting gap or overlap at offset {}",
                offset
            );
        }

        Ok(())
    }

    fn verify_block(
        &mut self,
        offset: u64,
        is_root: bool,
        lower: Option<i64>,
        upper: Option<i64>,
        live: &mut Vec<u64>,
        leaves: &mut Vec<LeafInfo>,
    ) -> Result<(i64, i64, usize)> {
        live.push(offset);

        let node = self.load_node(offset)?;
        let count = node.count();
        let is_leaf = node.is_leaf();
        let keys: Vec<i64> = (0..count).map(|i| node.key(i)).collect();
        let children: Vec<u64> = if is_leaf {
            Vec::new()
        } else {
            (0..=count).map(|i| node.child(i)).collect()
        };
        let prev = node.prev();
        let next = node.next();
        let last_child = node.last_child();
        self.release_node(node);

        ensure!(count >= 1, "node at {} is empty", offset);
        if is_root {
            ensure!(count <= self.degree, "root at {} overflows", offset);
        } else {
            let floor = if is_leaf {
                self.min_leaf_count()
            } else {
                self.min_nonleaf_count()
            };
            ensure!(
                count >= floor && count <= self.degree,
                "node at {} holds {} keys, allowed {}..={}",
                offset,
                count,
                floor,
                self.degree
            );
        }

        for pair in keys.windows(2) {
            ensure!(
                pair[0] < pair[1],
                "keys out of order at {}: {} then {}",
                offset,
                pair[0],
                pair[1]
            );
        }
        if let Some(lower) = lower {
            ensure!(
                keys[0] >= lower,
                "key {} at {} below subtree bound {}",
                keys[0],
                offset,
                lower
            );
        }
        if let Some(upper) = upper {
            ensure!(
                keys[count - 1] < upper,
                "key {} at {} above subtree bound {}",
                keys[count - 1],
                offset,
                upper
            );
        }

        if is_leaf {
            ensure!(
                last_child == INVALID_OFFSET,
                "leaf at {} carries a last-child pointer",
                offset
            );
            leaves.push(LeafInfo {
                offset,
                prev,
                next,
                depth: 0,
            });
            return Ok((keys[0], keys[count - 1], 0));
        }

        ensure!(
            prev == INVALID_OFFSET && next == INVALID_OFFSET,
            "non-leaf at {} carries leaf-chain pointers",
            offset
        );
        if count == self.degree {
            ensure!(
                last_child != INVALID_OFFSET,
                "saturated non-leaf at {} has no last child",
                offset
            );
        } else {
            ensure!(
                last_child == INVALID_OFFSET,
                "non-leaf at {} holds {} keys but has a last child",
                offset,
                count
            );
        }

        let leaf_watermark = leaves.len();
        let mut depth = None;
        for (idx, &child) in children.iter().enumerate() {
            let child_lower = if idx == 0 { lower } else { Some(keys[idx - 1]) };
            let child_upper = if idx == count { upper } else { Some(keys[idx]) };
            let (_, _, child_depth) =
                self.verify_block(child, false, child_lower, child_upper, live, leaves)?;
            match depth {
                None => depth = Some(child_depth),
                Some(d) => ensure!(
                    d == child_depth,
                    "children of {} at unequal depths",
                    offset
                ),
            }
        }
        let depth = depth.unwrap() + 1;
        for leaf in &mut leaves[leaf_watermark..] {
            leaf.depth += 1;
        }

        Ok((keys[0], keys[count - 1], depth))
    }
}

struct LeafInfo {
    offset: u64,
    prev: u64,
    next: u64,
    depth: usize,
}

impl Drop for BPlusTree {
    fn drop(&mut self) {
        if let Err(e) = self.persist() {
            log::error!("failed to persist boot file on drop: {e}");
        }
    }
}
