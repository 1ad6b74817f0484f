//! # blocktree - Disk-Resident B+ Tree Index
//!
//! blocktree is a single-file B+ tree index mapping signed 64-bit keys to
//! signed 64-bit payloads. Every node occupies exactly one fixed-size block
//! inside the index file; a sidecar boot file records the tree metadata
//! (root offset, block size, file length, free-block list) between runs.
//!
//! ## Quick Start
//!
//! ```ignore
//! use blocktree::BPlusTree;
//!
//! let mut tree = BPlusTree::open("data.index", 128)?;
//! tree.insert(42, 4200)?;
//! assert_eq!(tree.search(42)?, Some(4200));
//! tree.remove(42)?;
//! tree.close()?;
//! ```
//!
//! ## Architecture
//!
//! The crate is layered, storage first:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        CLI (REPL, line grammar)      │
//! ├─────────────────────────────────────┤
//! │  B+ Tree Engine (insert/remove/scan) │
//! ├─────────────────────────────────────┤
//! │  Block Cache (fixed pool + root buf) │
//! ├─────────────────────────────────────┤
//! │  Block Codec │ Free Map │ Boot File  │
//! ├─────────────────────────────────────┤
//! │     Positioned Block I/O (pread)     │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! data.index        # fixed-size blocks, one node per block
//! data.index.boot   # root offset, block size, file size, free list
//! ```
//!
//! ## Design Points
//!
//! - **No parent pointers on disk**: each operation reconstructs the ancestor
//!   chain in a per-operation offset stack, keeping the block layout minimal
//!   and the in-memory working set constant-size.
//! - **Saturated child slot**: a non-leaf with `DEGREE` keys stores its
//!   `(DEGREE+1)`-th child pointer in a dedicated header field rather than
//!   widening the child array.
//! - **Bounded cache**: five pool buffers plus one root buffer cover the
//!   worst-case working set of a split or merge. Exhausting the pool is a
//!   design bug and panics.
//!
//! ## Module Overview
//!
//! - [`storage`]: block codec, positioned I/O, boot file, free map, cache
//! - [`btree`]: the tree engine and its traversal/split/merge algorithms
//! - [`cli`]: interactive prompt used by the `blocktree` binary
//!
//! ## Concurrency
//!
//! The engine is single-threaded and strictly synchronous. A `BPlusTree`
//! owns its files and caches exclusively; concurrent access is unsupported.

pub mod btree;
pub mod cli;
pub mod config;
pub mod storage;

pub use btree::BPlusTree;
