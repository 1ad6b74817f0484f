//! # B+ Tree Engine
//!
//! The tree proper: one node per block, all entries in the leaves, leaves
//! threaded into a doubly-linked chain in ascending key order, non-leaves
//! holding separators and child offsets only.
//!
//! ## Node Shape
//!
//! A node holds up to `DEGREE` keys (derived from the block size at open
//! time, at least 3). A leaf pairs each key with a value; a non-leaf with
//! `count` keys has `count + 1` children, the extra pointer of a saturated
//! node living in the `last_child` header slot. Separators fence subtrees
//! half-open: everything under child `i` is `< keys[i]` and `>= keys[i-1]`.
//!
//! ## Occupancy
//!
//! Non-root leaves keep at least `ceil(DEGREE/2)` entries, non-root
//! non-leaves one fewer (a merge pulls the parent separator in as a bridge,
//! so their floor sits one below the leaves'). The root is exempt: a root
//! leaf may hold a single entry, and a root non-leaf that loses its last
//! separator collapses into its only child.
//!
//! ## Module Layout
//!
//! - [`node`]: the typed view over one cached block and the in-node
//!   primitives (binary search, shift-insert, shift-remove)
//! - [`tree`]: construction, traversal, search, dump, leaf scan, verifier
//! - [`insert`]: leaf/non-leaf splitting and separator propagation
//! - [`remove`]: borrow, merge, parent compaction, root collapse

mod insert;
mod node;
mod remove;
mod tree;

pub use node::{Node, SearchResult};
pub use tree::BPlusTree;
