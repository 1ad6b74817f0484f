//! # blocktree Configuration Constants
//!
//! Tree-wide constants, co-located so interdependent values stay in sync.
//!
//! ```text
//! INVALID_OFFSET (0xDEADBEEF)
//!       │
//!       ├─> "no such block" everywhere an offset can be absent: empty root,
//!       │   missing leaf sibling, unused last-child slot
//!       │
//!       └─> terminator record in the boot file (see storage::boot)
//!
//! MAX_CACHE_NUM (5)
//!       │
//!       └─> worst-case simultaneous working set of a split or merge:
//!           the node, its left sibling, its right sibling, its parent,
//!           and one freshly allocated sibling. The engine must never
//!           hold more pool buffers than this at once.
//!
//! MIN_DEGREE (3)
//!       │
//!       └─> below three keys per node the split arithmetic degenerates;
//!           BPlusTree::open rejects block sizes that derive less.
//! ```

/// Reserved offset meaning "no such block".
///
/// Doubles as the terminator record in the boot file, so it can never be a
/// valid block offset.
pub const INVALID_OFFSET: u64 = 0xDEAD_BEEF;

/// Number of general-purpose buffers in the block cache pool.
pub const MAX_CACHE_NUM: usize = 5;

/// Smallest degree the engine accepts.
pub const MIN_DEGREE: usize = 3;

/// Block size used by the binary when none is given on the command line.
pub const DEFAULT_BLOCK_SIZE: usize = 128;
