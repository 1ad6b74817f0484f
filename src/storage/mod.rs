//! # Storage Layer
//!
//! Everything below the tree engine: the on-disk block format, positioned
//! block I/O, the boot-file codec, the free-space map, and the fixed-size
//! block cache.
//!
//! ## Responsibilities
//!
//! - [`block`]: header layout shared by every node, degree derivation from
//!   the block size, read-back validation.
//! - [`io`]: one `pread`/`pwrite` per block at block-aligned offsets. The
//!   index file is the only file this module writes blocks to.
//! - [`boot`]: the sidecar metadata file — root offset, block size, file
//!   size and free list as 16-byte big-endian records.
//! - [`freelist`]: which offsets inside the file envelope are reusable, with
//!   cascading tail reclamation.
//! - [`cache`]: the bounded buffer pool the engine works through. Every block
//!   the engine touches lives in a checked-out cache buffer, and every
//!   mutated buffer is written back before its slot is released.
//!
//! ## Durability Model
//!
//! Mutated blocks are written back eagerly, but there is no write-ahead log
//! and no ordering guarantee beyond "children before parent" inside one
//! operation. A crash mid-operation can leave the index file inconsistent;
//! recovery is out of scope.

pub mod block;
pub mod boot;
pub mod cache;
pub mod freelist;
pub mod io;

pub use block::{
    degree_for_block_size, validate_block, BlockHeader, NodeType, BLOCK_HEADER_SIZE, SLOT_WIDTH,
};
pub use boot::{BootRecord, BOOT_RECORD_SIZE};
pub use cache::{BlockBuf, BlockCache, SlotId};
pub use freelist::FreeMap;
pub use io::BlockFile;
