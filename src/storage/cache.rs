//! # Block Cache
//!
//! A fixed pool of [`MAX_CACHE_NUM`] block-sized buffers plus one dedicated
//! root buffer. The pool is sized to the worst-case simultaneous working set
//! of a split or merge: the node itself, its left sibling, its right sibling,
//! its parent, and one freshly allocated sibling. An engine that needs a
//! sixth pool buffer at once is wrong by construction, so exhaustion panics
//! rather than erroring.
//!
//! ## Checkout Model
//!
//! A buffer is either resting in the cache or checked out as a [`BlockBuf`]
//! that owns the bytes and remembers its home slot. There is no way to
//! observe a buffer without checking it out, and no way to check one out
//! twice — the "in use" flag of the original design is the `Option` emptiness
//! of the slot itself, so the flag can never be forgotten on acquisition.
//! Slots are identified by [`SlotId`], never by address arithmetic.
//!
//! Every buffer returns to its own slot on release; releasing into an
//! occupied slot panics, catching double-release bugs at the boundary.

use crate::config::MAX_CACHE_NUM;

/// Identity of a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotId {
    /// The dedicated root buffer.
    Root,
    /// One of the general-purpose pool buffers.
    Pool(usize),
}

/// A block-sized buffer checked out of the cache.
#[derive(Debug)]
pub struct BlockBuf {
    bytes: Box<[u8]>,
    slot: SlotId,
}

impl BlockBuf {
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[derive(Debug)]
pub struct BlockCache {
    pool: [Option<Box<[u8]>>; MAX_CACHE_NUM],
    root: Option<Box<[u8]>>,
    block_size: usize,
}

impl BlockCache {
    pub fn new(block_size: usize) -> Self {
        Self {
            pool: std::array::from_fn(|_| Some(vec![0u8; block_size].into_boxed_slice())),
            root: Some(vec![0u8; block_size].into_boxed_slice()),
            block_size,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Checks out a pool buffer, zeroed.
    ///
    /// Panics when every pool buffer is already checked out; the pool is
    /// sized to the algorithmic working set, so exhaustion is a bug, not a
    /// runtime condition.
    pub fn acquire(&mut self) -> BlockBuf {
        for (idx, slot) in self.pool.iter_mut().enumerate() {
            if let Some(mut bytes) = slot.take() {
                bytes.fill(0);
                return BlockBuf {
                    bytes,
                    slot: SlotId::Pool(idx),
                };
            }
        }
        panic!("block cache exhausted: all {} pool buffers in use", MAX_CACHE_NUM);
    }

    /// Checks out the dedicated root buffer, zeroed.
    pub fn acquire_root(&mut self) -> BlockBuf {
        let mut bytes = self
            .root
            .take()
            .expect("root buffer already checked out");
        bytes.fill(0);
        BlockBuf {
            bytes,
            slot: SlotId::Root,
        }
    }

    /// Returns a buffer to its home slot.
    pub fn release(&mut self, buf: BlockBuf) {
        let BlockBuf { bytes, slot } = buf;
        let home = match slot {
            SlotId::Root => &mut self.root,
            SlotId::Pool(idx) => &mut self.pool[idx],
        };
        assert!(
            home.is_none(),
            "cache slot {:?} released while already occupied",
            slot
        );
        *home = Some(bytes);
    }

    /// Number of buffers currently checked out (root buffer included).
    pub fn in_use(&self) -> usize {
        let pool = self.pool.iter().filter(|slot| slot.is_none()).count();
        pool + usize::from(self.root.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycle() {
        let mut cache = BlockCache::new(128);

        let buf = cache.acquire();
        assert_eq!(buf.bytes().len(), 128);
        assert_eq!(cache.in_use(), 1);

        cache.release(buf);
        assert_eq!(cache.in_use(), 0);
    }

    #[test]
    fn acquired_buffers_are_zeroed() {
        let mut cache = BlockCache::new(128);

        let mut buf = cache.acquire();
        let slot = buf.slot();
        buf.bytes_mut().fill(0xFF);
        cache.release(buf);

        // Reacquire until the same slot comes back.
        loop {
            let buf = cache.acquire();
            if buf.slot() == slot {
                assert!(buf.bytes().iter().all(|&b| b == 0));
                break;
            }
        }
    }

    #[test]
    fn all_pool_buffers_are_distinct_slots() {
        let mut cache = BlockCache::new(128);

        let bufs: Vec<BlockBuf> = (0..MAX_CACHE_NUM).map(|_| cache.acquire()).collect();
        assert_eq!(cache.in_use(), MAX_CACHE_NUM);

        let mut slots: Vec<SlotId> = bufs.iter().map(|b| b.slot()).collect();
        slots.dedup();
        assert_eq!(slots.len(), MAX_CACHE_NUM);

        for buf in bufs {
            cache.release(buf);
        }
        assert_eq!(cache.in_use(), 0);
    }

    #[test]
    #[should_panic(expected = "block cache exhausted")]
    fn pool_exhaustion_panics() {
        let mut cache = BlockCache::new(128);

        let _held: Vec<BlockBuf> = (0..MAX_CACHE_NUM).map(|_| cache.acquire()).collect();
        let _ = cache.acquire();
    }

    #[test]
    fn root_buffer_is_separate_from_pool() {
        let mut cache = BlockCache::new(128);

        let root = cache.acquire_root();
        assert_eq!(root.slot(), SlotId::Root);

        // The pool is still fully available.
        let bufs: Vec<BlockBuf> = (0..MAX_CACHE_NUM).map(|_| cache.acquire()).collect();
        assert_eq!(cache.in_use(), MAX_CACHE_NUM + 1);

        cache.release(root);
        for buf in bufs {
            cache.release(buf);
        }
    }

    #[test]
    #[should_panic(expected = "root buffer already checked out")]
    fn double_root_acquire_panics() {
        let mut cache = BlockCache::new(128);

        let _root = cache.acquire_root();
        let _ = cache.acquire_root();
    }
}
