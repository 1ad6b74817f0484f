//! # Remove Engine
//!
//! Point deletion with underflow repair. A leaf that would drop below its
//! occupancy floor is refilled from a sibling (*borrow*) or folded into one
//! (*merge*):
//!
//! - The parent is refetched through the path stack and the node's position
//!   in it is recomputed from the key being removed — the search outcome
//!   distinguishes the key appearing as an exact separator from it sitting
//!   inside a subtree, and either maps to the child slot that was descended.
//! - The richer sibling is preferred, ties and the last-child position going
//!   left, the first-child position going right.
//! - A sibling above the floor lends one entry across the separator: leaves
//!   copy the border entry directly and rewrite the separator; non-leaves
//!   rotate through the parent separator and hand over the adjoining child
//!   pointer.
//! - Otherwise the two nodes and (for non-leaves) the separator between them
//!   fit in one block, so they merge; the emptied block is returned to the
//!   free map and the separator removal recurses into the parent.
//!
//! A root leaf simply shrinks; deleting its last entry empties the tree. A
//! root non-leaf left with no separators collapses into its single child,
//! shrinking the tree by one level.

use eyre::Result;

use crate::config::INVALID_OFFSET;

use super::node::{Node, SearchResult};
use super::tree::{BPlusTree, PathStack};

/// Which sibling the underflow repair works against.
enum Chosen {
    Left(Node),
    Right(Node),
}

impl BPlusTree {
    /// Removes `key`. Returns `Ok(false)` when the key is absent.
    pub fn remove(&mut self, key: i64) -> Result<bool> {
        if self.root_offset() == INVALID_OFFSET {
            return Ok(false);
        }

        let (mut leaf, mut path) = self.descend_to_leaf(key)?;
        let pos = match leaf.search(key) {
            SearchResult::NotFound(_) => {
                self.release_node(leaf);
                return Ok(false);
            }
            SearchResult::Found(pos) => pos,
        };

        if path.is_empty() {
            // The root is a leaf: no floor applies.
            if leaf.count() == 1 {
                self.free_node(leaf)?;
                self.set_root(INVALID_OFFSET);
                log::debug!("removed last key, tree is empty");
            } else {
                leaf.remove_from_leaf(pos);
                self.flush_node(leaf)?;
            }
            return Ok(true);
        }

        if leaf.count() > self.min_leaf_count() {
            leaf.remove_from_leaf(pos);
            self.flush_node(leaf)?;
            return Ok(true);
        }

        self.rebalance_leaf(leaf, pos, key, &mut path)?;
        Ok(true)
    }

    /// Repairs a non-root leaf sitting at its occupancy floor while losing
    /// the entry at `pos`.
    fn rebalance_leaf(
        &mut self,
        mut leaf: Node,
        pos: usize,
        key: i64,
        path: &mut PathStack,
    ) -> Result<()> {
        let parent_offset = path.pop().expect("non-root leaf has a parent");
        let mut parent = self.load_node(parent_offset)?;
        let child_idx = parent.search(key).child_index();

        match self.choose_sibling(&parent, child_idx)? {
            Chosen::Left(mut sibling) => {
                if sibling.count() > self.min_leaf_count() {
                    // Borrow the left sibling's largest entry.
                    leaf.remove_from_leaf(pos);
                    let donor = sibling.count() - 1;
                    let (bk, bv) = (sibling.key(donor), sibling.value(donor));
                    sibling.set_count(donor);
                    leaf.insert_into_leaf(0, bk, bv);
                    parent.set_key(child_idx - 1, bk);

                    self.flush_node(sibling)?;
                    self.flush_node(leaf)?;
                    self.flush_node(parent)
                } else {
                    // Fold the leaf into its left sibling.
                    log::debug!(
                        "merging leaf at {} into left sibling at {}",
                        leaf.self_offset(),
                        sibling.self_offset()
                    );
                    leaf.remove_from_leaf(pos);
                    let base = sibling.count();
                    for i in 0..leaf.count() {
                        sibling.set_key(base + i, leaf.key(i));
                        sibling.set_value(base + i, leaf.value(i));
                    }
                    sibling.set_count(base + leaf.count());

                    sibling.set_next(leaf.next());
                    if leaf.next() != INVALID_OFFSET {
                        let mut succ = self.load_node(leaf.next())?;
                        succ.set_prev(sibling.self_offset());
                        self.flush_node(succ)?;
                    }

                    self.free_node(leaf)?;
                    self.flush_node(sibling)?;

                    parent.remove_from_nonleaf(child_idx - 1);
                    self.compact_nonleaf(parent, key, path)
                }
            }
            Chosen::Right(mut sibling) => {
                if sibling.count() > self.min_leaf_count() {
                    // Borrow the right sibling's smallest entry.
                    leaf.remove_from_leaf(pos);
                    let (bk, bv) = (sibling.key(0), sibling.value(0));
                    sibling.remove_from_leaf(0);
                    let tail = leaf.count();
                    leaf.insert_into_leaf(tail, bk, bv);
                    parent.set_key(child_idx, sibling.key(0));

                    self.flush_node(sibling)?;
                    self.flush_node(leaf)?;
                    self.flush_node(parent)
                } else {
                    // Fold the right sibling into the leaf.
                    log::debug!(
                        "merging right sibling at {} into leaf at {}",
                        sibling.self_offset(),
                        leaf.self_offset()
                    );
                    leaf.remove_from_leaf(pos);
                    let base = leaf.count();
                    for i in 0..sibling.count() {
                        leaf.set_key(base + i, sibling.key(i));
                        leaf.set_value(base + i, sibling.value(i));
                    }
                    leaf.set_count(base + sibling.count());

                    leaf.set_next(sibling.next());
                    if sibling.next() != INVALID_OFFSET {
                        let mut succ = self.load_node(sibling.next())?;
                        succ.set_prev(leaf.self_offset());
                        self.flush_node(succ)?;
                    }

                    self.free_node(sibling)?;
                    self.flush_node(leaf)?;

                    parent.remove_from_nonleaf(child_idx);
                    self.compact_nonleaf(parent, key, path)
                }
            }
        }
    }

    /// Settles a non-leaf that has just lost one separator: flush when still
    /// at or above the floor, collapse the root when it runs empty, and
    /// borrow/merge against a sibling otherwise.
    fn compact_nonleaf(&mut self, node: Node, key: i64, path: &mut PathStack) -> Result<()> {
        if path.is_empty() {
            if node.count() == 0 {
                let only_child = node.child(0);
                self.free_node(node)?;
                self.set_root(only_child);
                log::debug!("tree shrank a level, new root at {}", only_child);
                return Ok(());
            }
            return self.flush_node(node);
        }

        if node.count() >= self.min_nonleaf_count() {
            return self.flush_node(node);
        }

        self.rebalance_nonleaf(node, key, path)
    }

    /// Repairs a non-root non-leaf that fell below its occupancy floor.
    fn rebalance_nonleaf(
        &mut self,
        mut node: Node,
        key: i64,
        path: &mut PathStack,
    ) -> Result<()> {
        let parent_offset = path.pop().expect("non-root node has a parent");
        let mut parent = self.load_node(parent_offset)?;
        let child_idx = parent.search(key).child_index();

        match self.choose_sibling(&parent, child_idx)? {
            Chosen::Left(mut sibling) => {
                if sibling.count() > self.min_leaf_count() {
                    // Rotate right: separator drops into the node, the
                    // sibling's largest key replaces it, the sibling's last
                    // child crosses over.
                    let count = node.count();
                    for i in (0..=count).rev() {
                        let child = node.child(i);
                        node.set_child(i + 1, child);
                    }
                    for i in (0..count).rev() {
                        node.set_key(i + 1, node.key(i));
                    }
                    node.set_key(0, parent.key(child_idx - 1));
                    node.set_child(0, sibling.child(sibling.count()));
                    node.set_count(count + 1);

                    let donor = sibling.count() - 1;
                    parent.set_key(child_idx - 1, sibling.key(donor));
                    if sibling.count() == self.degree() {
                        sibling.set_last_child(INVALID_OFFSET);
                    }
                    sibling.set_count(donor);

                    self.flush_node(sibling)?;
                    self.flush_node(node)?;
                    self.flush_node(parent)
                } else {
                    // Merge into the left sibling, separator as the bridge.
                    log::debug!(
                        "merging non-leaf at {} into left sibling at {}",
                        node.self_offset(),
                        sibling.self_offset()
                    );
                    let base = sibling.count();
                    sibling.set_key(base, parent.key(child_idx - 1));
                    for i in 0..node.count() {
                        sibling.set_key(base + 1 + i, node.key(i));
                    }
                    for i in 0..=node.count() {
                        let child = node.child(i);
                        sibling.set_child(base + 1 + i, child);
                    }
                    sibling.set_count(base + 1 + node.count());

                    self.free_node(node)?;
                    self.flush_node(sibling)?;

                    parent.remove_from_nonleaf(child_idx - 1);
                    self.compact_nonleaf(parent, key, path)
                }
            }
            Chosen::Right(mut sibling) => {
                if sibling.count() > self.min_leaf_count() {
                    // Rotate left: separator drops into the node, the
                    // sibling's smallest key replaces it, the sibling's
                    // first child crosses over.
                    let count = node.count();
                    node.set_key(count, parent.key(child_idx));
                    node.set_child(count + 1, sibling.child(0));
                    node.set_count(count + 1);

                    parent.set_key(child_idx, sibling.key(0));

                    let scount = sibling.count();
                    for i in 0..scount - 1 {
                        sibling.set_key(i, sibling.key(i + 1));
                    }
                    for i in 0..scount {
                        let child = sibling.child(i + 1);
                        sibling.set_child(i, child);
                    }
                    if scount == self.degree() {
                        sibling.set_last_child(INVALID_OFFSET);
                    }
                    sibling.set_count(scount - 1);

                    self.flush_node(sibling)?;
                    self.flush_node(node)?;
                    self.flush_node(parent)
                } else {
                    // Merge the right sibling into the node.
                    log::debug!(
                        "merging right sibling at {} into non-leaf at {}",
                        sibling.self_offset(),
                        node.self_offset()
                    );
                    let base = node.count();
                    node.set_key(base, parent.key(child_idx));
                    for i in 0..sibling.count() {
                        node.set_key(base + 1 + i, sibling.key(i));
                    }
                    for i in 0..=sibling.count() {
                        let child = sibling.child(i);
                        node.set_child(base + 1 + i, child);
                    }
                    node.set_count(base + 1 + sibling.count());

                    self.free_node(sibling)?;
                    self.flush_node(node)?;

                    parent.remove_from_nonleaf(child_idx);
                    self.compact_nonleaf(parent, key, path)
                }
            }
        }
    }

    /// Picks the sibling to repair against: the first child can only go
    /// right, the last only left; in between the richer sibling wins, ties
    /// going left.
    fn choose_sibling(&mut self, parent: &Node, child_idx: usize) -> Result<Chosen> {
        if child_idx == 0 {
            return Ok(Chosen::Right(self.load_node(parent.child(1))?));
        }
        if child_idx == parent.count() {
            return Ok(Chosen::Left(self.load_node(parent.child(child_idx - 1))?));
        }

        let left = self.load_node(parent.child(child_idx - 1))?;
        let right = self.load_node(parent.child(child_idx + 1))?;
        if left.count() >= right.count() {
            self.release_node(right);
            Ok(Chosen::Left(left))
        } else {
            self.release_node(left);
            Ok(Chosen::Right(right))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_tree() -> (tempfile::TempDir, BPlusTree) {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::open(dir.path().join("data.index"), 128).unwrap();
        (dir, tree)
    }

    fn seeded(n: i64) -> (tempfile::TempDir, BPlusTree) {
        let (dir, mut tree) = open_tree();
        for k in 1..=n {
            tree.insert(k, k).unwrap();
        }
        (dir, tree)
    }

    #[test]
    fn remove_from_empty_tree() {
        let (_dir, mut tree) = open_tree();
        assert!(!tree.remove(1).unwrap());
    }

    #[test]
    fn remove_absent_key_is_reported() {
        let (_dir, mut tree) = seeded(10);

        assert!(!tree.remove(99).unwrap());
        assert_eq!(tree.leaf_entries().unwrap().len(), 10);
        tree.verify().unwrap();
    }

    #[test]
    fn remove_from_root_leaf() {
        let (_dir, mut tree) = seeded(3);

        assert!(tree.remove(2).unwrap());
        tree.verify().unwrap();
        assert_eq!(tree.search(2).unwrap(), None);
        assert_eq!(tree.search(1).unwrap(), Some(1));
        assert_eq!(tree.search(3).unwrap(), Some(3));
    }

    #[test]
    fn removing_last_key_empties_tree_and_file() {
        let (_dir, mut tree) = seeded(1);

        assert!(tree.remove(1).unwrap());

        assert!(tree.is_empty());
        assert_eq!(tree.file_size(), 0);
        assert!(tree.free_blocks().is_empty());
        tree.verify().unwrap();
    }

    #[test]
    fn remove_middle_key_keeps_depth() {
        let (_dir, mut tree) = seeded(20);

        let mut out = Vec::new();
        tree.dump(&mut out).unwrap();
        let depth_before = out.iter().filter(|&&b| b == b'\n').count();

        assert!(tree.remove(10).unwrap());
        tree.verify().unwrap();

        assert_eq!(tree.search(10).unwrap(), None);
        let keys: Vec<i64> = tree.leaf_entries().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(keys, (1..=20).filter(|&k| k != 10).collect::<Vec<i64>>());

        let mut out = Vec::new();
        tree.dump(&mut out).unwrap();
        // One merge happened, so the line count drops by one node but the
        // tree keeps its two levels.
        assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), depth_before - 1);
    }

    #[test]
    fn reverse_removal_reclaims_every_block() {
        let (_dir, mut tree) = seeded(20);

        for k in (1..=20).rev() {
            assert!(tree.remove(k).unwrap(), "failed to remove {}", k);
            tree.verify().unwrap();
        }

        assert!(tree.is_empty());
        assert_eq!(tree.file_size(), 0);
        assert!(tree.free_blocks().is_empty());
    }

    #[test]
    fn forward_removal_drains_tree() {
        let (_dir, mut tree) = seeded(50);

        for k in 1..=50 {
            assert!(tree.remove(k).unwrap(), "failed to remove {}", k);
            tree.verify().unwrap();
        }

        assert!(tree.is_empty());
        assert!(tree.leaf_entries().unwrap().is_empty());
    }

    #[test]
    fn remove_reinsert_roundtrip() {
        let (_dir, mut tree) = seeded(20);

        assert!(tree.remove(13).unwrap());
        assert_eq!(tree.search(13).unwrap(), None);
        assert!(tree.insert(13, 13).unwrap());
        assert_eq!(tree.search(13).unwrap(), Some(13));
        tree.verify().unwrap();
    }

    #[test]
    fn alternating_removal_exercises_borrows() {
        let (_dir, mut tree) = seeded(60);

        for k in (2..=60).step_by(2) {
            assert!(tree.remove(k).unwrap(), "failed to remove {}", k);
            tree.verify().unwrap();
        }

        let keys: Vec<i64> = tree.leaf_entries().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(keys, (1..=59).step_by(2).collect::<Vec<i64>>());
    }

    #[test]
    fn freed_blocks_are_recycled_by_later_inserts() {
        let (_dir, mut tree) = seeded(20);

        for k in 5..=15 {
            tree.remove(k).unwrap();
        }
        let shrunk = tree.file_size();

        for k in 5..=15 {
            tree.insert(k, k).unwrap();
        }
        tree.verify().unwrap();

        // Reinsertion fills free blocks before growing the file again.
        assert!(tree.file_size() <= shrunk + tree.block_size() as u64);
        let keys: Vec<i64> = tree.leaf_entries().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(keys, (1..=20).collect::<Vec<i64>>());
    }
}
