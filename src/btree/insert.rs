//! # Insert Engine
//!
//! Point insertion with leaf and non-leaf splitting. The shape of a split is
//! chosen by where the newcomer lands relative to the split point:
//!
//! - **Leaf, low half**: a fresh *left* sibling takes the low half including
//!   the newcomer; the original leaf keeps the high half and donates its new
//!   first key as the separator. Splitting leftward keeps the original block
//!   (and its offset) on the side its parent pointer already names.
//! - **Leaf, high half**: symmetric, with a fresh *right* sibling; the
//!   separator is the right sibling's first key.
//! - **Non-leaf**: three cases around `split = DEGREE / 2`. Below the split
//!   point a left sibling absorbs the low prefix and the pre-split key at
//!   `split - 1` is promoted; exactly at the split point the incoming
//!   separator itself is promoted and the new right sibling adopts the
//!   incoming right child as its first child; above it the right sibling
//!   takes the high suffix with the newcomer spliced in and the key at
//!   `split` is promoted.
//!
//! Promotion walks the path stack: each level either absorbs the separator
//! with a simple in-place insert or splits again and passes a new separator
//! up. An empty stack means the root itself split (or the tree was empty)
//! and a new root block is written.
//!
//! Split routines flush the two child nodes they were handed; the surviving
//! pair of siblings is flushed by the level above. Every mutated block is
//! therefore written exactly once per operation.

use eyre::{bail, Result};

use crate::config::INVALID_OFFSET;
use crate::storage::NodeType;

use super::node::{Node, SearchResult};
use super::tree::{BPlusTree, PathStack};

impl BPlusTree {
    /// Inserts `(key, value)`. Returns `Ok(false)` and leaves the tree
    /// untouched when the key is already present.
    pub fn insert(&mut self, key: i64, value: i64) -> Result<bool> {
        if self.root_offset() == INVALID_OFFSET {
            let mut leaf = self.new_node(NodeType::Leaf);
            leaf.insert_into_leaf(0, key, value);
            let offset = leaf.self_offset();
            self.flush_node(leaf)?;
            self.set_root(offset);
            log::debug!("planted root leaf at {}", offset);
            return Ok(true);
        }

        let (mut leaf, mut path) = self.descend_to_leaf(key)?;
        let pos = match leaf.search(key) {
            SearchResult::Found(_) => {
                self.release_node(leaf);
                return Ok(false);
            }
            SearchResult::NotFound(pos) => pos,
        };

        if leaf.count() < self.degree() {
            leaf.insert_into_leaf(pos, key, value);
            self.flush_node(leaf)?;
            return Ok(true);
        }

        let split = (self.degree() + 1) / 2;
        log::debug!(
            "splitting leaf at {} (insert pos {}, split {})",
            leaf.self_offset(),
            pos,
            split
        );
        let (left, right, separator) = if pos < split {
            self.split_leaf_left(leaf, pos, key, value)?
        } else {
            self.split_leaf_right(leaf, pos, key, value)?
        };

        self.update_parent(left, right, separator, &mut path)?;
        Ok(true)
    }

    /// Splits a full leaf by carving off a new left sibling holding the low
    /// `split` entries (newcomer included). Returns `(left, right, separator)`
    /// where `right` is the original leaf.
    fn split_leaf_left(
        &mut self,
        mut leaf: Node,
        pos: usize,
        key: i64,
        value: i64,
    ) -> Result<(Node, Node, i64)> {
        let degree = self.degree();
        let split = (degree + 1) / 2;

        let mut left = self.new_node(NodeType::Leaf);

        // Thread the new sibling into the chain before the original leaf.
        left.set_prev(leaf.prev());
        left.set_next(leaf.self_offset());
        if leaf.prev() != INVALID_OFFSET {
            let mut pred = self.load_node(leaf.prev())?;
            pred.set_next(left.self_offset());
            self.flush_node(pred)?;
        }
        leaf.set_prev(left.self_offset());

        for m in 0..split {
            if m == pos {
                left.set_key(m, key);
                left.set_value(m, value);
            } else {
                let src = if m < pos { m } else { m - 1 };
                left.set_key(m, leaf.key(src));
                left.set_value(m, leaf.value(src));
            }
        }
        left.set_count(split);

        // The original leaf keeps the high entries, compacted to the front.
        let keep = degree - split + 1;
        for i in 0..keep {
            leaf.set_key(i, leaf.key(split - 1 + i));
            leaf.set_value(i, leaf.value(split - 1 + i));
        }
        leaf.set_count(keep);

        let separator = leaf.key(0);
        Ok((left, leaf, separator))
    }

    /// Splits a full leaf by carving off a new right sibling holding the
    /// high entries (newcomer included). Returns `(left, right, separator)`
    /// where `left` is the original leaf.
    fn split_leaf_right(
        &mut self,
        mut leaf: Node,
        pos: usize,
        key: i64,
        value: i64,
    ) -> Result<(Node, Node, i64)> {
        let degree = self.degree();
        let split = (degree + 1) / 2;

        let mut right = self.new_node(NodeType::Leaf);

        right.set_prev(leaf.self_offset());
        right.set_next(leaf.next());
        if leaf.next() != INVALID_OFFSET {
            let mut succ = self.load_node(leaf.next())?;
            succ.set_prev(right.self_offset());
            self.flush_node(succ)?;
        }
        leaf.set_next(right.self_offset());

        for m in split..=degree {
            let dst = m - split;
            if m == pos {
                right.set_key(dst, key);
                right.set_value(dst, value);
            } else {
                let src = if m < pos { m } else { m - 1 };
                right.set_key(dst, leaf.key(src));
                right.set_value(dst, leaf.value(src));
            }
        }
        right.set_count(degree + 1 - split);
        leaf.set_count(split);

        let separator = right.key(0);
        Ok((leaf, right, separator))
    }

    /// Carries a separator for the freshly split pair `(left, right)` one
    /// level up, splitting non-leaves as needed. An exhausted path stack
    /// means the root split and the tree grows a level.
    pub(crate) fn update_parent(
        &mut self,
        left: Node,
        right: Node,
        separator: i64,
        path: &mut PathStack,
    ) -> Result<()> {
        let parent_offset = match path.pop() {
            Some(offset) => offset,
            None => return self.grow_root(left, right, separator),
        };

        let mut parent = self.load_node(parent_offset)?;
        let pos = match parent.search(separator) {
            SearchResult::Found(_) => bail!(
                "corrupt tree: separator {} already present in non-leaf at {}",
                separator,
                parent_offset
            ),
            SearchResult::NotFound(pos) => pos,
        };

        if parent.count() < self.degree() {
            parent.insert_into_nonleaf(pos, separator, left.self_offset(), right.self_offset());
            self.flush_node(left)?;
            self.flush_node(right)?;
            self.flush_node(parent)?;
            return Ok(());
        }

        let split = self.degree() / 2;
        log::debug!(
            "splitting non-leaf at {} (separator pos {}, split {})",
            parent_offset,
            pos,
            split
        );
        let (new_left, new_right, promoted) = if pos < split {
            self.split_nonleaf_left(parent, pos, separator, left, right)?
        } else if pos == split {
            self.split_nonleaf_middle(parent, separator, left, right)?
        } else {
            self.split_nonleaf_right(parent, pos, separator, left, right)?
        };

        self.update_parent(new_left, new_right, promoted, path)
    }

    /// Replaces the root with a fresh non-leaf holding one separator over
    /// `(left, right)`.
    fn grow_root(&mut self, left: Node, right: Node, separator: i64) -> Result<()> {
        let mut root = self.new_node(NodeType::NonLeaf);
        root.set_key(0, separator);
        root.set_child(0, left.self_offset());
        root.set_child(1, right.self_offset());
        root.set_count(1);

        let offset = root.self_offset();
        self.flush_node(left)?;
        self.flush_node(right)?;
        self.flush_node(root)?;
        self.set_root(offset);
        log::debug!("tree grew a level, new root at {}", offset);
        Ok(())
    }

    /// Non-leaf split, separator landing below the split point: a new left
    /// sibling takes the low prefix plus the newcomer; the key that sat at
    /// `split - 1` is promoted.
    fn split_nonleaf_left(
        &mut self,
        mut node: Node,
        pos: usize,
        separator: i64,
        child_left: Node,
        child_right: Node,
    ) -> Result<(Node, Node, i64)> {
        let degree = self.degree();
        let split = degree / 2;

        let mut left = self.new_node(NodeType::NonLeaf);

        for m in 0..split {
            if m == pos {
                left.set_key(m, separator);
            } else {
                let src = if m < pos { m } else { m - 1 };
                left.set_key(m, node.key(src));
            }
        }
        for i in 0..=split {
            let child = if i < pos {
                node.child(i)
            } else if i == pos {
                child_left.self_offset()
            } else if i == pos + 1 {
                child_right.self_offset()
            } else {
                node.child(i - 1)
            };
            left.set_child(i, child);
        }
        left.set_count(split);

        let promoted = node.key(split - 1);

        // Compact the original down over the promoted key; its saturated
        // extra child folds back into the payload array.
        let keep = degree - split;
        for i in 0..keep {
            node.set_key(i, node.key(split + i));
        }
        for i in 0..=keep {
            node.set_child(i, node.child(split + i));
        }
        node.set_last_child(INVALID_OFFSET);
        node.set_count(keep);

        self.flush_node(child_left)?;
        self.flush_node(child_right)?;
        Ok((left, node, promoted))
    }

    /// Non-leaf split, separator landing exactly on the split point: the
    /// separator itself is promoted; the new right sibling adopts the
    /// incoming right child as its first child and the high suffix after it.
    fn split_nonleaf_middle(
        &mut self,
        mut node: Node,
        separator: i64,
        child_left: Node,
        child_right: Node,
    ) -> Result<(Node, Node, i64)> {
        let degree = self.degree();
        let split = degree / 2;

        let mut right = self.new_node(NodeType::NonLeaf);

        for i in 0..degree - split {
            right.set_key(i, node.key(split + i));
        }
        right.set_child(0, child_right.self_offset());
        for i in 1..=degree - split {
            right.set_child(i, node.child(split + i));
        }
        right.set_count(degree - split);

        node.set_child(split, child_left.self_offset());
        node.set_last_child(INVALID_OFFSET);
        node.set_count(split);

        self.flush_node(child_left)?;
        self.flush_node(child_right)?;
        Ok((node, right, separator))
    }

    /// Non-leaf split, separator landing above the split point: the original
    /// keeps the low `split` keys, the new right sibling takes the high
    /// suffix with the newcomer spliced in, and the key at `split` is
    /// promoted.
    fn split_nonleaf_right(
        &mut self,
        mut node: Node,
        pos: usize,
        separator: i64,
        child_left: Node,
        child_right: Node,
    ) -> Result<(Node, Node, i64)> {
        let degree = self.degree();
        let split = degree / 2;

        let mut right = self.new_node(NodeType::NonLeaf);

        for m in split + 1..=degree {
            let dst = m - split - 1;
            let key = if m < pos {
                node.key(m)
            } else if m == pos {
                separator
            } else {
                node.key(m - 1)
            };
            right.set_key(dst, key);
        }
        for i in 0..=degree - split {
            let src = split + 1 + i;
            let child = if src < pos {
                node.child(src)
            } else if src == pos {
                child_left.self_offset()
            } else if src == pos + 1 {
                child_right.self_offset()
            } else {
                node.child(src - 1)
            };
            right.set_child(i, child);
        }
        right.set_count(degree - split);

        let promoted = node.key(split);
        node.set_last_child(INVALID_OFFSET);
        node.set_count(split);

        self.flush_node(child_left)?;
        self.flush_node(child_right)?;
        Ok((node, right, promoted))
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

    #[test]
    fn insert_and_search_single_key() {
        let (_dir, mut tree) = open_tree();

        assert!(tree.insert(42, 4200).unwrap());

        assert_eq!(tree.search(42).unwrap(), Some(4200));
        assert_eq!(tree.search(41).unwrap(), None);
        tree.verify().unwrap();
    }

    #[test]
    fn duplicate_insert_is_rejected_without_mutation() {
        let (_dir, mut tree) = open_tree();

        assert!(tree.insert(7, 70).unwrap());
        assert!(!tree.insert(7, 71).unwrap());

        assert_eq!(tree.search(7).unwrap(), Some(70));
        tree.verify().unwrap();
    }

    #[test]
    fn sequential_inserts_split_leaves() {
        let (_dir, mut tree) = open_tree();

        for k in 1..=10 {
            assert!(tree.insert(k, k).unwrap());
            tree.verify().unwrap();
        }

        for k in 1..=10 {
            assert_eq!(tree.search(k).unwrap(), Some(k));
        }
        assert_eq!(tree.search(0).unwrap(), None);
        assert_eq!(tree.search(11).unwrap(), None);

        let keys: Vec<i64> = tree.leaf_entries().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(keys, (1..=10).collect::<Vec<i64>>());
    }

    #[test]
    fn descending_inserts_exercise_left_splits() {
        let (_dir, mut tree) = open_tree();

        for k in (1..=40).rev() {
            assert!(tree.insert(k, -k).unwrap());
            tree.verify().unwrap();
        }

        for k in 1..=40 {
            assert_eq!(tree.search(k).unwrap(), Some(-k));
        }

        let keys: Vec<i64> = tree.leaf_entries().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(keys, (1..=40).collect::<Vec<i64>>());
    }

    #[test]
    fn interleaved_inserts_keep_order() {
        let (_dir, mut tree) = open_tree();

        for k in [5i64, 2, 8, 1, 9, 3, 7, 4, 6, 10] {
            assert!(tree.insert(k, k).unwrap());
            tree.verify().unwrap();
        }

        let keys: Vec<i64> = tree.leaf_entries().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(keys, (1..=10).collect::<Vec<i64>>());
    }

    #[test]
    fn root_split_grows_depth_once() {
        let (_dir, mut tree) = open_tree();

        // Degree 5: six inserts force the first leaf split and a fresh root.
        for k in 1..=6 {
            tree.insert(k, k).unwrap();
        }

        let mut out = Vec::new();
        tree.dump(&mut out).unwrap();
        let dump = String::from_utf8(out).unwrap();
        assert!(dump.starts_with("node"));
        assert_eq!(dump.lines().count(), 3);
        tree.verify().unwrap();
    }

    #[test]
    fn saturated_root_uses_last_child_slot() {
        let (_dir, mut tree) = open_tree();

        // 1..=20 ascending leaves the root with five separators and six
        // children, the sixth reachable only through the last-child slot.
        for k in 1..=20 {
            tree.insert(k, k).unwrap();
        }
        tree.verify().unwrap();

        for k in 1..=20 {
            assert_eq!(tree.search(k).unwrap(), Some(k));
        }
    }

    #[test]
    fn deep_tree_from_many_inserts() {
        let (_dir, mut tree) = open_tree();

        for k in 1..=500 {
            assert!(tree.insert(k, k * 3).unwrap());
        }
        tree.verify().unwrap();

        for k in 1..=500 {
            assert_eq!(tree.search(k).unwrap(), Some(k * 3));
        }
        assert_eq!(tree.leaf_entries().unwrap().len(), 500);
    }
}
