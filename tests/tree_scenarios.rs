//! End-to-end scenarios for the on-disk B+ tree: ordered and shuffled
//! insertion, deletion down to an empty file, duplicate rejection, and
//! close/reopen persistence. Every mutation batch is followed by a full
//! structural verification.

use std::collections::BTreeMap;

use blocktree::BPlusTree;
use tempfile::tempdir;

fn open_tree(dir: &tempfile::TempDir) -> BPlusTree {
    BPlusTree::open(dir.path().join("data.index"), 128).unwrap()
}

fn leaf_keys(tree: &mut BPlusTree) -> Vec<i64> {
    tree.leaf_entries().unwrap().iter().map(|e| e.0).collect()
}

/// Greatest indentation level in the dump, i.e. the tree depth.
fn depth(tree: &mut BPlusTree) -> usize {
    let mut out = Vec::new();
    tree.dump(&mut out).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| line.chars().take_while(|&c| c == ' ').count() / 2 + 1)
        .max()
        .unwrap_or(0)
}

#[test]
fn ascending_insert_then_point_lookups() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);

    for k in 1..=10 {
        assert!(tree.insert(k, k).unwrap());
        tree.verify().unwrap();
    }

    for k in 1..=10 {
        assert_eq!(tree.search(k).unwrap(), Some(k));
    }
    assert_eq!(tree.search(0).unwrap(), None);
    assert_eq!(tree.search(11).unwrap(), None);

    let mut out = Vec::new();
    tree.scan_leaves(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "1 2 3 4 5 6 7 8 9 10\n");
}

#[test]
fn shuffled_insert_yields_key_order() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);

    for k in [5i64, 2, 8, 1, 9, 3, 7, 4, 6, 10] {
        assert!(tree.insert(k, k).unwrap());
        tree.verify().unwrap();
    }

    let mut out = Vec::new();
    tree.scan_leaves(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "1 2 3 4 5 6 7 8 9 10\n");
}

#[test]
fn single_removal_keeps_depth_and_order() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);

    for k in 1..=20 {
        tree.insert(k, k).unwrap();
    }
    let depth_before = depth(&mut tree);

    assert!(tree.remove(10).unwrap());
    tree.verify().unwrap();

    assert_eq!(tree.search(10).unwrap(), None);
    assert_eq!(
        leaf_keys(&mut tree),
        (1..=20).filter(|&k| k != 10).collect::<Vec<i64>>()
    );
    assert_eq!(depth(&mut tree), depth_before);
}

#[test]
fn reverse_removal_returns_file_to_zero() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);

    for k in 1..=20 {
        tree.insert(k, k).unwrap();
    }

    for k in (1..=20).rev() {
        assert!(tree.remove(k).unwrap(), "failed to remove {}", k);
        tree.verify().unwrap();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.file_size(), 0);
    assert!(tree.free_blocks().is_empty());
}

#[test]
fn duplicate_insert_leaves_file_bytes_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.index");
    let mut tree = BPlusTree::open(&path, 128).unwrap();

    for k in 1..=20 {
        tree.insert(k, k).unwrap();
    }
    assert_eq!(tree.search(5).unwrap(), Some(5));

    let image_before = std::fs::read(&path).unwrap();
    assert!(!tree.insert(5, 5).unwrap());
    let image_after = std::fs::read(&path).unwrap();

    assert_eq!(image_before, image_after);
    assert_eq!(tree.search(5).unwrap(), Some(5));
}

#[test]
fn close_and_reopen_preserves_every_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.index");

    {
        let mut tree = BPlusTree::open(&path, 128).unwrap();
        for k in 1..=100 {
            assert!(tree.insert(k, k).unwrap());
        }
        tree.close().unwrap();
    }

    let mut tree = BPlusTree::open(&path, 128).unwrap();
    tree.verify().unwrap();
    for k in 1..=100 {
        assert_eq!(tree.search(k).unwrap(), Some(k));
    }
    assert_eq!(leaf_keys(&mut tree), (1..=100).collect::<Vec<i64>>());
}

#[test]
fn reopen_after_removals_accounts_for_free_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.index");

    {
        let mut tree = BPlusTree::open(&path, 128).unwrap();
        for k in 1..=50 {
            tree.insert(k, k * 11).unwrap();
        }
        for k in 20..=35 {
            tree.remove(k).unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = BPlusTree::open(&path, 128).unwrap();
    tree.verify().unwrap();
    for k in 1..=50 {
        let expect = if (20..=35).contains(&k) { None } else { Some(k * 11) };
        assert_eq!(tree.search(k).unwrap(), expect, "key {}", k);
    }
}

#[test]
fn mixed_workload_matches_in_memory_oracle() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);
    let mut oracle: BTreeMap<i64, i64> = BTreeMap::new();

    // Deterministic LCG so the workload replays identically.
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        state >> 33
    };

    for step in 0..2000 {
        let key = (next() % 300) as i64;
        if next() % 3 == 0 {
            let expect = oracle.remove(&key).is_some();
            assert_eq!(tree.remove(key).unwrap(), expect, "remove {} at step {}", key, step);
        } else {
            let value = key * 1000 + 1;
            let expect = !oracle.contains_key(&key);
            oracle.entry(key).or_insert(value);
            assert_eq!(tree.insert(key, value).unwrap(), expect, "insert {} at step {}", key, step);
        }

        if step % 50 == 0 {
            tree.verify().unwrap();
        }
    }
    tree.verify().unwrap();

    let entries = tree.leaf_entries().unwrap();
    let expected: Vec<(i64, i64)> = oracle.iter().map(|(&k, &v)| (k, v)).collect();
    assert_eq!(entries, expected);

    for (&k, &v) in &oracle {
        assert_eq!(tree.search(k).unwrap(), Some(v));
    }
}

#[test]
fn larger_blocks_derive_larger_degree() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("wide.index"), 4096).unwrap();

    assert_eq!(tree.degree(), (4096 - 40) / 16);

    for k in 1..=5000 {
        assert!(tree.insert(k, -k).unwrap());
    }
    tree.verify().unwrap();

    for k in [1, 2500, 5000] {
        assert_eq!(tree.search(k).unwrap(), Some(-k));
    }
    assert_eq!(tree.leaf_entries().unwrap().len(), 5000);
}
