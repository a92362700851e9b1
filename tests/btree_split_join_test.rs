//! Split, merge and redistribution scenarios at branching factor 3.
//!
//! Every scenario starts from keys 5, 6, 7, 8, 3, 4, 2, 1 inserted in that
//! order, which builds:
//! ```text
//!                 g[5]
//!          ┌───────┴───────┐
//!        c[3]            f[7]
//!      ┌──┴──┐         ┌──┴──┐
//!   a(1,2) e(3,4)   d(5,6) b(7,8)
//! ```
//! and then removes keys in two different orders, checking the exact shape,
//! counters and deleted nodes after each step. Each scenario runs twice:
//! once fully in memory, and once flushing after every step with a cache
//! of one node, so every step starts from re-materialized nodes.

use cowtree::{BTree, BTreeConfig, Error, MemoryPageStore, NodeId};

type Tree = BTree<u32, String>;

fn value(k: u32) -> String {
    format!("v{}", k)
}

/// Compact rendering: nodes as `[keys]{children}`, leaves as `(keys)`.
fn shape(tree: &Tree) -> String {
    fn render(tree: &Tree, id: NodeId, out: &mut String) {
        let snap = tree.snapshot(id).unwrap();
        let keys: Vec<String> = snap.keys.iter().map(|k| k.to_string()).collect();
        match snap.children() {
            None => {
                out.push('(');
                out.push_str(&keys.join(","));
                out.push(')');
            }
            Some(children) => {
                out.push('[');
                out.push_str(&keys.join(","));
                out.push_str("]{");
                for (i, &child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    render(tree, child, out);
                }
                out.push('}');
            }
        }
    }

    let mut out = String::new();
    render(tree, tree.root_id(), &mut out);
    out
}

fn counters(tree: &Tree) -> (usize, usize, usize, usize) {
    (
        tree.height(),
        tree.node_count(),
        tree.leaf_count(),
        tree.entry_count(),
    )
}

/// Identities of the eight-key tree, named as in the module docs.
struct Named {
    a: NodeId,
    b: NodeId,
    c: NodeId,
    d: NodeId,
    e: NodeId,
    f: NodeId,
    g: NodeId,
}

fn children(tree: &Tree, id: NodeId) -> Vec<NodeId> {
    tree.snapshot(id).unwrap().children().unwrap().to_vec()
}

fn name_nodes(tree: &Tree) -> Named {
    let g = tree.root_id();
    let top = children(tree, g);
    let (c, f) = (top[0], top[1]);
    let left = children(tree, c);
    let right = children(tree, f);
    Named {
        a: left[0],
        e: left[1],
        d: right[0],
        b: right[1],
        c,
        f,
        g,
    }
}

struct Harness {
    tree: Tree,
    flush_each_step: bool,
}

impl Harness {
    fn new(flush_each_step: bool) -> Self {
        let config = if flush_each_step {
            BTreeConfig::new(3).with_cache_capacity(1)
        } else {
            BTreeConfig::new(3)
        };
        let tree = BTree::new(config, MemoryPageStore::new()).unwrap();
        Self {
            tree,
            flush_each_step,
        }
    }

    fn step(&mut self) {
        if self.flush_each_step {
            self.tree.flush().unwrap();
        }
        self.tree.validate().unwrap();
    }

    fn insert(&mut self, k: u32) {
        assert_eq!(self.tree.insert(k, value(k)).unwrap(), None);
        self.step();
    }

    fn remove(&mut self, k: u32) {
        assert_eq!(self.tree.remove(&k).unwrap(), Some(value(k)));
        assert_eq!(self.tree.lookup(&k).unwrap(), None);
        self.step();
    }

    fn build_eight(&mut self) -> Named {
        for k in [5, 6, 7, 8] {
            self.insert(k);
        }
        // Scenario A, first half.
        assert_eq!(shape(&self.tree), "[7]{(5,6) (7,8)}");

        for k in [3, 4, 2, 1] {
            self.insert(k);
        }
        assert_eq!(
            shape(&self.tree),
            "[5]{[3]{(1,2) (3,4)} [7]{(5,6) (7,8)}}"
        );
        assert_eq!(counters(&self.tree), (2, 3, 4, 8));
        name_nodes(&self.tree)
    }

    fn assert_deleted(&self, ids: &[NodeId]) {
        for &id in ids {
            assert!(self.tree.is_deleted(id), "{} should be deleted", id);
            assert!(matches!(
                self.tree.snapshot(id),
                Err(Error::UseAfterDelete(found)) if found == id
            ));
        }
    }

    fn assert_live(&self, ids: &[NodeId]) {
        for &id in ids {
            assert!(!self.tree.is_deleted(id), "{} should be live", id);
        }
    }
}

// =============================================================================
// Scenario A: insertion
// =============================================================================

#[test]
fn test_insert_sequence_builds_three_levels() {
    for flush in [false, true] {
        let mut h = Harness::new(flush);
        let n = h.build_eight();

        assert_eq!(h.tree.snapshot(n.c).unwrap().keys, vec![3]);
        assert_eq!(h.tree.snapshot(n.f).unwrap().keys, vec![7]);
        for k in 1..=8 {
            assert_eq!(h.tree.lookup(&k).unwrap(), Some(value(k)));
        }
        assert_eq!(h.tree.lookup(&9).unwrap(), None);
        assert_eq!(h.tree.first_key().unwrap(), Some(1));
        assert_eq!(h.tree.last_key().unwrap(), Some(8));
    }
}

// =============================================================================
// Scenarios B, C, D: remove 1, 2, 4, 8, 6, 7, 3, 5
// =============================================================================

#[test]
fn test_remove_ascending_edge_first() {
    for flush in [false, true] {
        let mut h = Harness::new(flush);
        let n = h.build_eight();

        // Scenario B: two merges cascade and the root collapses.
        h.remove(1);
        assert_eq!(shape(&h.tree), "[5,7]{(2,3,4) (5,6) (7,8)}");
        assert_eq!(h.tree.root_id(), n.c);
        assert_eq!(counters(&h.tree), (1, 1, 3, 7));
        h.assert_deleted(&[n.e, n.f, n.g]);
        h.assert_live(&[n.a, n.b, n.c, n.d]);

        // No rebalance needed.
        h.remove(2);
        assert_eq!(shape(&h.tree), "[5,7]{(3,4) (5,6) (7,8)}");
        assert_eq!(counters(&h.tree), (1, 1, 3, 6));

        // Merge with the right sibling.
        h.remove(4);
        assert_eq!(shape(&h.tree), "[7]{(3,5,6) (7,8)}");
        assert_eq!(counters(&h.tree), (1, 1, 2, 5));
        h.assert_deleted(&[n.d]);

        // Scenario D: rightmost leaf borrows from its left sibling.
        h.remove(8);
        assert_eq!(shape(&h.tree), "[6]{(3,5) (6,7)}");
        assert_eq!(counters(&h.tree), (1, 1, 2, 4));
        assert_eq!(children(&h.tree, n.c), vec![n.a, n.b]);

        // Merge with the left sibling; the root collapses onto b.
        h.remove(6);
        assert_eq!(shape(&h.tree), "(3,5,7)");
        assert_eq!(h.tree.root_id(), n.b);
        assert_eq!(counters(&h.tree), (0, 0, 1, 3));
        h.assert_deleted(&[n.a, n.c]);

        // Scenario C tail: the root leaf has no minimum.
        h.remove(7);
        h.remove(3);
        h.remove(5);
        assert_eq!(shape(&h.tree), "()");
        assert_eq!(counters(&h.tree), (0, 0, 1, 0));
        assert_eq!(h.tree.root_id(), n.b);
        assert!(h.tree.is_empty());
        assert_eq!(h.tree.iter().count(), 0);
    }
}

// =============================================================================
// Remove 7, 3, 8, 2, 1, 4, 6, 5
// =============================================================================

#[test]
fn test_remove_from_right_subtree_first() {
    for flush in [false, true] {
        let mut h = Harness::new(flush);
        let n = h.build_eight();

        // Leaf merges left, node merges left, root collapses onto f.
        h.remove(7);
        assert_eq!(shape(&h.tree), "[3,5]{(1,2) (3,4) (5,6,8)}");
        assert_eq!(h.tree.root_id(), n.f);
        assert_eq!(counters(&h.tree), (1, 1, 3, 7));
        h.assert_deleted(&[n.c, n.d, n.g]);
        assert_eq!(children(&h.tree, n.f), vec![n.a, n.e, n.b]);

        // Borrow from the right sibling.
        h.remove(3);
        assert_eq!(shape(&h.tree), "[3,6]{(1,2) (4,5) (6,8)}");
        assert_eq!(counters(&h.tree), (1, 1, 3, 6));

        // The rightmost leaf absorbs its left sibling.
        h.remove(8);
        assert_eq!(shape(&h.tree), "[3]{(1,2) (4,5,6)}");
        assert_eq!(counters(&h.tree), (1, 1, 2, 5));
        h.assert_deleted(&[n.e]);

        h.remove(2);
        assert_eq!(shape(&h.tree), "[5]{(1,4) (5,6)}");

        h.remove(1);
        assert_eq!(shape(&h.tree), "(4,5,6)");
        assert_eq!(h.tree.root_id(), n.a);
        assert_eq!(counters(&h.tree), (0, 0, 1, 3));
        h.assert_deleted(&[n.b, n.f]);

        h.remove(4);
        h.remove(6);
        h.remove(5);
        assert_eq!(shape(&h.tree), "()");
        assert_eq!(counters(&h.tree), (0, 0, 1, 0));
    }
}

// =============================================================================
// Node-level redistribution
// =============================================================================

#[test]
fn test_node_borrows_child_from_right_sibling() {
    let mut tree: Tree = BTree::in_memory(3).unwrap();
    for k in [5, 6, 7, 8, 3, 4, 2, 1, 9, 10] {
        tree.insert(k, value(k)).unwrap();
        tree.validate().unwrap();
    }
    // 9 and 10 give the right node a third child.
    assert_eq!(
        shape(&tree),
        "[5]{[3]{(1,2) (3,4)} [7,9]{(5,6) (7,8) (9,10)}}"
    );

    // a underflows and merges with e; c is left with one child and
    // borrows f's first child, rotating separators through the root.
    tree.remove(&1).unwrap();
    tree.validate().unwrap();
    assert_eq!(
        shape(&tree),
        "[7]{[5]{(2,3,4) (5,6)} [9]{(7,8) (9,10)}}"
    );
    assert_eq!(counters(&tree), (2, 3, 4, 9));
}

#[test]
fn test_node_borrows_child_from_left_sibling() {
    let mut tree: Tree = BTree::in_memory(3).unwrap();
    for k in [50, 60, 70, 80, 30, 40, 20, 10, 15, 17] {
        tree.insert(k, value(k)).unwrap();
        tree.validate().unwrap();
    }
    // 15 and 17 give the left node a third child.
    assert_eq!(
        shape(&tree),
        "[50]{[17,30]{(10,15) (17,20) (30,40)} [70]{(50,60) (70,80)}}"
    );
    let moved = children(&tree, children(&tree, tree.root_id())[0])[2];

    // The rightmost leaf merges left, then its node borrows the left
    // node's last child.
    tree.remove(&80).unwrap();
    tree.validate().unwrap();
    assert_eq!(
        shape(&tree),
        "[30]{[17]{(10,15) (17,20)} [50]{(30,40) (50,60,70)}}"
    );
    assert_eq!(counters(&tree), (2, 3, 4, 9));

    let right_node = children(&tree, tree.root_id())[1];
    assert_eq!(tree.snapshot(moved).unwrap().parent, Some(right_node));
}
