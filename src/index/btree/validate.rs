//! Structural consistency check and dump.

use std::collections::HashSet;

use crate::buffer::NodePool;
use crate::common::{Error, NodeId, Result};
use crate::index::btree::node::NodeBody;
use crate::index::btree::tree::{BTree, Key, Value};
use crate::storage::PageStore;

/// What a full walk actually found.
#[derive(Default)]
struct Census {
    nodes: usize,
    leaves: usize,
    entries: usize,
    seen: HashSet<NodeId>,
}

impl<K: Key, V: Value, S: PageStore> BTree<K, V, S> {
    /// Walk the whole tree and check every structural invariant.
    ///
    /// Checks, for every reachable node:
    /// - it is not deleted and is reachable through exactly one slot
    /// - its parent back-reference names the node it was reached from
    /// - keys are strictly increasing and inside the separator bounds
    ///   inherited from its ancestors
    /// - occupancy is within bounds (the root is exempt from the minimum,
    ///   but a root node needs two children)
    /// - nodes have one more child than keys, and all leaves are at depth
    ///   `height`
    ///
    /// and that the counters match what was found.
    ///
    /// # Errors
    /// Returns `Error::InvariantViolation` (or `Error::UseAfterDelete` for a
    /// reachable deleted node) describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let census = {
            let mut pool = self.pool.lock();
            let mut census = Census::default();
            let walked = self.check_subtree(&mut pool, self.root, None, None, None, 0, &mut census);
            pool.evict_excess(self.root);
            walked?;
            census
        };

        let expected = [
            ("nnodes", self.nnodes, census.nodes),
            ("nleaves", self.nleaves, census.leaves),
            ("nentries", self.nentries, census.entries),
        ];
        for (name, counter, found) in expected {
            if counter != found {
                return Err(Error::invariant(
                    self.root,
                    format!("{} is {} but the tree holds {}", name, counter, found),
                ));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_subtree(
        &self,
        pool: &mut NodePool<K, V, S>,
        id: NodeId,
        parent: Option<NodeId>,
        lo: Option<&K>,
        hi: Option<&K>,
        depth: usize,
        census: &mut Census,
    ) -> Result<()> {
        if !census.seen.insert(id) {
            return Err(Error::invariant(id, "reachable from more than one slot"));
        }
        pool.materialize(id, parent)?;
        let node = pool.node(id)?;

        if node.parent() != parent {
            return Err(Error::invariant(
                id,
                format!("parent is {:?}, reached from {:?}", node.parent(), parent),
            ));
        }

        let keys = node.keys();
        if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Error::invariant(
                id,
                format!("keys out of order: {:?} before {:?}", pair[0], pair[1]),
            ));
        }
        if let (Some(lo), Some(first)) = (lo, keys.first()) {
            if first < lo {
                return Err(Error::invariant(
                    id,
                    format!("key {:?} below separator {:?}", first, lo),
                ));
            }
        }
        if let (Some(hi), Some(last)) = (hi, keys.last()) {
            if last >= hi {
                return Err(Error::invariant(
                    id,
                    format!("key {:?} not below separator {:?}", last, hi),
                ));
            }
        }

        let is_root = parent.is_none();
        let occupancy = node.occupancy();
        let (min, max) = if node.is_leaf() {
            (self.config.min_leaf_entries(), self.config.max_leaf_entries())
        } else if is_root {
            (2, self.config.max_children())
        } else {
            (self.config.min_children(), self.config.max_children())
        };
        if occupancy > max || (occupancy < min && !(is_root && node.is_leaf())) {
            return Err(Error::invariant(
                id,
                format!("occupancy {} outside [{}, {}]", occupancy, min, max),
            ));
        }

        let (keys, children) = match &node.body {
            NodeBody::Leaf(leaf) => {
                if leaf.values.len() != leaf.keys.len() {
                    return Err(Error::invariant(id, "leaf has mismatched keys and values"));
                }
                if depth != self.height {
                    return Err(Error::invariant(
                        id,
                        format!("leaf at depth {} but height is {}", depth, self.height),
                    ));
                }
                census.leaves += 1;
                census.entries += leaf.len();
                return Ok(());
            }
            NodeBody::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(Error::invariant(
                        id,
                        format!(
                            "{} children for {} keys",
                            internal.children.len(),
                            internal.keys.len()
                        ),
                    ));
                }
                if depth >= self.height {
                    return Err(Error::invariant(
                        id,
                        format!("node at depth {} but height is {}", depth, self.height),
                    ));
                }
                (internal.keys.clone(), internal.children.clone())
            }
        };
        census.nodes += 1;

        for (i, &child) in children.iter().enumerate() {
            let child_lo = if i == 0 { lo } else { keys.get(i - 1) };
            let child_hi = if i == keys.len() { hi } else { keys.get(i) };
            self.check_subtree(pool, child, Some(id), child_lo, child_hi, depth + 1, census)?;
        }
        Ok(())
    }

    /// Indented listing of the whole tree plus counters, then [`validate`].
    ///
    /// Dirty nodes are marked with `*`.
    ///
    /// ```text
    /// height=1 nnodes=1 nleaves=2 nentries=4 root=Node(3)
    /// Node(3) [7] *
    ///   Leaf(1) [5, 6] *
    ///   Leaf(2) [7, 8] *
    /// ```
    ///
    /// # Errors
    /// Fails with the first violation `validate` reports.
    ///
    /// [`validate`]: BTree::validate
    pub fn dump(&self) -> Result<String> {
        let mut out = format!(
            "height={} nnodes={} nleaves={} nentries={} root={}\n",
            self.height, self.nnodes, self.nleaves, self.nentries, self.root
        );
        {
            let mut pool = self.pool.lock();
            let listed = Self::dump_subtree(&mut pool, self.root, None, 0, &mut out);
            pool.evict_excess(self.root);
            listed?;
        }
        self.validate()?;
        Ok(out)
    }

    fn dump_subtree(
        pool: &mut NodePool<K, V, S>,
        id: NodeId,
        parent: Option<NodeId>,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        pool.materialize(id, parent)?;
        let node = pool.node(id)?;
        let kind = if node.is_leaf() { "Leaf" } else { "Node" };
        let dirty = if node.is_dirty() { " *" } else { "" };
        out.push_str(&format!(
            "{}{}({}) {:?}{}\n",
            "  ".repeat(depth),
            kind,
            id.0,
            node.keys(),
            dirty
        ));

        if let NodeBody::Internal(internal) = &node.body {
            let children = internal.children.clone();
            for child in children {
                Self::dump_subtree(pool, child, Some(id), depth + 1, out)?;
            }
        }
        Ok(())
    }
}
