//! Overflow handling for insert.
//!
//! A leaf that reaches `m + 1` entries splits at `(m + 1) / 2` and copies
//! the right half's first key up as the separator. A node that reaches
//! `m + 1` children splits at `m / 2` and moves its middle key up. A split
//! of the root grows the tree by one level.

use tracing::debug;

use crate::common::{Error, NodeId, Result};
use crate::index::btree::node::{Internal, NodeBody};
use crate::index::btree::tree::{BTree, Key, Path, Value};
use crate::storage::PageStore;

/// Identities reserved for the splits of one insert, taken from the back.
pub(super) type Reserved = Vec<NodeId>;

fn take_reserved(reserved: &mut Reserved, splitting: NodeId) -> Result<NodeId> {
    reserved
        .pop()
        .ok_or_else(|| Error::invariant(splitting, "split without a reserved identity"))
}

impl<K: Key, V: Value, S: PageStore> BTree<K, V, S> {
    /// Reserve one identity per split that inserting a new key into
    /// `leaf_id` will cause, plus one for a new root.
    ///
    /// A full leaf splits, and so does every full parent above it until
    /// one has room. If none has, the root grows.
    pub(super) fn reserve_split_ids(&mut self, leaf_id: NodeId, path: &Path) -> Result<Reserved> {
        let pool = self.pool.get_mut();
        if pool.node(leaf_id)?.leaf()?.len() < self.config.max_leaf_entries() {
            return Ok(Reserved::new());
        }

        let mut needed = 1;
        let mut grows_root = true;
        for &(parent, _) in path.iter().rev() {
            if pool.node(parent)?.internal()?.child_count() < self.config.max_children() {
                grows_root = false;
                break;
            }
            needed += 1;
        }
        if grows_root {
            needed += 1;
        }

        let mut reserved = (0..needed)
            .map(|_| pool.reserve())
            .collect::<Result<Reserved>>()?;
        // Lowest id goes to the leaf split.
        reserved.reverse();
        Ok(reserved)
    }

    /// Split an overfull leaf and push the separator up `path`.
    pub(super) fn split_leaf(
        &mut self,
        leaf_id: NodeId,
        path: Path,
        reserved: &mut Reserved,
    ) -> Result<()> {
        let parent = path.last().map(|&(id, _)| id);
        let pool = self.pool.get_mut();

        let leaf = pool.node_mut(leaf_id)?.leaf_mut()?;
        let right = leaf.split_off(leaf.len() / 2);
        let separator = right
            .keys
            .first()
            .cloned()
            .ok_or_else(|| Error::invariant(leaf_id, "leaf split produced an empty half"))?;

        let right_id = take_reserved(reserved, leaf_id)?;
        pool.install(right_id, parent, NodeBody::Leaf(right));
        self.nleaves += 1;
        debug!(leaf = %leaf_id, new_leaf = %right_id, separator = ?separator, "split leaf");

        self.insert_separator(leaf_id, separator, right_id, path, reserved)
    }

    /// Install `separator` and `right` next to `left` in the parent at the
    /// top of `path`, splitting upward as long as parents overflow.
    fn insert_separator(
        &mut self,
        mut left: NodeId,
        mut separator: K,
        mut right: NodeId,
        mut path: Path,
        reserved: &mut Reserved,
    ) -> Result<()> {
        loop {
            let Some((parent, idx)) = path.pop() else {
                return self.grow_root(left, separator, right, reserved);
            };

            let max_children = self.config.max_children();
            let node = self.pool.get_mut().node_mut(parent)?.internal_mut()?;
            if node.children.get(idx) != Some(&left) {
                return Err(Error::invariant(
                    parent,
                    format!("child slot {} does not hold {}", idx, left),
                ));
            }
            node.keys.insert(idx, separator);
            node.children.insert(idx + 1, right);
            if node.child_count() <= max_children {
                return Ok(());
            }

            let grandparent = path.last().map(|&(id, _)| id);
            let (promoted, new_node) = self.split_node(parent, grandparent, reserved)?;
            left = parent;
            separator = promoted;
            right = new_node;
        }
    }

    /// Split an overfull node, returning the promoted key and the new
    /// right sibling.
    fn split_node(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        reserved: &mut Reserved,
    ) -> Result<(K, NodeId)> {
        let pool = self.pool.get_mut();

        let node = pool.node_mut(id)?.internal_mut()?;
        let (separator, right) = node
            .split_middle()
            .ok_or_else(|| Error::invariant(id, "split of a node without keys"))?;
        let moved = right.children.clone();

        let right_id = take_reserved(reserved, id)?;
        pool.install(right_id, parent, NodeBody::Internal(right));
        for child in moved {
            pool.set_parent(child, Some(right_id));
        }
        self.nnodes += 1;
        debug!(node = %id, new_node = %right_id, separator = ?separator, "split node");

        Ok((separator, right_id))
    }

    /// Replace the root with a node over the two halves of its split.
    fn grow_root(
        &mut self,
        left: NodeId,
        separator: K,
        right: NodeId,
        reserved: &mut Reserved,
    ) -> Result<()> {
        let root = take_reserved(reserved, left)?;
        let pool = self.pool.get_mut();
        pool.install(root, None, NodeBody::Internal(Internal::new(separator, left, right)));
        pool.set_parent(left, Some(root));
        pool.set_parent(right, Some(root));

        self.root = root;
        self.height += 1;
        self.nnodes += 1;
        debug!(root = %root, height = self.height, "promoted new root");
        Ok(())
    }
}
