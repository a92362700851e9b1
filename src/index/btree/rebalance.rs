//! Underflow repair after remove.
//!
//! A non-root leaf or node that drops below `ceil(m/2)` entries (leaf) or
//! children (node) is repaired with the first applicable step:
//!
//! 1. borrow the first entry of the right sibling, if it has a spare
//! 2. borrow the last entry of the left sibling, if it has a spare
//! 3. merge with the right sibling, or the left one at the right edge
//!
//! Only siblings under the same parent are considered. The underflowing
//! node survives a merge and the sibling is deleted. A merge takes a
//! separator out of the parent, so repair continues one level up. A root
//! node left with a single child is replaced by that child.
//!
//! ```text
//!  borrow from right:          merge with right:
//!      [7]          [8]            [5 | 7]           [7]
//!     /   \   =>   /   \          /   |   \    =>   /   \
//!   [5]  [7 8 9] [5 7] [8 9]   [2] [5 6] [7 8]  [2 5 6] [7 8]
//! ```

use tracing::{debug, trace};

use crate::buffer::NodePool;
use crate::common::config::BTreeConfig;
use crate::common::{Error, NodeId, Result};
use crate::index::btree::node::{Node, NodeBody};
use crate::index::btree::tree::{BTree, Key, Path, Value};
use crate::storage::PageStore;

/// Least occupancy a non-root node of this kind may have.
fn min_occupancy<K: Ord, V>(config: &BTreeConfig, node: &Node<K, V>) -> usize {
    if node.is_leaf() {
        config.min_leaf_entries()
    } else {
        config.min_children()
    }
}

fn underflows<K: Ord, V>(config: &BTreeConfig, node: &Node<K, V>) -> bool {
    node.occupancy() < min_occupancy(config, node)
}

fn has_spare<K: Ord, V>(config: &BTreeConfig, node: &Node<K, V>) -> bool {
    node.occupancy() > min_occupancy(config, node)
}

impl<K: Key, V: Value, S: PageStore> BTree<K, V, S> {
    /// Materialize every sibling that repair could touch if `leaf_id`
    /// loses one entry.
    ///
    /// Walks up from the leaf while each node sits at its minimum, since
    /// only those can underflow. Nothing is modified.
    pub(super) fn prefetch_siblings(&mut self, leaf_id: NodeId, path: &Path) -> Result<()> {
        let config = self.config;
        let pool = self.pool.get_mut();

        let mut child = leaf_id;
        for &(parent, idx) in path.iter().rev() {
            if has_spare(&config, pool.node(child)?) {
                break;
            }
            let count = pool.node(parent)?.internal()?.child_count();
            if idx + 1 < count {
                pool.resolve_child(parent, idx + 1)?;
            }
            if idx > 0 {
                pool.resolve_child(parent, idx - 1)?;
            }
            child = parent;
        }
        Ok(())
    }

    /// Repair `child` (just shrunk) and its ancestors along `path`.
    pub(super) fn rebalance(&mut self, mut child: NodeId, mut path: Path) -> Result<()> {
        let config = self.config;

        while let Some((parent, idx)) = path.pop() {
            let pool = self.pool.get_mut();
            if !underflows(&config, pool.node(child)?) {
                return Ok(());
            }

            let count = pool.node(parent)?.internal()?.child_count();
            let right = if idx + 1 < count {
                Some(pool.resolve_child(parent, idx + 1)?)
            } else {
                None
            };
            if let Some(right) = right {
                if has_spare(&config, pool.node(right)?) {
                    return borrow_from_right(pool, parent, idx, child, right);
                }
            }

            let left = if idx > 0 {
                Some(pool.resolve_child(parent, idx - 1)?)
            } else {
                None
            };
            if let Some(left) = left {
                if has_spare(&config, pool.node(left)?) {
                    return borrow_from_left(pool, parent, idx, child, left);
                }
            }

            let is_leaf = pool.node(child)?.is_leaf();
            match (right, left) {
                (Some(right), _) => merge_right(pool, parent, idx, child, right)?,
                (None, Some(left)) => merge_left(pool, parent, idx, child, left)?,
                (None, None) => {
                    return Err(Error::invariant(parent, "non-root node with a single child"))
                }
            }
            if is_leaf {
                self.nleaves -= 1;
            } else {
                self.nnodes -= 1;
            }

            if path.is_empty() {
                if pool.node(parent)?.internal()?.child_count() == 1 {
                    pool.delete(parent)?;
                    pool.set_parent(child, None);
                    self.root = child;
                    self.height -= 1;
                    self.nnodes -= 1;
                    debug!(root = %child, height = self.height, "collapsed root");
                }
                return Ok(());
            }
            child = parent;
        }
        Ok(())
    }
}

fn separator_mut<K: Key, V: Value, S: PageStore>(
    pool: &mut NodePool<K, V, S>,
    parent: NodeId,
    i: usize,
) -> Result<&mut K> {
    pool.node_mut(parent)?
        .internal_mut()?
        .keys
        .get_mut(i)
        .ok_or_else(|| Error::invariant(parent, format!("no separator {}", i)))
}

/// Move the right sibling's first entry to the end of `child`.
fn borrow_from_right<K: Key, V: Value, S: PageStore>(
    pool: &mut NodePool<K, V, S>,
    parent: NodeId,
    idx: usize,
    child: NodeId,
    right: NodeId,
) -> Result<()> {
    if pool.node(child)?.is_leaf() {
        let donor = pool.node_mut(right)?.leaf_mut()?;
        let (key, value) = donor.remove_at(0);
        let new_first = donor
            .keys
            .first()
            .cloned()
            .ok_or_else(|| Error::invariant(right, "lending leaf emptied"))?;
        pool.node_mut(child)?.leaf_mut()?.push(key, value);
        *separator_mut(pool, parent, idx)? = new_first;
    } else {
        let donor = pool.node_mut(right)?.internal_mut()?;
        let key = donor.keys.remove(0);
        let moved = donor.children.remove(0);
        let separator = std::mem::replace(separator_mut(pool, parent, idx)?, key);
        let node = pool.node_mut(child)?.internal_mut()?;
        node.keys.push(separator);
        node.children.push(moved);
        pool.set_parent(moved, Some(child));
    }
    trace!(node = %child, from = %right, "redistributed from right sibling");
    Ok(())
}

/// Move the left sibling's last entry to the front of `child`.
fn borrow_from_left<K: Key, V: Value, S: PageStore>(
    pool: &mut NodePool<K, V, S>,
    parent: NodeId,
    idx: usize,
    child: NodeId,
    left: NodeId,
) -> Result<()> {
    if pool.node(child)?.is_leaf() {
        let (key, value) = pool
            .node_mut(left)?
            .leaf_mut()?
            .pop()
            .ok_or_else(|| Error::invariant(left, "lending leaf is empty"))?;
        *separator_mut(pool, parent, idx - 1)? = key.clone();
        pool.node_mut(child)?.leaf_mut()?.insert_at(0, key, value);
    } else {
        let donor = pool.node_mut(left)?.internal_mut()?;
        let (Some(key), Some(moved)) = (donor.keys.pop(), donor.children.pop()) else {
            return Err(Error::invariant(left, "lending node is empty"));
        };
        let separator = std::mem::replace(separator_mut(pool, parent, idx - 1)?, key);
        let node = pool.node_mut(child)?.internal_mut()?;
        node.keys.insert(0, separator);
        node.children.insert(0, moved);
        pool.set_parent(moved, Some(child));
    }
    trace!(node = %child, from = %left, "redistributed from left sibling");
    Ok(())
}

/// Check that `parent` holds `expected` in slot `slot`.
fn expect_child<K: Key, V: Value, S: PageStore>(
    pool: &NodePool<K, V, S>,
    parent: NodeId,
    slot: usize,
    expected: NodeId,
) -> Result<()> {
    match pool.node(parent)?.internal()?.children.get(slot) {
        Some(&found) if found == expected => Ok(()),
        found => Err(Error::invariant(
            parent,
            format!("slot {} holds {:?}, expected {}", slot, found, expected),
        )),
    }
}

/// Fold the right sibling into `child` and delete it.
fn merge_right<K: Key, V: Value, S: PageStore>(
    pool: &mut NodePool<K, V, S>,
    parent: NodeId,
    idx: usize,
    child: NodeId,
    right: NodeId,
) -> Result<()> {
    expect_child(pool, parent, idx + 1, right)?;
    let donor = pool.delete(right)?;

    let parent_node = pool.node_mut(parent)?.internal_mut()?;
    let separator = parent_node.keys.remove(idx);
    parent_node.children.remove(idx + 1);

    match donor {
        NodeBody::Leaf(donor) => pool.node_mut(child)?.leaf_mut()?.append(donor),
        NodeBody::Internal(mut donor) => {
            for &moved in &donor.children {
                pool.set_parent(moved, Some(child));
            }
            let node = pool.node_mut(child)?.internal_mut()?;
            node.keys.push(separator);
            node.keys.append(&mut donor.keys);
            node.children.append(&mut donor.children);
        }
    }
    debug!(node = %child, deleted = %right, "merged right sibling");
    Ok(())
}

/// Fold the left sibling into `child` and delete it.
fn merge_left<K: Key, V: Value, S: PageStore>(
    pool: &mut NodePool<K, V, S>,
    parent: NodeId,
    idx: usize,
    child: NodeId,
    left: NodeId,
) -> Result<()> {
    expect_child(pool, parent, idx - 1, left)?;
    let donor = pool.delete(left)?;

    let parent_node = pool.node_mut(parent)?.internal_mut()?;
    let separator = parent_node.keys.remove(idx - 1);
    parent_node.children.remove(idx - 1);

    match donor {
        NodeBody::Leaf(donor) => pool.node_mut(child)?.leaf_mut()?.prepend(donor),
        NodeBody::Internal(mut donor) => {
            for &moved in &donor.children {
                pool.set_parent(moved, Some(child));
            }
            let node = pool.node_mut(child)?.internal_mut()?;
            donor.keys.push(separator);
            donor.keys.append(&mut node.keys);
            donor.children.append(&mut node.children);
            *node = donor;
        }
    }
    debug!(node = %child, deleted = %left, "merged left sibling");
    Ok(())
}
