//! The tree handle: construction, lookup, insert, remove, counters and
//! persistence.

use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{NodePool, StatsSnapshot};
use crate::common::config::BTreeConfig;
use crate::common::{Error, NodeId, Result};
use crate::index::btree::codec::{Codec, TreeMeta};
use crate::index::btree::node::{Leaf, NodeBody, NodeSnapshot};
use crate::storage::{MemoryPageStore, PageStore};

/// Bounds on key types.
pub trait Key: Ord + Clone + Codec + fmt::Debug {}

impl<T: Ord + Clone + Codec + fmt::Debug> Key for T {}

/// Bounds on value types.
pub trait Value: Clone + Codec {}

impl<T: Clone + Codec> Value for T {}

/// Ancestors of a leaf, root first, each with the child index taken.
pub(super) type Path = Vec<(NodeId, usize)>;

/// A copy-on-write B+Tree over a [`PageStore`].
///
/// Mutation takes `&mut self`, so the borrow checker enforces one writer or
/// many readers. Readers share the node cache behind a mutex because
/// lookups may materialize and evict nodes.
///
/// # Example
/// ```
/// use cowtree::BTree;
///
/// let mut tree: BTree<u32, String> = BTree::in_memory(3).unwrap();
/// for k in [5, 6, 7, 8] {
///     tree.insert(k, format!("v{}", k)).unwrap();
/// }
///
/// assert_eq!(tree.lookup(&7).unwrap(), Some("v7".to_string()));
/// assert_eq!(tree.height(), 1);
/// assert_eq!(tree.remove(&5).unwrap(), Some("v5".to_string()));
/// assert_eq!(tree.lookup(&5).unwrap(), None);
/// tree.validate().unwrap();
/// ```
pub struct BTree<K, V, S = MemoryPageStore> {
    pub(super) config: BTreeConfig,
    pub(super) pool: Mutex<NodePool<K, V, S>>,
    pub(super) root: NodeId,
    /// Edges from the root to any leaf.
    pub(super) height: usize,
    /// Internal nodes.
    pub(super) nnodes: usize,
    pub(super) nleaves: usize,
    pub(super) nentries: usize,
}

impl<K: Key, V: Value> BTree<K, V, MemoryPageStore> {
    /// An empty tree over a fresh [`MemoryPageStore`].
    ///
    /// # Errors
    /// Returns `Error::InvalidBranchingFactor` if `branching_factor < 3`.
    pub fn in_memory(branching_factor: usize) -> Result<Self> {
        Self::new(BTreeConfig::new(branching_factor), MemoryPageStore::new())
    }
}

impl<K: Key, V: Value, S: PageStore> BTree<K, V, S> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// An empty tree: one empty root leaf, height 0.
    ///
    /// No record is written to `store` until [`flush`](BTree::flush), but
    /// new nodes take their identities from `store` as they are created.
    /// A file-backed store may grow to back those identities, and nodes
    /// merged away before any flush leave blank pages behind.
    pub fn new(config: BTreeConfig, store: S) -> Result<Self> {
        config.validate()?;

        let mut pool = NodePool::new(store, config.cache_capacity);
        let root = pool.allocate(None, NodeBody::Leaf(Leaf::new()))?;
        debug!(root = %root, branching_factor = config.branching_factor, "created tree");

        Ok(Self {
            config,
            pool: Mutex::new(pool),
            root,
            height: 0,
            nnodes: 0,
            nleaves: 1,
            nentries: 0,
        })
    }

    /// Reopen a tree from the checkpoint of its last flush.
    ///
    /// Only the root is read; everything else materializes on demand.
    ///
    /// # Errors
    /// - `Error::Corrupted` if the store has no checkpoint
    /// - `Error::InvalidConfig` if the branching factor differs from the
    ///   one the tree was written with
    pub fn open(mut store: S, config: BTreeConfig) -> Result<Self> {
        config.validate()?;

        let record = store
            .read_meta()?
            .ok_or_else(|| Error::Corrupted("store has no checkpoint".to_string()))?;
        let meta = TreeMeta::decode(&record)?;
        if meta.branching_factor != config.branching_factor {
            return Err(Error::InvalidConfig(format!(
                "tree was written with branching factor {}, config has {}",
                meta.branching_factor, config.branching_factor
            )));
        }

        let mut pool = NodePool::new(store, config.cache_capacity);
        pool.materialize(meta.root, None)?;
        debug!(
            root = %meta.root,
            height = meta.height,
            entries = meta.nentries,
            "opened tree"
        );

        Ok(Self {
            config,
            pool: Mutex::new(pool),
            root: meta.root,
            height: meta.height,
            nnodes: meta.nnodes,
            nleaves: meta.nleaves,
            nentries: meta.nentries,
        })
    }

    // ========================================================================
    // Point operations
    // ========================================================================

    /// The value stored at `key`, or None.
    pub fn lookup(&self, key: &K) -> Result<Option<V>> {
        let mut pool = self.pool.lock();
        let leaf_id = descend(&mut pool, self.root, key, None)?;
        let found = {
            let leaf = pool.node(leaf_id)?.leaf()?;
            leaf.search(key).ok().map(|i| leaf.values[i].clone())
        };
        pool.evict_excess(self.root);
        Ok(found)
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        self.lookup(key).map(|value| value.is_some())
    }

    /// Insert or replace. Returns the previous value at `key`, if any.
    ///
    /// Identities for any splits are taken from the store before the leaf
    /// changes, so a failed allocation leaves the tree as it was.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let mut path = Path::with_capacity(self.height);
        let pool = self.pool.get_mut();
        let leaf_id = descend(pool, self.root, &key, Some(&mut path))?;

        let slot = pool.node(leaf_id)?.leaf()?.search(&key);
        let i = match slot {
            Ok(i) => {
                let leaf = pool.node_mut(leaf_id)?.leaf_mut()?;
                let previous = std::mem::replace(&mut leaf.values[i], value);
                pool.evict_excess(self.root);
                return Ok(Some(previous));
            }
            Err(i) => i,
        };

        let mut reserved = self.reserve_split_ids(leaf_id, &path)?;
        let leaf = self.pool.get_mut().node_mut(leaf_id)?.leaf_mut()?;
        leaf.insert_at(i, key, value);
        let overflow = leaf.len() > self.config.max_leaf_entries();
        self.nentries += 1;

        if overflow {
            self.split_leaf(leaf_id, path, &mut reserved)?;
        }
        self.pool.get_mut().evict_excess(self.root);
        Ok(None)
    }

    /// Remove `key`. Returns the removed value, or None if it was absent.
    ///
    /// Siblings that repair might need are materialized before the leaf
    /// changes, so a failed read leaves the tree as it was.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let mut path = Path::with_capacity(self.height);
        let pool = self.pool.get_mut();
        let leaf_id = descend(pool, self.root, key, Some(&mut path))?;

        let Ok(i) = pool.node(leaf_id)?.leaf()?.search(key) else {
            pool.evict_excess(self.root);
            return Ok(None);
        };
        self.prefetch_siblings(leaf_id, &path)?;

        let (_, value) = self.pool.get_mut().node_mut(leaf_id)?.leaf_mut()?.remove_at(i);
        self.nentries -= 1;

        self.rebalance(leaf_id, path)?;
        self.pool.get_mut().evict_excess(self.root);
        Ok(Some(value))
    }

    /// Smallest key, or None for an empty tree.
    pub fn first_key(&self) -> Result<Option<K>> {
        self.edge_key(|_| 0, |keys| keys.first())
    }

    /// Largest key, or None for an empty tree.
    pub fn last_key(&self) -> Result<Option<K>> {
        self.edge_key(|count| count - 1, |keys| keys.last())
    }

    fn edge_key(
        &self,
        pick_child: impl Fn(usize) -> usize,
        pick_key: impl Fn(&[K]) -> Option<&K>,
    ) -> Result<Option<K>> {
        let mut pool = self.pool.lock();
        let mut cur = self.root;
        let key = loop {
            let idx = match &pool.node(cur)?.body {
                NodeBody::Leaf(leaf) => break pick_key(&leaf.keys).cloned(),
                NodeBody::Internal(node) => pick_child(node.child_count()),
            };
            cur = pool.resolve_child(cur, idx)?;
        };
        pool.evict_excess(self.root);
        Ok(key)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Edges from the root to any leaf (0 when the root is a leaf).
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.nentries
    }

    /// Number of internal nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nnodes
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.nleaves
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nentries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nentries == 0
    }

    #[inline]
    pub fn config(&self) -> &BTreeConfig {
        &self.config
    }

    #[inline]
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// The checkpoint record describing the current tree.
    pub fn meta(&self) -> TreeMeta {
        TreeMeta {
            branching_factor: self.config.branching_factor,
            root: self.root,
            height: self.height,
            nnodes: self.nnodes,
            nleaves: self.nleaves,
            nentries: self.nentries,
        }
    }

    /// Write all dirty nodes (children first), the checkpoint, and pending
    /// deletions to the store, then sync it.
    pub fn flush(&mut self) -> Result<()> {
        let meta = self.meta().encode();
        let pool = self.pool.get_mut();
        let written = pool.flush(&meta)?;
        pool.evict_excess(self.root);
        debug!(written, root = %self.root, entries = self.nentries, "flushed tree");
        Ok(())
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.pool.get_mut().store_mut()
    }

    /// Give up the tree and return its store. Unflushed changes are lost.
    pub fn into_store(self) -> S {
        self.pool.into_inner().into_store()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// An owned copy of node `id`.
    ///
    /// Resident nodes are copied as-is; others are decoded from the store
    /// without being cached, and report no parent.
    ///
    /// # Errors
    /// Returns `Error::UseAfterDelete` if `id` was deleted.
    pub fn snapshot(&self, id: NodeId) -> Result<NodeSnapshot<K, V>> {
        let mut pool = self.pool.lock();
        if pool.is_resident(id) {
            return pool.node(id).map(NodeSnapshot::from);
        }
        pool.peek(id).map(|node| NodeSnapshot::from(&node))
    }

    /// True once `id` has been merged away or replaced as root.
    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.pool.lock().is_deleted(id)
    }

    /// True if `id` has changes not yet flushed.
    pub fn is_dirty(&self, id: NodeId) -> Result<bool> {
        let pool = self.pool.lock();
        if !pool.is_resident(id) && !pool.is_deleted(id) {
            return Ok(false);
        }
        pool.node(id).map(|node| node.is_dirty())
    }

    /// Number of nodes currently materialized in memory.
    pub fn resident_count(&self) -> usize {
        self.pool.lock().resident_count()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.pool.lock().stats().snapshot()
    }
}

/// Walk from `root` to the leaf covering `key`, recording the path.
pub(super) fn descend<K: Key, V: Value, S: PageStore>(
    pool: &mut NodePool<K, V, S>,
    root: NodeId,
    key: &K,
    mut path: Option<&mut Path>,
) -> Result<NodeId> {
    let mut cur = root;
    loop {
        let idx = match &pool.node(cur)?.body {
            NodeBody::Leaf(_) => return Ok(cur),
            NodeBody::Internal(node) => node.child_index(key),
        };
        if let Some(path) = path.as_deref_mut() {
            path.push((cur, idx));
        }
        cur = pool.resolve_child(cur, idx)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tree(m: usize) -> BTree<u32, u32> {
        BTree::in_memory(m).unwrap()
    }

    #[test]
    fn test_new_tree_is_single_empty_leaf() {
        let tree = create_test_tree(3);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.entry_count(), 0);
        assert!(tree.is_empty());
        assert!(tree.snapshot(tree.root_id()).unwrap().is_leaf());
    }

    #[test]
    fn test_rejects_small_branching_factor() {
        assert!(matches!(
            BTree::<u32, u32>::in_memory(2),
            Err(Error::InvalidBranchingFactor(2))
        ));
    }

    #[test]
    fn test_insert_replace_returns_previous() {
        let mut tree = create_test_tree(3);
        assert_eq!(tree.insert(1, 10).unwrap(), None);
        assert_eq!(tree.insert(1, 11).unwrap(), Some(10));
        assert_eq!(tree.entry_count(), 1);
        assert_eq!(tree.lookup(&1).unwrap(), Some(11));
    }

    #[test]
    fn test_remove_absent_changes_nothing() {
        let mut tree = create_test_tree(3);
        tree.insert(1, 10).unwrap();
        tree.flush().unwrap();

        assert_eq!(tree.remove(&2).unwrap(), None);
        assert_eq!(tree.entry_count(), 1);
        assert!(!tree.is_dirty(tree.root_id()).unwrap());
    }

    #[test]
    fn test_first_and_last_key() {
        let mut tree = create_test_tree(3);
        assert_eq!(tree.first_key().unwrap(), None);
        assert_eq!(tree.last_key().unwrap(), None);

        for k in [50, 10, 40, 20, 30, 60, 70] {
            tree.insert(k, k).unwrap();
        }
        assert!(tree.height() >= 1);
        assert_eq!(tree.first_key().unwrap(), Some(10));
        assert_eq!(tree.last_key().unwrap(), Some(70));
    }

    #[test]
    fn test_contains_key() {
        let mut tree = create_test_tree(4);
        tree.insert(3, 30).unwrap();
        assert!(tree.contains_key(&3).unwrap());
        assert!(!tree.contains_key(&4).unwrap());
    }

    #[test]
    fn test_flush_then_reopen_memory_store() {
        let mut tree = create_test_tree(3);
        for k in 0..20 {
            tree.insert(k, k * 2).unwrap();
        }
        tree.flush().unwrap();
        let (height, nnodes, nleaves) = (tree.height(), tree.node_count(), tree.leaf_count());

        let store = tree.into_store();
        let tree: BTree<u32, u32> = BTree::open(store, BTreeConfig::new(3)).unwrap();
        assert_eq!(tree.height(), height);
        assert_eq!(tree.node_count(), nnodes);
        assert_eq!(tree.leaf_count(), nleaves);
        assert_eq!(tree.entry_count(), 20);
        assert_eq!(tree.resident_count(), 1);
        assert_eq!(tree.lookup(&13).unwrap(), Some(26));
        tree.validate().unwrap();
    }

    #[test]
    fn test_open_requires_checkpoint_and_matching_factor() {
        assert!(matches!(
            BTree::<u32, u32>::open(MemoryPageStore::new(), BTreeConfig::new(3)),
            Err(Error::Corrupted(_))
        ));

        let mut tree = create_test_tree(3);
        tree.flush().unwrap();
        assert!(matches!(
            BTree::<u32, u32>::open(tree.into_store(), BTreeConfig::new(4)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unflushed_tree_writes_nothing() {
        let mut tree = create_test_tree(3);
        for k in 0..10 {
            tree.insert(k, k).unwrap();
        }
        assert_eq!(tree.store_mut().write_count(), 0);
        assert_eq!(tree.store_mut().read_meta().unwrap(), None);
    }
}
