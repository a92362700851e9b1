//! Node Pool - the identity-keyed node cache.
//!
//! The [`NodePool`] provides:
//! - One in-memory instance per node identity (materialize-once)
//! - Lazy loading of children through their owner
//! - Dirty tracking and depth-ordered write-back
//! - Deletion tombstones
//! - FIFO eviction of clean leaves and childless subtrees

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::buffer::replacer::FifoReplacer;
use crate::buffer::{CacheStats, Counter};
use crate::common::{Error, NodeId, Result};
use crate::index::btree::codec::{decode_node, encode_node};
use crate::index::btree::node::{Node, NodeBody};
use crate::index::btree::Codec;
use crate::storage::PageStore;

/// Caches materialized nodes on top of a [`PageStore`].
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────┐
/// │                        NodePool                          │
/// │  ┌──────────────────────────┐  ┌──────────────────────┐  │
/// │  │ nodes                    │  │ tombstones           │  │
/// │  │ NodeId → Node<K, V>      │  │ HashSet<NodeId>      │  │
/// │  └──────────────────────────┘  └──────────────────────┘  │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
/// │  │   replacer   │  │    store     │  │    stats     │    │
/// │  │ FifoReplacer │  │      S       │  │  CacheStats  │    │
/// │  └──────────────┘  └──────────────┘  └──────────────┘    │
/// └──────────────────────────────────────────────────────────┘
/// ```
///
/// # Residency rules
/// - A node is resident only if its parent is resident, so every resident
///   node's parent chain reaches the root.
/// - Dirty nodes are never evicted; they are written by [`flush`].
/// - Deleted nodes stay resident, flagged, until the next flush removes
///   them from the store. Afterwards their ids live in `tombstones`.
///
/// [`flush`]: NodePool::flush
pub struct NodePool<K, V, S> {
    /// Resident nodes.
    nodes: HashMap<NodeId, Node<K, V>>,

    /// Ids deleted and already removed from the store.
    ///
    /// Never shrinks: one id per deleted node for the pool's lifetime, so
    /// that stale ids keep failing with `UseAfterDelete` instead of
    /// `PageNotFound`. It is not persisted; a reopened tree starts empty.
    tombstones: HashSet<NodeId>,

    /// Eviction order for clean nodes.
    replacer: FifoReplacer,

    /// Backing store.
    store: S,

    /// Performance statistics.
    stats: CacheStats,

    /// Resident node count above which eviction kicks in.
    capacity: usize,
}

impl<K, V, S> NodePool<K, V, S>
where
    K: Ord + Clone + Codec,
    V: Clone + Codec,
    S: PageStore,
{
    /// Create an empty pool over `store`.
    pub fn new(store: S, capacity: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            tombstones: HashSet::new(),
            replacer: FifoReplacer::new(),
            store,
            stats: CacheStats::new(),
            capacity,
        }
    }

    // ========================================================================
    // Allocation and access
    // ========================================================================

    /// Allocate an identity and register a new dirty node under it.
    pub fn allocate(&mut self, parent: Option<NodeId>, body: NodeBody<K, V>) -> Result<NodeId> {
        let id = self.reserve()?;
        self.install(id, parent, body);
        Ok(id)
    }

    /// Take an identity from the store without registering a node yet.
    pub fn reserve(&mut self) -> Result<NodeId> {
        self.store.allocate()
    }

    /// Register a new dirty node under a [`reserve`](NodePool::reserve)d id.
    pub fn install(&mut self, id: NodeId, parent: Option<NodeId>, body: NodeBody<K, V>) {
        self.nodes.insert(id, Node::new(id, parent, body));
        self.replacer.record_access(id);
        self.replacer.set_evictable(id, false);
    }

    /// Borrow a resident node.
    ///
    /// # Errors
    /// - `Error::UseAfterDelete` if the node was deleted
    /// - `Error::InvariantViolation` if the node is not resident
    pub fn node(&self, id: NodeId) -> Result<&Node<K, V>> {
        if self.tombstones.contains(&id) {
            return Err(Error::UseAfterDelete(id));
        }
        match self.nodes.get(&id) {
            Some(node) if node.deleted => Err(Error::UseAfterDelete(id)),
            Some(node) => Ok(node),
            None => Err(Error::invariant(id, "node is not resident")),
        }
    }

    /// Borrow a resident node for mutation, marking it dirty.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<K, V>> {
        self.node(id)?;
        self.replacer.set_evictable(id, false);
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::invariant(id, "node is not resident"))?;
        node.dirty = true;
        Ok(node)
    }

    /// Update the in-memory parent back-reference of a resident node.
    ///
    /// Non-resident nodes get their parent when they are next materialized,
    /// so they are skipped. This never dirties the node.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
    }

    /// Make `id` resident, reading it from the store if needed.
    ///
    /// A freshly read node gets `parent` as its back-reference. A node that
    /// is already resident is returned as-is.
    pub fn materialize(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        if self.tombstones.contains(&id) {
            return Err(Error::UseAfterDelete(id));
        }
        if let Some(node) = self.nodes.get(&id) {
            if node.deleted {
                return Err(Error::UseAfterDelete(id));
            }
            self.stats.record(Counter::CacheHit);
            return Ok(());
        }

        self.stats.record(Counter::CacheMiss);
        let record = self.store.read(id)?;
        self.stats.record(Counter::NodeRead);

        let mut node = decode_node(id, record.version, &record.bytes)?;
        node.parent = parent;
        self.nodes.insert(id, node);
        self.replacer.record_access(id);
        self.replacer.set_evictable(id, true);

        trace!(node = %id, parent = ?parent, "materialized node");
        Ok(())
    }

    /// Resolve child slot `idx` of internal node `parent`, materializing the
    /// child on first touch.
    pub fn resolve_child(&mut self, parent: NodeId, idx: usize) -> Result<NodeId> {
        let child = self
            .node(parent)?
            .internal()?
            .children
            .get(idx)
            .copied()
            .ok_or_else(|| Error::invariant(parent, format!("no child slot {}", idx)))?;
        self.materialize(child, Some(parent))?;
        Ok(child)
    }

    /// Read a node without caching it.
    ///
    /// Resident nodes are cloned; others are decoded from the store with no
    /// parent back-reference.
    pub fn peek(&mut self, id: NodeId) -> Result<Node<K, V>> {
        if self.nodes.contains_key(&id) || self.tombstones.contains(&id) {
            return self.node(id).cloned();
        }
        let record = self.store.read(id)?;
        self.stats.record(Counter::NodeRead);
        decode_node(id, record.version, &record.bytes)
    }

    /// Tag a node as deleted and release its contents.
    ///
    /// The node stays resident and flagged until the next flush, which
    /// deletes it from the store.
    pub fn delete(&mut self, id: NodeId) -> Result<NodeBody<K, V>> {
        let node = self.node_mut(id)?;
        let body = node.take_body();
        node.deleted = true;
        node.dirty = false;
        node.parent = None;
        self.replacer.remove(id);
        Ok(body)
    }

    // ========================================================================
    // Write-back and eviction
    // ========================================================================

    /// Write every dirty node (children before parents), sync, write the
    /// checkpoint record, then delete tagged nodes from the store and sync
    /// again.
    ///
    /// Every record is encoded and checked against the store's record
    /// capacity before the first write, so an oversized node fails the
    /// flush with the store untouched. Nodes are overwritten in place: an
    /// I/O error part way through the writes can still leave pages newer
    /// than the checkpoint.
    ///
    /// Returns the number of nodes written.
    pub fn flush(&mut self, meta: &[u8]) -> Result<usize> {
        let mut dirty: Vec<(usize, NodeId)> = Vec::new();
        for (id, node) in &self.nodes {
            if node.dirty && !node.deleted {
                dirty.push((self.depth(*id)?, *id));
            }
        }
        // Deepest first; ties by id for a stable write order.
        dirty.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let max = self.store.record_capacity();
        let mut records = Vec::with_capacity(dirty.len());
        for &(_, id) in &dirty {
            let node = self.node(id)?;
            let record = encode_node(node);
            if record.len() > max {
                return Err(Error::RecordTooLarge {
                    id,
                    size: record.len(),
                    max,
                });
            }
            records.push((id, node.version + 1, record));
        }

        for (id, version, record) in &records {
            self.store.write(*id, *version, record)?;
            self.stats.record(Counter::NodeWritten);
        }
        self.store.sync()?;
        self.store.write_meta(meta)?;

        for (id, version, _) in records {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.version = version;
                node.dirty = false;
            }
            self.replacer.set_evictable(id, true);
        }

        let mut deleted: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.deleted)
            .map(|(&id, _)| id)
            .collect();
        deleted.sort();
        for id in deleted {
            self.store.delete(id)?;
            self.nodes.remove(&id);
            self.tombstones.insert(id);
            self.stats.record(Counter::NodeDeleted);
        }

        self.store.sync()?;
        Ok(dirty.len())
    }

    /// Evict clean nodes until no more than `capacity` are resident, or
    /// nothing else can go.
    ///
    /// The root, dirty nodes, deleted nodes, and nodes with resident
    /// children are kept.
    pub fn evict_excess(&mut self, root: NodeId) {
        while self.nodes.len() > self.capacity {
            let nodes = &self.nodes;
            let victim = self.replacer.evict(|id| {
                id != root && nodes.get(&id).is_some_and(|node| Self::evictable(nodes, node))
            });
            let Some(id) = victim else {
                break;
            };
            self.nodes.remove(&id);
            self.stats.record(Counter::Eviction);
            trace!(node = %id, "evicted node");
        }
    }

    fn evictable(nodes: &HashMap<NodeId, Node<K, V>>, node: &Node<K, V>) -> bool {
        if node.dirty || node.deleted {
            return false;
        }
        match &node.body {
            NodeBody::Leaf(_) => true,
            NodeBody::Internal(internal) => {
                internal.children.iter().all(|child| !nodes.contains_key(child))
            }
        }
    }

    /// Distance from the root, following parent back-references.
    fn depth(&self, id: NodeId) -> Result<usize> {
        let mut depth = 0;
        let mut cur = id;
        while let Some(parent) = self.node(cur)?.parent {
            depth += 1;
            if depth > self.nodes.len() {
                return Err(Error::invariant(id, "parent chain has a cycle"));
            }
            cur = parent;
        }
        Ok(depth)
    }

    // ========================================================================
    // Info
    // ========================================================================

    /// True if `id` was deleted, whether or not the store has caught up.
    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.tombstones.contains(&id) || self.nodes.get(&id).is_some_and(|node| node.deleted)
    }

    /// True if `id` is resident (deleted-but-unflushed nodes included).
    pub fn is_resident(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of resident nodes.
    pub fn resident_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of resident dirty nodes.
    pub fn dirty_count(&self) -> usize {
        self.nodes.values().filter(|node| node.dirty).count()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::btree::node::{Internal, Leaf};
    use crate::storage::{MemoryPageStore, StoredRecord};

    /// Memory store that logs the order of mutating calls and caps
    /// record size.
    #[derive(Default)]
    struct LoggingStore {
        inner: MemoryPageStore,
        log: Vec<&'static str>,
        capacity: Option<usize>,
    }

    impl PageStore for LoggingStore {
        fn allocate(&mut self) -> Result<NodeId> {
            self.inner.allocate()
        }

        fn read(&mut self, id: NodeId) -> Result<StoredRecord> {
            self.inner.read(id)
        }

        fn write(&mut self, id: NodeId, version: u64, record: &[u8]) -> Result<()> {
            self.log.push("write");
            self.inner.write(id, version, record)
        }

        fn delete(&mut self, id: NodeId) -> Result<()> {
            self.log.push("delete");
            self.inner.delete(id)
        }

        fn write_meta(&mut self, record: &[u8]) -> Result<()> {
            self.log.push("meta");
            self.inner.write_meta(record)
        }

        fn read_meta(&mut self) -> Result<Option<Vec<u8>>> {
            self.inner.read_meta()
        }

        fn record_capacity(&self) -> usize {
            self.capacity.unwrap_or(usize::MAX)
        }

        fn sync(&mut self) -> Result<()> {
            self.log.push("sync");
            Ok(())
        }
    }

    type TestPool = NodePool<u32, u32, MemoryPageStore>;

    fn create_test_pool(capacity: usize) -> TestPool {
        NodePool::new(MemoryPageStore::new(), capacity)
    }

    fn leaf_body(keys: &[u32]) -> NodeBody<u32, u32> {
        let mut leaf = Leaf::new();
        for &k in keys {
            leaf.push(k, k);
        }
        NodeBody::Leaf(leaf)
    }

    /// root -> [left, right], flushed so everything is clean.
    fn two_level(pool: &mut TestPool) -> (NodeId, NodeId, NodeId) {
        let left = pool.allocate(None, leaf_body(&[1, 2])).unwrap();
        let right = pool.allocate(None, leaf_body(&[3, 4])).unwrap();
        let root = pool
            .allocate(None, NodeBody::Internal(Internal::new(3, left, right)))
            .unwrap();
        pool.set_parent(left, Some(root));
        pool.set_parent(right, Some(root));
        pool.flush(b"meta").unwrap();
        (root, left, right)
    }

    #[test]
    fn test_allocate_is_dirty_and_resident() {
        let mut pool = create_test_pool(8);
        let id = pool.allocate(None, leaf_body(&[1])).unwrap();

        assert!(pool.is_resident(id));
        assert!(pool.node(id).unwrap().is_dirty());
        assert_eq!(pool.dirty_count(), 1);
    }

    #[test]
    fn test_flush_writes_children_before_parents() {
        let mut pool = create_test_pool(8);
        let (root, left, right) = two_level(&mut pool);

        assert_eq!(pool.dirty_count(), 0);
        assert_eq!(pool.stats().snapshot().nodes_written, 3);
        assert_eq!(pool.node(root).unwrap().version, 1);
        assert!(pool.store().contains(left));
        assert!(pool.store().contains(right));
        assert_eq!(pool.store_mut().read_meta().unwrap(), Some(b"meta".to_vec()));
    }

    #[test]
    fn test_flush_without_changes_writes_nothing() {
        let mut pool = create_test_pool(8);
        two_level(&mut pool);
        let writes = pool.store().write_count();

        assert_eq!(pool.flush(b"meta").unwrap(), 0);
        assert_eq!(pool.store().write_count(), writes);
    }

    #[test]
    fn test_eviction_keeps_root_and_parents_of_resident_children() {
        let mut pool = create_test_pool(1);
        let (root, left, right) = two_level(&mut pool);

        pool.evict_excess(root);

        assert!(pool.is_resident(root));
        assert!(!pool.is_resident(left));
        assert!(!pool.is_resident(right));
        assert_eq!(pool.stats().snapshot().evictions, 2);
    }

    #[test]
    fn test_dirty_nodes_are_not_evicted() {
        let mut pool = create_test_pool(1);
        let (root, left, _) = two_level(&mut pool);

        pool.node_mut(left).unwrap();
        pool.evict_excess(root);

        assert!(pool.is_resident(left));
        assert_eq!(pool.resident_count(), 2);
    }

    #[test]
    fn test_resolve_child_rematerializes_with_parent() {
        let mut pool = create_test_pool(1);
        let (root, left, _) = two_level(&mut pool);
        pool.evict_excess(root);

        let misses = pool.stats().snapshot().cache_misses;
        let child = pool.resolve_child(root, 0).unwrap();
        assert_eq!(child, left);

        let node = pool.node(left).unwrap();
        assert_eq!(node.parent(), Some(root));
        assert!(!node.is_dirty());
        assert_eq!(node.keys(), &[1, 2]);
        assert_eq!(pool.stats().snapshot().cache_misses, misses + 1);

        // Second resolution is a hit on the same instance.
        pool.resolve_child(root, 0).unwrap();
        assert_eq!(pool.stats().snapshot().cache_misses, misses + 1);
    }

    #[test]
    fn test_resolve_missing_slot_is_invariant_violation() {
        let mut pool = create_test_pool(8);
        let (root, _, _) = two_level(&mut pool);
        assert!(matches!(
            pool.resolve_child(root, 5),
            Err(Error::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_delete_then_access_fails() {
        let mut pool = create_test_pool(8);
        let (_, _, right) = two_level(&mut pool);

        let body = pool.delete(right).unwrap();
        assert_eq!(body, leaf_body(&[3, 4]));
        assert!(pool.is_deleted(right));
        assert!(matches!(pool.node(right), Err(Error::UseAfterDelete(_))));
        assert!(matches!(pool.node_mut(right), Err(Error::UseAfterDelete(_))));

        pool.flush(b"meta").unwrap();
        assert!(pool.is_deleted(right));
        assert!(!pool.is_resident(right));
        assert!(pool.store().is_deleted(right));
        assert!(matches!(
            pool.materialize(right, None),
            Err(Error::UseAfterDelete(_))
        ));
        assert_eq!(pool.stats().snapshot().nodes_deleted, 1);
    }

    #[test]
    fn test_peek_does_not_cache() {
        let mut pool = create_test_pool(1);
        let (root, left, _) = two_level(&mut pool);
        pool.evict_excess(root);

        let node = pool.peek(left).unwrap();
        assert_eq!(node.keys(), &[1, 2]);
        assert_eq!(node.parent(), None);
        assert!(!pool.is_resident(left));
    }

    #[test]
    fn test_flush_syncs_nodes_before_checkpoint() {
        let mut pool = NodePool::new(LoggingStore::default(), 8);
        let left = pool.allocate(None, leaf_body(&[1])).unwrap();
        let right = pool.allocate(None, leaf_body(&[3])).unwrap();
        let root = pool
            .allocate(None, NodeBody::Internal(Internal::new(3, left, right)))
            .unwrap();
        pool.set_parent(left, Some(root));
        pool.set_parent(right, Some(root));
        pool.flush(b"one").unwrap();
        assert_eq!(pool.store().log, ["write", "write", "write", "sync", "meta", "sync"]);

        pool.store_mut().log.clear();
        pool.node_mut(left).unwrap();
        pool.delete(right).unwrap();
        pool.flush(b"two").unwrap();
        assert_eq!(pool.store().log, ["write", "sync", "meta", "delete", "sync"]);
    }

    #[test]
    fn test_oversized_record_fails_flush_before_any_write() {
        let store = LoggingStore {
            capacity: Some(32),
            ..LoggingStore::default()
        };
        let mut pool = NodePool::new(store, 8);
        let small = pool.allocate(None, leaf_body(&[1])).unwrap();
        let big = pool.allocate(None, leaf_body(&(0..20).collect::<Vec<_>>())).unwrap();

        assert!(matches!(
            pool.flush(b"meta"),
            Err(Error::RecordTooLarge { id, max: 32, .. }) if id == big
        ));
        assert!(pool.store().log.is_empty());
        assert!(pool.node(small).unwrap().is_dirty());
        assert_eq!(pool.node(small).unwrap().version, 0);
        assert_eq!(pool.stats().snapshot().nodes_written, 0);
    }

    #[test]
    fn test_reserved_id_is_installed_dirty() {
        let mut pool = create_test_pool(8);
        let id = pool.reserve().unwrap();
        assert!(!pool.is_resident(id));

        pool.install(id, None, leaf_body(&[7]));
        assert!(pool.node(id).unwrap().is_dirty());
        assert_ne!(pool.allocate(None, leaf_body(&[8])).unwrap(), id);
    }

    #[test]
    fn test_eviction_with_only_dirty_nodes_is_a_no_op() {
        let mut pool = create_test_pool(2);
        let ids: Vec<NodeId> = (0..500)
            .map(|k| pool.allocate(None, leaf_body(&[k])).unwrap())
            .collect();

        pool.evict_excess(ids[0]);

        assert_eq!(pool.resident_count(), 500);
        assert_eq!(pool.stats().snapshot().evictions, 0);
    }
}
