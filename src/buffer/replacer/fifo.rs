//! FIFO (First-In-First-Out) replacement policy.

use std::collections::{BTreeMap, HashMap};

use crate::common::NodeId;

/// A FIFO eviction policy over resident nodes.
///
/// Nodes are evicted in the order they were materialized. Nodes that are
/// not evictable (dirty ones) are skipped and keep their place in line.
///
/// Only evictable nodes are ever visited by [`evict`](FifoReplacer::evict),
/// so a cache full of dirty nodes costs nothing to scan.
pub struct FifoReplacer {
    /// Arrival number of every tracked node.
    arrival: HashMap<NodeId, u64>,

    /// Evictable nodes keyed by arrival number (first = oldest).
    evictable: BTreeMap<u64, NodeId>,

    /// Arrival number handed to the next new node.
    next_arrival: u64,
}

impl FifoReplacer {
    /// Create a new FIFO replacer.
    pub fn new() -> Self {
        Self {
            arrival: HashMap::new(),
            evictable: BTreeMap::new(),
            next_arrival: 0,
        }
    }

    /// Record that a node became resident.
    ///
    /// Re-recording a tracked node does not move it.
    pub fn record_access(&mut self, id: NodeId) {
        if !self.arrival.contains_key(&id) {
            self.arrival.insert(id, self.next_arrival);
            self.next_arrival += 1;
        }
    }

    /// Mark a tracked node as evictable (clean) or not (dirty).
    pub fn set_evictable(&mut self, id: NodeId, evictable: bool) {
        let Some(&seq) = self.arrival.get(&id) else {
            return;
        };
        if evictable {
            self.evictable.insert(seq, id);
        } else {
            self.evictable.remove(&seq);
        }
    }

    /// Select and forget the oldest evictable node for which `allow`
    /// returns true.
    ///
    /// Nodes that are vetoed stay in line in their original order.
    pub fn evict<F>(&mut self, mut allow: F) -> Option<NodeId>
    where
        F: FnMut(NodeId) -> bool,
    {
        let (seq, id) = self
            .evictable
            .iter()
            .map(|(&seq, &id)| (seq, id))
            .find(|&(_, id)| allow(id))?;
        self.evictable.remove(&seq);
        self.arrival.remove(&id);
        Some(id)
    }

    /// Forget a node entirely.
    ///
    /// Called when a node is deleted.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(seq) = self.arrival.remove(&id) {
            self.evictable.remove(&seq);
        }
    }

    /// Number of evictable nodes.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for FifoReplacer {
    fn default() -> Self {
        Self::new()
    }
}
