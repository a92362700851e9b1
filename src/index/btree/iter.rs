//! Range scans.
//!
//! A [`Range`] walks leaves left to right, one leaf per refill. It keeps the
//! internal nodes above the current leaf on a stack together with the next
//! child slot to visit, so no sibling links are needed. Entries are copied
//! out of each leaf, so the scan never holds the cache lock between calls.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::ops::{Bound, RangeBounds};

use crate::common::{NodeId, Result};
use crate::index::btree::node::NodeBody;
use crate::index::btree::tree::{BTree, Key, Value};
use crate::storage::PageStore;

/// Lazy, ordered iterator over the entries of a [`BTree`] within bounds.
///
/// Created by [`BTree::range`], [`BTree::range_scan`] and [`BTree::iter`].
/// Yields `Err` and then stops if a node cannot be materialized.
pub struct Range<'a, K, V, S> {
    tree: &'a BTree<K, V, S>,
    start: Bound<K>,
    end: Bound<K>,
    /// Internal nodes above the current leaf and their next child slot.
    stack: Vec<(NodeId, usize)>,
    /// Entries of the current leaf not yet yielded.
    buffer: VecDeque<(K, V)>,
    started: bool,
    done: bool,
}

impl<'a, K: Key, V: Value, S: PageStore> Range<'a, K, V, S> {
    fn new(tree: &'a BTree<K, V, S>, start: Bound<K>, end: Bound<K>) -> Self {
        Self {
            tree,
            start,
            end,
            stack: Vec::with_capacity(tree.height()),
            buffer: VecDeque::new(),
            started: false,
            done: false,
        }
    }

    fn past_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Included(end) => key > end,
            Bound::Excluded(end) => key >= end,
            Bound::Unbounded => false,
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.buffer.clear();
        self.stack.clear();
    }

    /// Copy the next leaf's entries into the buffer.
    ///
    /// Returns false once the scan has passed the rightmost leaf.
    fn load_next_leaf(&mut self) -> Result<bool> {
        let tree = self.tree;
        let root = tree.root;
        let mut pool = tree.pool.lock();

        let mut cur;
        let from;
        if !self.started {
            self.started = true;
            cur = root;
            loop {
                let idx = match &pool.node(cur)?.body {
                    NodeBody::Leaf(_) => break,
                    NodeBody::Internal(node) => match &self.start {
                        Bound::Included(key) | Bound::Excluded(key) => node.child_index(key),
                        Bound::Unbounded => 0,
                    },
                };
                self.stack.push((cur, idx + 1));
                cur = pool.resolve_child(cur, idx)?;
            }
            let keys = &pool.node(cur)?.leaf()?.keys;
            from = match &self.start {
                Bound::Included(key) => keys.partition_point(|k| k < key),
                Bound::Excluded(key) => keys.partition_point(|k| k <= key),
                Bound::Unbounded => 0,
            };
        } else {
            // Lookups between calls may have evicted nodes on the stack.
            let mut parent = None;
            for &(id, _) in &self.stack {
                pool.materialize(id, parent)?;
                parent = Some(id);
            }

            let (id, idx) = loop {
                let Some(&(id, next)) = self.stack.last() else {
                    return Ok(false);
                };
                if next < pool.node(id)?.internal()?.child_count() {
                    break (id, next);
                }
                self.stack.pop();
            };
            if let Some(top) = self.stack.last_mut() {
                top.1 += 1;
            }

            cur = pool.resolve_child(id, idx)?;
            while !pool.node(cur)?.is_leaf() {
                self.stack.push((cur, 1));
                cur = pool.resolve_child(cur, 0)?;
            }
            from = 0;
        }

        let leaf = pool.node(cur)?.leaf()?;
        self.buffer.extend(
            leaf.keys[from..]
                .iter()
                .cloned()
                .zip(leaf.values[from..].iter().cloned()),
        );
        pool.evict_excess(root);
        Ok(true)
    }
}

impl<'a, K: Key, V: Value, S: PageStore> Iterator for Range<'a, K, V, S> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, value)) = self.buffer.pop_front() {
                if self.past_end(&key) {
                    self.finish();
                    return None;
                }
                return Some(Ok((key, value)));
            }
            if self.done {
                return None;
            }
            match self.load_next_leaf() {
                Ok(true) => {}
                Ok(false) => {
                    self.finish();
                    return None;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<'a, K: Key, V: Value, S: PageStore> FusedIterator for Range<'a, K, V, S> {}

impl<K: Key, V: Value, S: PageStore> BTree<K, V, S> {
    /// Entries with keys in `bounds`, in key order.
    ///
    /// # Example
    /// ```
    /// use cowtree::BTree;
    ///
    /// let mut tree: BTree<u32, u32> = BTree::in_memory(3).unwrap();
    /// for k in 1..=10 {
    ///     tree.insert(k, k * 100).unwrap();
    /// }
    ///
    /// let keys: Vec<u32> = tree
    ///     .range(3..=5)
    ///     .map(|entry| entry.map(|(k, _)| k))
    ///     .collect::<Result<_, _>>()
    ///     .unwrap();
    /// assert_eq!(keys, vec![3, 4, 5]);
    /// ```
    pub fn range<R: RangeBounds<K>>(&self, bounds: R) -> Range<'_, K, V, S> {
        Range::new(
            self,
            bounds.start_bound().cloned(),
            bounds.end_bound().cloned(),
        )
    }

    /// Entries with `lo <= key < hi`; a missing bound is unbounded.
    pub fn range_scan(&self, lo: Option<&K>, hi: Option<&K>) -> Range<'_, K, V, S> {
        let start = lo.map_or(Bound::Unbounded, |k| Bound::Included(k.clone()));
        let end = hi.map_or(Bound::Unbounded, |k| Bound::Excluded(k.clone()));
        Range::new(self, start, end)
    }

    /// All entries in key order.
    pub fn iter(&self) -> Range<'_, K, V, S> {
        self.range(..)
    }
}
