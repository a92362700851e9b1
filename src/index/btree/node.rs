//! In-memory node and leaf representation.
//!
//! A [`Node`] carries the state shared by both variants (identity, parent
//! back-reference, dirty and deleted flags, write version) and a
//! [`NodeBody`] that is either a [`Leaf`] or an [`Internal`] node.

use crate::common::{Error, NodeId, Result};

/// Sorted keys with one value per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) values: Vec<V>,
}

impl<K: Ord, V> Leaf<K, V> {
    /// Create an empty leaf.
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if the leaf holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Binary search for `key`: `Ok(index)` if present, `Err(insert_at)` if not.
    #[inline]
    pub fn search(&self, key: &K) -> std::result::Result<usize, usize> {
        self.keys.binary_search(key)
    }

    pub(crate) fn insert_at(&mut self, index: usize, key: K, value: V) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> (K, V) {
        (self.keys.remove(index), self.values.remove(index))
    }

    pub(crate) fn push(&mut self, key: K, value: V) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub(crate) fn pop(&mut self) -> Option<(K, V)> {
        let key = self.keys.pop()?;
        let value = self.values.pop()?;
        Some((key, value))
    }

    /// Move entries `[at, len)` into a new leaf.
    pub(crate) fn split_off(&mut self, at: usize) -> Self {
        Self {
            keys: self.keys.split_off(at),
            values: self.values.split_off(at),
        }
    }

    /// Append all of `right`'s entries after this leaf's entries.
    pub(crate) fn append(&mut self, mut right: Self) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
    }

    /// Insert all of `left`'s entries before this leaf's entries.
    pub(crate) fn prepend(&mut self, mut left: Self) {
        left.keys.append(&mut self.keys);
        left.values.append(&mut self.values);
        *self = left;
    }
}

impl<K: Ord, V> Default for Leaf<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Separator keys and child identities.
///
/// `children.len() == keys.len() + 1`; everything under `children[i]` is
/// `>= keys[i - 1]` and `< keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Internal<K> {
    pub(crate) keys: Vec<K>,
    pub(crate) children: Vec<NodeId>,
}

impl<K: Ord> Internal<K> {
    /// A node with one separator and two children, as made by a root split.
    pub fn new(separator: K, left: NodeId, right: NodeId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    /// Index of the child whose range covers `key`.
    ///
    /// That is the first separator strictly greater than `key`, or the last
    /// child if there is none.
    #[inline]
    pub fn child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|sep| sep <= key)
    }

    /// Number of children.
    #[inline]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Split around the middle key, which is removed and returned.
    ///
    /// With `n` keys and `mid = n / 2`, this node keeps keys `[0, mid)` and
    /// children `[0, mid]`; the new node gets keys `(mid, n)` and children
    /// `(mid, n]`.
    pub(crate) fn split_middle(&mut self) -> Option<(K, Self)> {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let separator = self.keys.pop()?;
        let right_children = self.children.split_off(mid + 1);
        Some((
            separator,
            Self {
                keys: right_keys,
                children: right_children,
            },
        ))
    }
}

impl<K> Default for Internal<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// The variant part of a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody<K, V> {
    Leaf(Leaf<K, V>),
    Internal(Internal<K>),
}

/// A materialized node or leaf.
#[derive(Debug, Clone)]
pub struct Node<K, V> {
    pub(crate) id: NodeId,
    /// Owning node, or None for the root. In-memory only.
    pub(crate) parent: Option<NodeId>,
    /// Mutated since it was last written to the page store.
    pub(crate) dirty: bool,
    /// Merged away or replaced. Never cleared.
    pub(crate) deleted: bool,
    /// Version of the last write to the page store (0 = never written).
    pub(crate) version: u64,
    pub(crate) body: NodeBody<K, V>,
}

impl<K: Ord, V> Node<K, V> {
    /// A new, dirty node that has never been written.
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, body: NodeBody<K, V>) -> Self {
        Self {
            id,
            parent,
            dirty: true,
            deleted: false,
            version: 0,
            body,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    /// The node's keys (entries of a leaf, separators of a node).
    pub fn keys(&self) -> &[K] {
        match &self.body {
            NodeBody::Leaf(leaf) => &leaf.keys,
            NodeBody::Internal(node) => &node.keys,
        }
    }

    /// Entries of a leaf or children of a node; the quantity that the
    /// capacity bounds apply to.
    pub fn occupancy(&self) -> usize {
        match &self.body {
            NodeBody::Leaf(leaf) => leaf.len(),
            NodeBody::Internal(node) => node.child_count(),
        }
    }

    /// Borrow as a leaf, failing if this is an internal node.
    pub fn leaf(&self) -> Result<&Leaf<K, V>> {
        match &self.body {
            NodeBody::Leaf(leaf) => Ok(leaf),
            NodeBody::Internal(_) => Err(Error::invariant(self.id, "expected a leaf")),
        }
    }

    pub(crate) fn leaf_mut(&mut self) -> Result<&mut Leaf<K, V>> {
        match &mut self.body {
            NodeBody::Leaf(leaf) => Ok(leaf),
            NodeBody::Internal(_) => Err(Error::invariant(self.id, "expected a leaf")),
        }
    }

    /// Borrow as an internal node, failing if this is a leaf.
    pub fn internal(&self) -> Result<&Internal<K>> {
        match &self.body {
            NodeBody::Internal(node) => Ok(node),
            NodeBody::Leaf(_) => Err(Error::invariant(self.id, "expected an internal node")),
        }
    }

    pub(crate) fn internal_mut(&mut self) -> Result<&mut Internal<K>> {
        match &mut self.body {
            NodeBody::Internal(node) => Ok(node),
            NodeBody::Leaf(_) => Err(Error::invariant(self.id, "expected an internal node")),
        }
    }

    /// Empty the body out, leaving a body of the same variant behind.
    pub(crate) fn take_body(&mut self) -> NodeBody<K, V> {
        let empty = match self.body {
            NodeBody::Leaf(_) => NodeBody::Leaf(Leaf::new()),
            NodeBody::Internal(_) => NodeBody::Internal(Internal::default()),
        };
        std::mem::replace(&mut self.body, empty)
    }
}

/// What a [`NodeSnapshot`] holds besides keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotContents<V> {
    /// A leaf's values, parallel to its keys.
    Values(Vec<V>),
    /// A node's child identities.
    Children(Vec<NodeId>),
}

/// An owned copy of one node's structural state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot<K, V> {
    pub id: NodeId,
    /// None for the root, and for nodes read straight from the page store.
    pub parent: Option<NodeId>,
    pub dirty: bool,
    pub version: u64,
    pub keys: Vec<K>,
    pub contents: SnapshotContents<V>,
}

impl<K, V> NodeSnapshot<K, V> {
    pub fn is_leaf(&self) -> bool {
        matches!(self.contents, SnapshotContents::Values(_))
    }

    /// Leaf values, or None for an internal node.
    pub fn values(&self) -> Option<&[V]> {
        match &self.contents {
            SnapshotContents::Values(values) => Some(values),
            SnapshotContents::Children(_) => None,
        }
    }

    /// Child identities, or None for a leaf.
    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.contents {
            SnapshotContents::Children(children) => Some(children),
            SnapshotContents::Values(_) => None,
        }
    }
}

impl<K: Clone, V: Clone> From<&Node<K, V>> for NodeSnapshot<K, V> {
    fn from(node: &Node<K, V>) -> Self {
        let (keys, contents) = match &node.body {
            NodeBody::Leaf(leaf) => (
                leaf.keys.clone(),
                SnapshotContents::Values(leaf.values.clone()),
            ),
            NodeBody::Internal(internal) => (
                internal.keys.clone(),
                SnapshotContents::Children(internal.children.clone()),
            ),
        };
        Self {
            id: node.id,
            parent: node.parent,
            dirty: node.dirty,
            version: node.version,
            keys,
            contents,
        }
    }
}
