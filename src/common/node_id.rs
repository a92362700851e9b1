//! Node identifier type.

use std::fmt;

/// Stable identity of a node or leaf.
///
/// Identities are issued by the page store's allocator and are never
/// reused, so an identity that was once deleted stays deleted.
///
/// # Example
/// ```
/// use cowtree::NodeId;
///
/// let id = NodeId::new(42);
/// assert!(id.is_valid());
/// assert_eq!(id.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Invalid/sentinel node ID.
    ///
    /// Used to represent "no node", e.g. an empty checkpoint slot.
    pub const INVALID: NodeId = NodeId(u64::MAX);

    /// Create a new NodeId.
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Check if this node ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Node(INVALID)")
        } else {
            write!(f, "Node({})", self.0)
        }
    }
}
