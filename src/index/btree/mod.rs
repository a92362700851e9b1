//! Copy-on-write B+Tree.
//!
//! # Structure
//! ```text
//!                 ┌──────────────┐
//!                 │ Node [5]     │            height = 2
//!                 └──────┬───────┘
//!              ┌─────────┴──────────┐
//!        ┌─────┴─────┐        ┌─────┴─────┐
//!        │ Node [3]  │        │ Node [7]  │
//!        └──┬─────┬──┘        └──┬─────┬──┘
//!        [1,2]  [3,4]          [5,6]  [7,8]   leaves hold the entries
//! ```
//! - Leaves hold up to `m` entries; nodes hold up to `m` children.
//! - A separator equals the first key of the subtree to its right.
//! - Child slots hold only a [`NodeId`](crate::NodeId); the node cache
//!   materializes children on demand and evicts clean ones.
//! - Mutated nodes are dirty until [`BTree::flush`] writes them, children
//!   before parents.
//!
//! # Modules
//! - `node` - node and leaf representation
//! - `codec` - record encoding
//! - `tree` - the tree handle, lookup and insert
//! - `split` - overflow handling
//! - `rebalance` - remove with redistribute and merge
//! - `iter` - range scans
//! - `validate` - consistency check and dump

pub(crate) mod codec;
mod iter;
pub(crate) mod node;
mod rebalance;
mod split;
mod tree;
mod validate;

pub use codec::{Codec, TreeMeta};
pub use iter::Range;
pub use node::{NodeSnapshot, SnapshotContents};
pub use tree::{BTree, Key, Value};
