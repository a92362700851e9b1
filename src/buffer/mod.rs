//! Node cache.
//!
//! The node cache is the in-memory layer between the tree and its page
//! store. It keeps one materialized instance per node identity and evicts
//! clean nodes once too many are resident.
//!
//! # Components
//! - [`NodePool`] - The identity-keyed node cache
//! - [`CacheStats`] / [`StatsSnapshot`] - Performance statistics
//! - [`replacer`] - Eviction policy

mod node_pool;
pub mod replacer;
mod stats;

pub use node_pool::NodePool;
pub use stats::{CacheStats, Counter, StatsSnapshot};
