//! Eviction policy for the node cache.
//!
//! - [`FifoReplacer`] - evicts clean nodes in materialization order

mod fifo;

pub use fifo::FifoReplacer;
