//! cowtree - A copy-on-write B+Tree index engine over an abstract page store.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            cowtree                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              B+Tree (index/btree/)                       │   │
//! │  │   lookup · insert/split · remove/rebalance · range scan  │   │
//! │  │              validate · dump · flush · open              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Node Cache (buffer/)                        │   │
//! │  │   NodeId → Node map · FIFO eviction · tombstones         │   │
//! │  │   dirty tracking · children-before-parents write-back    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Page Store (storage/)                       │   │
//! │  │   MemoryPageStore  |  DiskPageStore → DiskManager        │   │
//! │  │              Page + PageHeader (CRC32)                   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (NodeId, Error, config)
//! - [`buffer`] - The node cache and its eviction policy
//! - [`storage`] - Page stores, disk I/O and page formats
//! - [`index`] - The B+Tree
//!
//! # Quick Start
//! ```no_run
//! use cowtree::{BTree, BTreeConfig, DiskPageStore};
//!
//! let store = DiskPageStore::create("my_index.tree").unwrap();
//! let mut tree: BTree<u64, String, _> = BTree::new(BTreeConfig::default(), store).unwrap();
//!
//! tree.insert(1, "one".to_string()).unwrap();
//! tree.flush().unwrap();
//!
//! // Later:
//! let store = DiskPageStore::open("my_index.tree").unwrap();
//! let tree: BTree<u64, String, _> = BTree::open(store, BTreeConfig::default()).unwrap();
//! assert_eq!(tree.lookup(&1).unwrap(), Some("one".to_string()));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Crate-root re-exports
pub use common::config::{BTreeConfig, PAGE_SIZE};
pub use common::{Error, NodeId, Result};

pub use buffer::{CacheStats, StatsSnapshot};
pub use index::btree::{BTree, Codec, Key, NodeSnapshot, Range, SnapshotContents, TreeMeta, Value};
pub use storage::{DiskPageStore, MemoryPageStore, PageStore};
