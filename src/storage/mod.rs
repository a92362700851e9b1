//! Storage layer - the page store collaborator and its implementations.
//!
//! This module handles persistent storage:
//! - [`PageStore`] - The contract the tree persists through
//! - [`MemoryPageStore`] - HashMap-backed store
//! - [`DiskPageStore`] - One record per page in a single file
//! - [`DiskManager`] - Low-level file I/O
//! - [`page`] - Page types and layouts

mod disk_manager;
mod disk_page_store;
pub mod page;
mod page_store;

pub use disk_manager::DiskManager;
pub use disk_page_store::DiskPageStore;
pub use page_store::{MemoryPageStore, PageStore, StoredRecord};
