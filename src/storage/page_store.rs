//! The page store contract and its in-memory implementation.
//!
//! A [`PageStore`] is the persistence collaborator of the tree: it hands out
//! identities and keeps one encoded record per identity. It knows nothing
//! about keys, ordering, or tree shape.

use std::collections::{HashMap, HashSet};

use crate::common::{Error, NodeId, Result};

/// One record as returned by [`PageStore::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Write version the record was stored with.
    pub version: u64,
    /// Encoded node.
    pub bytes: Vec<u8>,
}

/// Backing store for node records.
///
/// # Contract
/// - `allocate` never returns the same identity twice for one store.
/// - `read` returns exactly the bytes last passed to `write` for that id.
/// - After `delete`, `read` fails with `Error::PageNotFound`.
/// - Nothing is required to be durable before `sync` returns.
pub trait PageStore {
    /// Hand out a fresh identity.
    fn allocate(&mut self) -> Result<NodeId>;

    /// Read the current record for `id`.
    fn read(&mut self, id: NodeId) -> Result<StoredRecord>;

    /// Store `record` as version `version` of `id`.
    fn write(&mut self, id: NodeId, version: u64, record: &[u8]) -> Result<()>;

    /// Tombstone `id`.
    fn delete(&mut self, id: NodeId) -> Result<()>;

    /// Store the tree checkpoint.
    fn write_meta(&mut self, record: &[u8]) -> Result<()>;

    /// Read the tree checkpoint, if one was ever written.
    fn read_meta(&mut self) -> Result<Option<Vec<u8>>>;

    /// Largest record `write` accepts.
    fn record_capacity(&self) -> usize {
        usize::MAX
    }

    /// Durability barrier.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

/// HashMap-backed [`PageStore`].
///
/// The default store for trees that never touch disk. It also counts writes
/// and deletes, which tests use to observe flush behavior.
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    records: HashMap<NodeId, StoredRecord>,
    /// Deleted ids, so writes to them keep failing.
    deleted: HashSet<NodeId>,
    meta: Option<Vec<u8>>,
    next_id: u64,
    writes: u64,
}

impl MemoryPageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Number of live records.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// True if `id` was deleted.
    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.deleted.contains(&id)
    }

    /// True if a record exists for `id`.
    pub fn contains(&self, id: NodeId) -> bool {
        self.records.contains_key(&id)
    }
}

impl PageStore for MemoryPageStore {
    fn allocate(&mut self) -> Result<NodeId> {
        // Default-constructed stores start at 0; keep ids non-zero anyway.
        self.next_id = self.next_id.max(1);
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    fn read(&mut self, id: NodeId) -> Result<StoredRecord> {
        self.records.get(&id).cloned().ok_or(Error::PageNotFound(id))
    }

    fn write(&mut self, id: NodeId, version: u64, record: &[u8]) -> Result<()> {
        if self.deleted.contains(&id) || id.0 >= self.next_id {
            return Err(Error::PageNotFound(id));
        }
        self.records.insert(
            id,
            StoredRecord {
                version,
                bytes: record.to_vec(),
            },
        );
        self.writes += 1;
        Ok(())
    }

    fn delete(&mut self, id: NodeId) -> Result<()> {
        self.records.remove(&id);
        self.deleted.insert(id);
        Ok(())
    }

    fn write_meta(&mut self, record: &[u8]) -> Result<()> {
        self.meta = Some(record.to_vec());
        Ok(())
    }

    fn read_meta(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.meta.clone())
    }
}
