//! File-backed [`PageStore`] built on the [`DiskManager`].

use std::path::Path;

use crate::common::{Error, NodeId, Result};
use crate::storage::page::{Page, PageType};
use crate::storage::page_store::{PageStore, StoredRecord};
use crate::storage::DiskManager;

/// Identity of the checkpoint page.
const META_PAGE: NodeId = NodeId(0);

/// A [`PageStore`] that keeps one record per 4KB page in a single file.
///
/// # Layout
/// - Page 0 holds the tree checkpoint.
/// - Page N holds the record of `NodeId(N)`.
///
/// Deleted pages are overwritten with a `PageType::Free` header and are
/// never handed out again, so identities stay unique for the file's life.
///
/// # Integrity
/// Every written page is CRC32-checksummed. A page that fails verification
/// is reported as `Error::ChecksumMismatch` instead of being decoded.
pub struct DiskPageStore {
    disk: DiskManager,
}

impl DiskPageStore {
    /// Create a new tree file with an empty checkpoint page.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut disk = DiskManager::create(path)?;
        let meta = disk.allocate_page()?;
        debug_assert_eq!(meta, META_PAGE);
        Ok(Self { disk })
    }

    /// Open an existing tree file.
    ///
    /// # Errors
    /// Returns `Error::Corrupted` if the file has no checkpoint page.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let disk = DiskManager::open(path)?;
        if disk.page_count() == 0 {
            return Err(Error::Corrupted("file has no checkpoint page".to_string()));
        }
        Ok(Self { disk })
    }

    /// Number of pages in the file, including the checkpoint page.
    pub fn page_count(&self) -> u64 {
        self.disk.page_count()
    }

    /// Read a page and check it, returning None for never-written pages.
    fn read_checked(&mut self, id: NodeId) -> Result<Option<Page>> {
        let page = self.disk.read_page(id)?;
        if page.is_blank() {
            return Ok(None);
        }
        if !page.verify_checksum() {
            return Err(Error::ChecksumMismatch(id));
        }
        Ok(Some(page))
    }

    fn check_node_id(&self, id: NodeId) -> Result<()> {
        if id == META_PAGE || id.0 >= self.disk.page_count() {
            return Err(Error::PageNotFound(id));
        }
        Ok(())
    }
}

impl PageStore for DiskPageStore {
    fn allocate(&mut self) -> Result<NodeId> {
        self.disk.allocate_page()
    }

    fn read(&mut self, id: NodeId) -> Result<StoredRecord> {
        self.check_node_id(id)?;

        let page = self.read_checked(id)?.ok_or(Error::PageNotFound(id))?;
        let header = page.header();
        if !header.page_type.is_node() {
            return Err(Error::PageNotFound(id));
        }

        let bytes = page
            .record()
            .ok_or_else(|| Error::Corrupted(format!("{} has a bad record length", id)))?;

        Ok(StoredRecord {
            version: header.version,
            bytes: bytes.to_vec(),
        })
    }

    fn write(&mut self, id: NodeId, version: u64, record: &[u8]) -> Result<()> {
        self.check_node_id(id)?;

        let page_type = PageType::from_u8(record.first().copied().unwrap_or(0));
        if !page_type.is_node() {
            return Err(Error::Corrupted(format!(
                "record for {} has unknown kind {:?}",
                id, page_type
            )));
        }

        let page = Page::with_record(id, page_type, version, record)?;
        self.disk.write_page(id, &page)
    }

    fn delete(&mut self, id: NodeId) -> Result<()> {
        self.check_node_id(id)?;

        let page = Page::with_record(id, PageType::Free, 0, &[])?;
        self.disk.write_page(id, &page)
    }

    fn write_meta(&mut self, record: &[u8]) -> Result<()> {
        let page = Page::with_record(META_PAGE, PageType::Meta, 0, record)?;
        self.disk.write_page(META_PAGE, &page)
    }

    fn read_meta(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(page) = self.read_checked(META_PAGE)? else {
            return Ok(None);
        };
        if page.header().page_type != PageType::Meta {
            return Err(Error::Corrupted("page 0 is not a checkpoint".to_string()));
        }
        let bytes = page
            .record()
            .ok_or_else(|| Error::Corrupted("checkpoint has a bad record length".to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    fn record_capacity(&self) -> usize {
        Page::RECORD_CAPACITY
    }

    fn sync(&mut self) -> Result<()> {
        self.disk.sync()
    }
}
