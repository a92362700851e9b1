//! Page-granular file I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, NodeId, Result};
use crate::storage::page::Page;

/// Reads and writes whole pages of one tree file.
///
/// Page `N` lives at byte offset `N * PAGE_SIZE`, and `NodeId(N)` names it:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// ```
///
/// The file only grows. Writes are not durable until [`sync`] returns; the
/// tree syncs once per flush, after every page of that flush is written.
///
/// [`sync`]: DiskManager::sync
pub struct DiskManager {
    file: File,
    page_count: u64,
}

impl DiskManager {
    /// Create a new, empty tree file.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self {
            file,
            page_count: 0,
        })
    }

    /// Open an existing tree file.
    ///
    /// # Errors
    /// Returns `Error::Corrupted` if the file length is not a whole number
    /// of pages, or an I/O error if it cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(Error::Corrupted(format!(
                "file length {} is not a multiple of the page size",
                len
            )));
        }
        Ok(Self {
            file,
            page_count: len / PAGE_SIZE as u64,
        })
    }

    /// Read page `id`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` for a page past the end of the file.
    pub fn read_page(&mut self, id: NodeId) -> Result<Page> {
        self.seek_to(id)?;
        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;
        Ok(page)
    }

    /// Overwrite page `id`, which must already be allocated.
    pub fn write_page(&mut self, id: NodeId, page: &Page) -> Result<()> {
        self.seek_to(id)?;
        self.file.write_all(page.as_slice())?;
        Ok(())
    }

    /// Grow the file by one zeroed page and return its identity.
    pub fn allocate_page(&mut self) -> Result<NodeId> {
        let id = NodeId::new(self.page_count);
        self.file.set_len((self.page_count + 1) * PAGE_SIZE as u64)?;
        self.page_count += 1;
        Ok(id)
    }

    /// Flush data and metadata to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    #[inline]
    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    fn seek_to(&mut self, id: NodeId) -> Result<()> {
        if id.0 >= self.page_count {
            return Err(Error::PageNotFound(id));
        }
        self.file.seek(SeekFrom::Start(id.0 * PAGE_SIZE as u64))?;
        Ok(())
    }
}
