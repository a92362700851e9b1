//! The 4KB unit of disk I/O.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, NodeId, Result};

use super::page_header::{PageHeader, PageType};

/// One page: a [`PageHeader`], one encoded record, then zero fill.
///
/// ```text
/// ┌──────────────┬──────────────────────────────┬───────────┐
/// │ PageHeader   │ record (record_len bytes)    │ zero fill │
/// │ (17 bytes)   │                              │           │
/// └──────────────┴──────────────────────────────┴───────────┘
/// ```
///
/// Pages are only built through [`Page::with_record`] or read back by the
/// [`DiskManager`](crate::storage::DiskManager), so a page in memory is
/// either well-formed or exactly what the file held.
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Bytes available for a record after the header.
    pub const RECORD_CAPACITY: usize = PAGE_SIZE - PageHeader::SIZE;

    /// A zeroed page, as a freshly allocated file page reads back.
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// A page holding `record` as the given kind and version of `id`.
    ///
    /// # Errors
    /// Returns `Error::RecordTooLarge` if `record` exceeds
    /// [`Page::RECORD_CAPACITY`].
    pub fn with_record(id: NodeId, page_type: PageType, version: u64, record: &[u8]) -> Result<Self> {
        if record.len() > Self::RECORD_CAPACITY {
            return Err(Error::RecordTooLarge {
                id,
                size: record.len(),
                max: Self::RECORD_CAPACITY,
            });
        }

        let mut page = Self::new();
        let header = PageHeader::for_record(page_type, version, record);
        page.data[..PageHeader::SIZE].copy_from_slice(&header.encode());
        page.data[PageHeader::SIZE..PageHeader::SIZE + record.len()].copy_from_slice(record);
        Ok(page)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// True if the page was allocated but never written.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    pub fn header(&self) -> PageHeader {
        let mut bytes = [0u8; PageHeader::SIZE];
        bytes.copy_from_slice(&self.data[..PageHeader::SIZE]);
        PageHeader::decode(&bytes)
    }

    /// The record bytes, or None if the header's length is out of range.
    pub fn record(&self) -> Option<&[u8]> {
        let len = self.header().record_len as usize;
        if len > Self::RECORD_CAPACITY {
            return None;
        }
        Some(&self.data[PageHeader::SIZE..PageHeader::SIZE + len])
    }

    /// True if the stored checksum matches the header and record.
    pub fn verify_checksum(&self) -> bool {
        let header = self.header();
        self.record()
            .is_some_and(|record| header.checksum == header.checksum_with(record))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
