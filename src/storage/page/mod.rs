//! On-disk page format.
//!
//! - [`Page`] - one 4KB unit of I/O holding a single record
//! - [`PageHeader`] - kind, checksum, version and record length
//! - [`PageType`] - what a page holds

#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use page::Page;
pub use page_header::{PageHeader, PageType};
