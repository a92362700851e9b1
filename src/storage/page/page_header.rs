//! Page header and page kinds.
//!
//! Every page written by the [`DiskPageStore`](crate::storage::DiskPageStore)
//! starts with a [`PageHeader`] that says what the page holds, which
//! write version of the node it is, how long the record is, and a CRC32
//! over all of that.

/// What a page holds.
///
/// The discriminant doubles as the first byte of a node record, so a
/// record names its own kind.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Never written, or unreadable.
    #[default]
    Invalid = 0,
    /// Tree checkpoint (always page 0).
    Meta = 1,
    /// B+Tree internal node.
    BTreeNode = 2,
    /// B+Tree leaf.
    BTreeLeaf = 3,
    /// Deleted node; the identity is never handed out again.
    Free = 4,
}

impl PageType {
    /// Decode a kind byte. Unknown bytes are `Invalid`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PageType::Meta,
            2 => PageType::BTreeNode,
            3 => PageType::BTreeLeaf,
            4 => PageType::Free,
            _ => PageType::Invalid,
        }
    }

    /// True for the two node kinds.
    pub fn is_node(&self) -> bool {
        matches!(self, PageType::BTreeNode | PageType::BTreeLeaf)
    }
}

/// Fixed-size page prefix.
///
/// # Layout (17 bytes, little-endian)
/// ```text
/// 0   kind        u8
/// 1   checksum    u32   CRC32 of kind, version, record_len and the record
/// 5   version     u64
/// 13  record_len  u32
/// ```
///
/// Bytes past the record are not covered by the checksum; a page is
/// always zero-filled before a record is stored in it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
    /// Write version of the node held in this page.
    pub version: u64,
    pub record_len: u32,
}

impl PageHeader {
    pub const SIZE: usize = 17;

    /// A header for a record of `record` under `page_type`, with its
    /// checksum filled in.
    pub fn for_record(page_type: PageType, version: u64, record: &[u8]) -> Self {
        let mut header = Self {
            page_type,
            checksum: 0,
            version,
            record_len: record.len() as u32,
        };
        header.checksum = header.checksum_with(record);
        header
    }

    pub fn decode(bytes: &[u8; Self::SIZE]) -> Self {
        let (kind, rest) = bytes.split_at(1);
        let (checksum, rest) = rest.split_at(4);
        let (version, record_len) = rest.split_at(8);

        Self {
            page_type: PageType::from_u8(kind[0]),
            checksum: u32::from_le_bytes(le_array(checksum)),
            version: u64::from_le_bytes(le_array(version)),
            record_len: u32::from_le_bytes(le_array(record_len)),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.page_type as u8;
        out[1..5].copy_from_slice(&self.checksum.to_le_bytes());
        out[5..13].copy_from_slice(&self.version.to_le_bytes());
        out[13..17].copy_from_slice(&self.record_len.to_le_bytes());
        out
    }

    /// CRC32 over this header's fields (checksum excluded) and `record`.
    pub fn checksum_with(&self, record: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[self.page_type as u8]);
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&self.record_len.to_le_bytes());
        hasher.update(record);
        hasher.finalize()
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_type_from_u8() {
        for kind in [
            PageType::Invalid,
            PageType::Meta,
            PageType::BTreeNode,
            PageType::BTreeLeaf,
            PageType::Free,
        ] {
            assert_eq!(PageType::from_u8(kind as u8), kind);
        }
        assert_eq!(PageType::from_u8(200), PageType::Invalid);
    }

    #[test]
    fn test_page_type_classes() {
        assert!(!PageType::Meta.is_node());
        assert!(PageType::BTreeLeaf.is_node());
        assert!(PageType::BTreeNode.is_node());
        assert!(!PageType::Free.is_node());
        assert!(!PageType::Invalid.is_node());
    }

    #[test]
    fn test_header_field_offsets() {
        let header = PageHeader {
            page_type: PageType::BTreeNode,
            checksum: 0x0403_0201,
            version: 0x0807_0605_0403_0201,
            record_len: 0x0D0C_0B0A,
        };
        let bytes = header.encode();

        assert_eq!(bytes[0], PageType::BTreeNode as u8);
        assert_eq!(&bytes[1..5], &[1, 2, 3, 4]);
        assert_eq!(bytes[5], 0x01);
        assert_eq!(bytes[12], 0x08);
        assert_eq!(&bytes[13..17], &[0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(PageHeader::decode(&bytes), header);
    }

    #[test]
    fn test_checksum_covers_version_and_record() {
        let header = PageHeader::for_record(PageType::BTreeLeaf, 2, b"entries");
        assert_eq!(header.checksum, header.checksum_with(b"entries"));
        assert_ne!(header.checksum, header.checksum_with(b"entrieS"));

        let bumped = PageHeader { version: 3, ..header };
        assert_ne!(bumped.checksum_with(b"entries"), header.checksum);
    }
}
