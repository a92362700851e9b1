//! Record encoding for nodes and the tree checkpoint.
//!
//! # Node record
//! ```text
//! ┌──────┬───────────┬──────────┬──────────────────────────────┐
//! │ kind │ key_count │ keys...  │ values... (leaf)             │
//! │ (1B) │ (4B LE)   │ (Codec)  │ or child ids (node, 8B LE)   │
//! └──────┴───────────┴──────────┴──────────────────────────────┘
//! ```
//! `kind` is the [`PageType`] byte (`BTreeLeaf` or `BTreeNode`). A leaf
//! stores `key_count` values; a node stores `key_count + 1` children.
//!
//! # Checkpoint record
//! ```text
//! magic "CWT1" | branching_factor u32 | root u64 | height u64 |
//! nnodes u64 | nleaves u64 | nentries u64
//! ```
//! Parent back-references and dirty flags are never persisted.

use crate::common::{Error, NodeId, Result};
use crate::index::btree::node::{Internal, Leaf, Node, NodeBody};
use crate::storage::page::PageType;

/// Byte encoding for keys and values stored in the tree.
///
/// Implementations must decode exactly what they encoded and consume
/// exactly the bytes they wrote.
///
/// # Example
/// ```
/// use cowtree::Codec;
///
/// let mut buf = Vec::new();
/// "key".to_string().encode(&mut buf);
/// 42u64.encode(&mut buf);
///
/// let mut input = &buf[..];
/// assert_eq!(String::decode(&mut input).unwrap(), "key");
/// assert_eq!(u64::decode(&mut input).unwrap(), 42);
/// assert!(input.is_empty());
/// ```
pub trait Codec: Sized {
    /// Append the encoding of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode one value from the front of `input`, advancing it.
    fn decode(input: &mut &[u8]) -> Result<Self>;
}

/// Split `n` bytes off the front of `input`.
fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(Error::Corrupted(format!(
            "record truncated: needed {} bytes, {} left",
            n,
            input.len()
        )));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

macro_rules! impl_codec_for_int {
    ($($ty:ty),*) => {
        $(
            impl Codec for $ty {
                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn decode(input: &mut &[u8]) -> Result<Self> {
                    let bytes = take(input, std::mem::size_of::<$ty>())?;
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_codec_for_int!(u8, u16, u32, u64, i32, i64);

impl Codec for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        out.extend_from_slice(self);
    }

    fn decode(input: &mut &[u8]) -> Result<Self> {
        let len = u32::decode(input)? as usize;
        Ok(take(input, len)?.to_vec())
    }
}

impl Codec for String {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(input: &mut &[u8]) -> Result<Self> {
        let bytes = Vec::<u8>::decode(input)?;
        String::from_utf8(bytes).map_err(|e| Error::Corrupted(format!("invalid utf-8 key: {}", e)))
    }
}

impl Codec for NodeId {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
    }

    fn decode(input: &mut &[u8]) -> Result<Self> {
        u64::decode(input).map(NodeId)
    }
}

// =============================================================================
// Node records
// =============================================================================

/// Encode a node's persistent content.
pub(crate) fn encode_node<K: Codec, V: Codec>(node: &Node<K, V>) -> Vec<u8> {
    let mut out = Vec::new();
    match &node.body {
        NodeBody::Leaf(leaf) => {
            out.push(PageType::BTreeLeaf as u8);
            (leaf.keys.len() as u32).encode(&mut out);
            for key in &leaf.keys {
                key.encode(&mut out);
            }
            for value in &leaf.values {
                value.encode(&mut out);
            }
        }
        NodeBody::Internal(internal) => {
            out.push(PageType::BTreeNode as u8);
            (internal.keys.len() as u32).encode(&mut out);
            for key in &internal.keys {
                key.encode(&mut out);
            }
            for child in &internal.children {
                child.encode(&mut out);
            }
        }
    }
    out
}

/// Decode a node record read for `id`.
///
/// The result is clean, carries `version`, and has no parent; the caller
/// sets the parent when materializing it through its owner.
pub(crate) fn decode_node<K: Codec + Ord, V: Codec>(
    id: NodeId,
    version: u64,
    record: &[u8],
) -> Result<Node<K, V>> {
    let mut input = record;
    let kind = PageType::from_u8(u8::decode(&mut input)?);
    let count = u32::decode(&mut input)? as usize;

    let keys = (0..count)
        .map(|_| K::decode(&mut input))
        .collect::<Result<Vec<K>>>()?;

    let body = match kind {
        PageType::BTreeLeaf => {
            let values = (0..count)
                .map(|_| V::decode(&mut input))
                .collect::<Result<Vec<V>>>()?;
            NodeBody::Leaf(Leaf { keys, values })
        }
        PageType::BTreeNode => {
            let children = (0..=count)
                .map(|_| NodeId::decode(&mut input))
                .collect::<Result<Vec<NodeId>>>()?;
            NodeBody::Internal(Internal { keys, children })
        }
        other => {
            return Err(Error::Corrupted(format!(
                "{} has record kind {:?}",
                id, other
            )))
        }
    };

    if !input.is_empty() {
        return Err(Error::Corrupted(format!(
            "{} has {} trailing bytes",
            id,
            input.len()
        )));
    }

    Ok(Node {
        id,
        parent: None,
        dirty: false,
        deleted: false,
        version,
        body,
    })
}

// =============================================================================
// Checkpoint record
// =============================================================================

const META_MAGIC: &[u8; 4] = b"CWT1";

/// Tree-wide state persisted at each flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMeta {
    pub branching_factor: usize,
    pub root: NodeId,
    pub height: usize,
    pub nnodes: usize,
    pub nleaves: usize,
    pub nentries: usize,
}

impl TreeMeta {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48);
        out.extend_from_slice(META_MAGIC);
        (self.branching_factor as u32).encode(&mut out);
        self.root.encode(&mut out);
        for count in [self.height, self.nnodes, self.nleaves, self.nentries] {
            (count as u64).encode(&mut out);
        }
        out
    }

    pub fn decode(record: &[u8]) -> Result<Self> {
        let mut input = record;
        if take(&mut input, META_MAGIC.len())? != META_MAGIC {
            return Err(Error::Corrupted("checkpoint has a bad magic".to_string()));
        }
        let branching_factor = u32::decode(&mut input)? as usize;
        let root = NodeId::decode(&mut input)?;
        let mut counts = [0usize; 4];
        for count in counts.iter_mut() {
            *count = u64::decode(&mut input)? as usize;
        }
        let [height, nnodes, nleaves, nentries] = counts;

        Ok(Self {
            branching_factor,
            root,
            height,
            nnodes,
            nleaves,
            nentries,
        })
    }
}
