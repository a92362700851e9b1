//! Error types for cowtree.

use thiserror::Error;

use crate::common::NodeId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in cowtree.
///
/// A missing key is *not* an error: `lookup` and `remove` report it as
/// `Ok(None)`. Everything here is either an I/O failure, a bad
/// configuration, or a sign that the tree can no longer be trusted.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the page store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page store holds no record for this identity.
    #[error("{0} not found in page store")]
    PageNotFound(NodeId),

    /// A stored page failed CRC32 verification.
    #[error("checksum mismatch on {0}")]
    ChecksumMismatch(NodeId),

    /// An encoded node does not fit in one page.
    #[error("record for {id} is {size} bytes, page holds at most {max}")]
    RecordTooLarge {
        /// Node being written.
        id: NodeId,
        /// Encoded record size.
        size: usize,
        /// Payload capacity of a page.
        max: usize,
    },

    /// A record or checkpoint could not be decoded.
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// Branching factor below the minimum of 3.
    #[error("invalid branching factor {0}: must be at least 3")]
    InvalidBranchingFactor(usize),

    /// Any other rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Access through an identity whose node was merged away or replaced.
    ///
    /// Once reported for an identity, it is reported forever.
    #[error("{0} has been deleted")]
    UseAfterDelete(NodeId),

    /// The tree's structure is broken.
    ///
    /// This indicates a bug. The tree must not be used afterwards.
    #[error("structural invariant violated at {node}: {reason}")]
    InvariantViolation {
        /// Node where the violation was detected.
        node: NodeId,
        /// What was wrong.
        reason: String,
    },
}

impl Error {
    /// Shorthand for building an [`Error::InvariantViolation`].
    pub(crate) fn invariant(node: NodeId, reason: impl Into<String>) -> Self {
        Error::InvariantViolation {
            node,
            reason: reason.into(),
        }
    }

    /// True for errors that mean the tree itself is untrustworthy.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation { .. } | Error::UseAfterDelete(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(NodeId::new(42));
        assert_eq!(format!("{}", err), "Node(42) not found in page store");

        let err = Error::InvalidBranchingFactor(2);
        assert_eq!(
            format!("{}", err),
            "invalid branching factor 2: must be at least 3"
        );

        let err = Error::UseAfterDelete(NodeId::new(7));
        assert_eq!(format!("{}", err), "Node(7) has been deleted");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_structural_classification() {
        assert!(Error::invariant(NodeId::new(1), "keys out of order").is_structural());
        assert!(Error::UseAfterDelete(NodeId::new(1)).is_structural());
        assert!(!Error::InvalidBranchingFactor(1).is_structural());
        assert!(!Error::Corrupted("short".into()).is_structural());
    }
}
