//! Configuration for cowtree.
//!
//! Compile-time constants live at module level; per-tree settings live in
//! [`BTreeConfig`].

use crate::common::{Error, Result};

/// Size of a page in bytes (4KB).
///
/// [`DiskPageStore`](crate::storage::DiskPageStore) keeps one node record
/// per page, so this also bounds the encoded size of a node.
pub const PAGE_SIZE: usize = 4096;

/// Smallest branching factor that still allows splits and merges.
///
/// At m = 3 a leaf holds 2..=3 entries and a node 2..=3 children, which is
/// a 2-3 tree.
pub const MIN_BRANCHING_FACTOR: usize = 3;

/// Branching factor used by [`BTreeConfig::default`].
pub const DEFAULT_BRANCHING_FACTOR: usize = 32;

/// Resident node budget used by [`BTreeConfig::default`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Per-tree settings, fixed at construction.
///
/// # Example
/// ```
/// use cowtree::BTreeConfig;
///
/// let config = BTreeConfig::new(3).with_cache_capacity(16);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_leaf_entries(), 3);
/// assert_eq!(config.min_leaf_entries(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeConfig {
    /// Maximum children per node and maximum entries per leaf.
    pub branching_factor: usize,
    /// Resident nodes kept before clean nodes are evicted.
    pub cache_capacity: usize,
}

impl BTreeConfig {
    /// Config with the given branching factor and the default cache size.
    pub fn new(branching_factor: usize) -> Self {
        Self {
            branching_factor,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Set the resident node budget.
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Reject values the tree cannot work with.
    ///
    /// # Errors
    /// - `Error::InvalidBranchingFactor` if `branching_factor < 3`
    /// - `Error::InvalidConfig` if `cache_capacity` is 0
    pub fn validate(&self) -> Result<()> {
        if self.branching_factor < MIN_BRANCHING_FACTOR {
            return Err(Error::InvalidBranchingFactor(self.branching_factor));
        }
        if self.cache_capacity == 0 {
            return Err(Error::InvalidConfig(
                "cache_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Largest number of entries a leaf may hold.
    #[inline]
    pub fn max_leaf_entries(&self) -> usize {
        self.branching_factor
    }

    /// Smallest number of entries a non-root leaf may hold.
    #[inline]
    pub fn min_leaf_entries(&self) -> usize {
        self.branching_factor.div_ceil(2)
    }

    /// Largest number of children a node may hold.
    #[inline]
    pub fn max_children(&self) -> usize {
        self.branching_factor
    }

    /// Smallest number of children a non-root node may hold.
    #[inline]
    pub fn min_children(&self) -> usize {
        self.branching_factor.div_ceil(2)
    }

    /// Smallest number of separator keys a non-root node may hold.
    #[inline]
    pub fn min_keys(&self) -> usize {
        self.min_children() - 1
    }
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BRANCHING_FACTOR)
    }
}
