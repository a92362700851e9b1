//! Node cache counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// One event the node cache counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// A child resolved to a node already in memory.
    CacheHit,
    /// A child had to be read from the page store.
    CacheMiss,
    /// A clean node was dropped from memory.
    Eviction,
    /// A record was decoded from the page store.
    NodeRead,
    /// A record was written to the page store.
    NodeWritten,
    /// A record was deleted from the page store.
    NodeDeleted,
}

impl Counter {
    const COUNT: usize = 6;

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Event counters of a [`NodePool`](crate::buffer::NodePool).
///
/// Counters are relaxed atomics so a shared reference can both bump and
/// read them.
///
/// # Example
/// ```
/// use cowtree::buffer::{CacheStats, Counter};
///
/// let stats = CacheStats::new();
/// stats.record(Counter::CacheHit);
/// assert_eq!(stats.get(Counter::CacheHit), 1);
/// assert_eq!(stats.snapshot().cache_hits, 1);
/// ```
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: [AtomicU64; Counter::COUNT],
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&self, counter: Counter) {
        self.counters[counter.slot()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.get(Counter::CacheHit),
            cache_misses: self.get(Counter::CacheMiss),
            evictions: self.get(Counter::Eviction),
            nodes_read: self.get(Counter::NodeRead),
            nodes_written: self.get(Counter::NodeWritten),
            nodes_deleted: self.get(Counter::NodeDeleted),
        }
    }
}

/// Plain copy of [`CacheStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
    pub nodes_read: u64,
    pub nodes_written: u64,
    pub nodes_deleted: u64,
}

impl StatsSnapshot {
    /// Fraction of child resolutions served from memory, or 0.0 before any.
    pub fn hit_rate(&self) -> f64 {
        match self.cache_hits + self.cache_misses {
            0 => 0.0,
            lookups => self.cache_hits as f64 / lookups as f64,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} ({:.1}% hit) evicted={} read={} written={} deleted={}",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.nodes_read,
            self.nodes_written,
            self.nodes_deleted,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_stats_are_zero() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.snapshot().hit_rate(), 0.0);
    }

    #[test]
    fn test_counters_are_independent() {
        let stats = CacheStats::new();
        for _ in 0..7 {
            stats.record(Counter::CacheHit);
        }
        for _ in 0..3 {
            stats.record(Counter::CacheMiss);
        }
        stats.record(Counter::NodeDeleted);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 7);
        assert_eq!(snapshot.cache_misses, 3);
        assert_eq!(snapshot.nodes_deleted, 1);
        assert_eq!(snapshot.nodes_written, 0);
        assert_eq!(snapshot.hit_rate(), 0.7);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats::new();
        for _ in 0..3 {
            stats.record(Counter::CacheHit);
        }
        stats.record(Counter::CacheMiss);
        stats.record(Counter::Eviction);

        let display = stats.snapshot().to_string();
        assert!(display.contains("hits=3"));
        assert!(display.contains("misses=1"));
        assert!(display.contains("75.0% hit"));
        assert!(display.contains("evicted=1"));
    }
}
