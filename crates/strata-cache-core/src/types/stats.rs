//! Store and strategy statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics reported by a cache store
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of write operations
    pub writes: u64,
    /// Number of delete operations
    pub deletes: u64,
    /// Number of entries removed because they expired
    pub expirations: u64,
    /// Current number of entries
    pub size: usize,
    /// Approximate memory usage in bytes
    pub memory_bytes: usize,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Per-strategy counters
///
/// Derived on demand and never consulted for behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads the cache could not serve
    pub misses: u64,
    /// Values admitted into the cache
    pub admissions: u64,
    /// Keys displaced by the eviction policy
    pub evictions: u64,
    /// Explicit deletes observed
    pub deletes: u64,
    /// Deferred writes waiting for a flush
    pub pending_writes: usize,
    /// Deferred writes dropped after exhausting retries
    pub failed_writes: u64,
}

impl StrategyStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters a policy updates from its hooks
#[derive(Debug, Default)]
pub struct StrategyCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    admissions: AtomicU64,
    evictions: AtomicU64,
    deletes: AtomicU64,
}

impl StrategyCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn admission(&self) {
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters
    pub fn snapshot(&self) -> StrategyStats {
        StrategyStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            admissions: self.admissions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            ..Default::default()
        }
    }

    /// Reset every counter to zero
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.admissions.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}
