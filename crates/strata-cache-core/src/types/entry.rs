//! Cache entry type

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// A stored entry with the metadata a store keeps alongside the value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// When the entry was created (or its TTL last reset)
    pub created_at: SystemTime,
    /// When the entry was last accessed
    pub last_accessed: SystemTime,
    /// Number of times accessed
    pub access_count: u64,
    /// Effective time-to-live
    pub ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    /// Create a new cache entry without expiry
    pub fn new(value: T) -> Self {
        let now = SystemTime::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl: None,
        }
    }

    /// Create entry with TTL
    pub fn with_ttl(value: T, ttl: Option<Duration>) -> Self {
        let mut entry = Self::new(value);
        entry.ttl = ttl;
        entry
    }

    /// Check if entry has expired
    pub fn is_expired(&self) -> bool {
        if let Some(ttl) = self.ttl {
            if let Ok(elapsed) = self.created_at.elapsed() {
                return elapsed >= ttl;
            }
        }
        false
    }

    /// Get remaining TTL
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.ttl.and_then(|ttl| {
            self.created_at
                .elapsed()
                .ok()
                .and_then(|elapsed| ttl.checked_sub(elapsed))
        })
    }

    /// Restart the TTL clock with a new duration
    pub fn reset_ttl(&mut self, ttl: Option<Duration>) {
        self.created_at = SystemTime::now();
        self.ttl = ttl;
    }

    /// Record an access
    pub fn touch(&mut self) {
        self.last_accessed = SystemTime::now();
        self.access_count += 1;
    }

    /// Get age of the entry
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }
}
