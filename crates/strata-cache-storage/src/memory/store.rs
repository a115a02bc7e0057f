//! In-memory cache store using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strata_cache_core::{CacheEntry, CacheStats, CacheStore, KeyPattern, Result};

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Pre-allocated entry slots
    pub initial_capacity: usize,
    /// Upper bound applied to every TTL (None = no bound)
    pub max_ttl: Option<Duration>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1_024,
            max_ttl: None,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            ..Default::default()
        }
    }

    /// Cap every TTL at `max_ttl`
    pub fn max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = Some(max_ttl);
        self
    }
}

/// Internal statistics tracking
#[derive(Debug, Default)]
struct MemoryStats {
    hits: u64,
    misses: u64,
    writes: u64,
    deletes: u64,
    expirations: u64,
}

/// In-memory cache store
///
/// Expired entries are dropped lazily on access and by `purge_expired`.
/// Cloning creates a new handle to the SAME underlying store.
#[derive(Clone)]
pub struct MemoryStore {
    /// Main data store
    data: Arc<DashMap<String, CacheEntry<Value>>>,
    /// Statistics
    stats: Arc<RwLock<MemoryStats>>,
    /// Reported by `is_healthy`
    healthy: Arc<AtomicBool>,
    /// Configuration
    config: MemoryConfig,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.initial_capacity)),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            healthy: Arc::new(AtomicBool::new(true)),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Mark the store healthy or unhealthy
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.data.len());
        if removed > 0 {
            self.stats.write().expirations += removed as u64;
        }
        removed
    }

    /// Get approximate memory usage
    pub fn memory_usage(&self) -> usize {
        self.data
            .iter()
            .map(|entry| entry.value.to_string().len() + entry.key().len())
            .sum()
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        match (ttl, self.config.max_ttl) {
            (Some(ttl), Some(max)) => Some(ttl.min(max)),
            (None, Some(max)) => Some(max),
            (ttl, None) => ttl,
        }
    }

    /// Drop the entry if it has expired; returns true if it was dropped
    fn expire_if_needed(&self, key: &str) -> bool {
        let removed = self
            .data
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some();
        if removed {
            self.stats.write().expirations += 1;
        }
        removed
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>> {
        self.expire_if_needed(key);

        match self.data.get_mut(key) {
            Some(mut entry) => {
                entry.touch();
                self.stats.write().hits += 1;
                Ok(Some(entry.clone()))
            }
            None => {
                self.stats.write().misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::with_ttl(value, self.effective_ttl(ttl));
        self.data.insert(key.to_string(), entry);
        self.stats.write().writes += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.data.remove(key) {
            Some((_, entry)) => {
                self.stats.write().deletes += 1;
                Ok(!entry.is_expired())
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.data.clear();
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.expire_if_needed(key);
        Ok(self.data.contains_key(key))
    }

    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| !entry.is_expired())
            .filter(|entry| pattern.is_none_or(|p| p.matches(entry.key())))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.expire_if_needed(key);
        Ok(self.data.get(key).and_then(|entry| entry.ttl_remaining()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_if_needed(key);
        let ttl = self.effective_ttl(Some(ttl));
        match self.data.get_mut(key) {
            Some(mut entry) => {
                entry.reset_ttl(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self) -> Result<CacheStats> {
        let stats = self.stats.read();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            writes: stats.writes,
            deletes: stats.deletes,
            expirations: stats.expirations,
            size: self.data.len(),
            memory_bytes: self.memory_usage(),
        })
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.data.len())
            .field("config", &self.config)
            .finish()
    }
}
