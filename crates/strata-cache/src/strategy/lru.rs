//! Least-recently-used eviction policy
//!
//! Every admission, and every hit on an admitted key, stamps the key with the next value of a
//! monotonically increasing counter. When an admission pushes the tracked
//! set past `max_size`, the keys with the smallest stamps are dropped from
//! the access log and handed back to the caller, which removes them from
//! the store. The policy itself never touches the store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use strata_cache_core::{CacheStrategy, StrategyCounters, StrategyStats, Value};

use super::AdmissionConfig;

/// Configuration for the LRU policy
#[derive(Debug, Clone)]
pub struct LruConfig {
    /// Maximum number of tracked keys
    pub max_size: usize,
    /// Admission filter and TTL bounds
    pub admission: AdmissionConfig,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            admission: AdmissionConfig::default(),
        }
    }
}

impl LruConfig {
    /// Create config with specific capacity
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    /// Replace the admission filter
    pub fn admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }
}

#[derive(Debug, Default)]
struct AccessLog {
    clock: u64,
    stamps: HashMap<String, u64>,
}

impl AccessLog {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        match self.stamps.get_mut(key) {
            Some(stamp) => *stamp = self.clock,
            None => {
                self.stamps.insert(key.to_string(), self.clock);
            }
        }
    }

    /// Restamp a key that is already tracked
    fn refresh(&mut self, key: &str) -> bool {
        let Some(stamp) = self.stamps.get_mut(key) else {
            return false;
        };
        self.clock += 1;
        *stamp = self.clock;
        true
    }

    /// Keys ordered from least to most recently used
    fn ordered(&self) -> Vec<(&String, u64)> {
        let mut order: Vec<(&String, u64)> = self.stamps.iter().map(|(k, s)| (k, *s)).collect();
        order.sort_by_key(|(_, stamp)| *stamp);
        order
    }

    fn evict_overflow(&mut self, max_size: usize) -> Vec<String> {
        if self.stamps.len() <= max_size {
            return Vec::new();
        }

        let excess = self.stamps.len() - max_size;
        let victims: Vec<String> = self
            .ordered()
            .into_iter()
            .take(excess)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &victims {
            self.stamps.remove(key);
        }
        victims
    }
}

/// Recency-based eviction policy
#[derive(Debug)]
pub struct LruStrategy {
    config: LruConfig,
    log: Mutex<AccessLog>,
    counters: StrategyCounters,
}

impl LruStrategy {
    pub fn new(config: LruConfig) -> Self {
        Self {
            config,
            log: Mutex::new(AccessLog::default()),
            counters: StrategyCounters::new(),
        }
    }

    /// LRU policy with default admission and the given capacity
    pub fn with_max_size(max_size: usize) -> Self {
        Self::new(LruConfig::with_max_size(max_size))
    }

    /// Record an admission and return the keys it displaced
    pub fn admit(&self, key: &str) -> Vec<String> {
        let mut log = self.log.lock();
        log.touch(key);
        log.evict_overflow(self.config.max_size)
    }

    /// Record a hit
    ///
    /// Keys that were never admitted are not tracked. Returns `false` for
    /// them.
    pub fn touch(&self, key: &str) -> bool {
        self.log.lock().refresh(key)
    }

    /// Up to `n` keys, most recently used first
    pub fn most_recently_used(&self, n: usize) -> Vec<String> {
        let log = self.log.lock();
        log.ordered()
            .into_iter()
            .rev()
            .take(n)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Up to `n` keys, least recently used first
    pub fn least_recently_used(&self, n: usize) -> Vec<String> {
        let log = self.log.lock();
        log.ordered()
            .into_iter()
            .take(n)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of tracked keys
    pub fn tracked_len(&self) -> usize {
        self.log.lock().stamps.len()
    }

    /// Check if a key is tracked
    pub fn contains(&self, key: &str) -> bool {
        self.log.lock().stamps.contains_key(key)
    }

    /// Forget every tracked key and reset the counters
    pub fn reset(&self) {
        *self.log.lock() = AccessLog::default();
        self.counters.reset();
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }
}

impl CacheStrategy for LruStrategy {
    fn name(&self) -> &str {
        "lru"
    }

    fn should_cache(&self, key: &str, value: &Value) -> bool {
        self.config.admission.admits(key, value)
    }

    fn ttl_for(&self, _key: &str, _value: &Value) -> Duration {
        let admission = &self.config.admission;
        admission.clamp(admission.default_ttl)
    }

    fn on_hit(&self, key: &str) {
        self.counters.hit();
        self.touch(key);
    }

    fn on_miss(&self, _key: &str) {
        self.counters.miss();
    }

    fn on_set(&self, key: &str, _value: &Value) -> Vec<String> {
        self.counters.admission();
        let evicted = self.admit(key);
        if !evicted.is_empty() {
            self.counters.evictions(evicted.len());
            tracing::debug!(
                target: "strata_cache",
                count = evicted.len(),
                tracked = self.tracked_len(),
                "lru evicted keys"
            );
        }
        evicted
    }

    fn on_delete(&self, key: &str) {
        self.counters.delete();
        self.log.lock().stamps.remove(key);
    }

    fn stats(&self) -> StrategyStats {
        self.counters.snapshot()
    }
}
