//! Strategy-driven cache front end

use futures::future::{join_all, try_join_all};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use strata_cache_core::{
    CacheError, CacheMetrics, CacheOperation, CacheResult, CacheStats, CacheStore, CacheStrategy,
    KeyPattern, NoopMetrics, PendingOperation, PropagationStrategy, Result, StrategyKind,
    StrategyStats, SystemOfRecord, Value,
};

use crate::propagation::{PropagationConfig, build_strategy, evict, lookup, populate};

/// Configuration for StrategyCache
#[derive(Debug, Clone)]
pub struct StrategyCacheConfig {
    /// Cache values fetched for `get_many` misses
    pub populate_on_bulk_read: bool,
}

impl Default for StrategyCacheConfig {
    fn default() -> Self {
        Self {
            populate_on_bulk_read: true,
        }
    }
}

/// Typed cache over a store, a system of record and a propagation strategy
///
/// Values travel as JSON; `get` and `set` convert to and from `T` at the
/// edge. Cloning creates a new handle to the same store and strategy.
pub struct StrategyCache<M = NoopMetrics>
where
    M: CacheMetrics,
{
    store: Arc<dyn CacheStore>,
    source: Arc<dyn SystemOfRecord>,
    strategy: Arc<dyn PropagationStrategy>,
    metrics: Arc<M>,
    config: StrategyCacheConfig,
}

impl StrategyCache<NoopMetrics> {
    /// Create a StrategyCache with no metrics
    pub fn new(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn SystemOfRecord>,
        strategy: Arc<dyn PropagationStrategy>,
    ) -> Self {
        Self::with_metrics(store, source, strategy, NoopMetrics, StrategyCacheConfig::default())
    }

    /// Build the propagation strategy from config and wrap it
    pub fn from_config(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn SystemOfRecord>,
        policy: Arc<dyn CacheStrategy>,
        propagation: PropagationConfig,
    ) -> Self {
        Self::new(store, source, build_strategy(propagation, policy))
    }
}

impl<M: CacheMetrics> StrategyCache<M> {
    /// Create a StrategyCache with custom metrics
    pub fn with_metrics(
        store: Arc<dyn CacheStore>,
        source: Arc<dyn SystemOfRecord>,
        strategy: Arc<dyn PropagationStrategy>,
        metrics: M,
        config: StrategyCacheConfig,
    ) -> Self {
        Self {
            store,
            source,
            strategy,
            metrics: Arc::new(metrics),
            config,
        }
    }

    /// Read a value, falling back to the system of record per the strategy
    pub async fn get<T>(&self, key: &str) -> Result<CacheResult<T>>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self
            .strategy
            .get(key, self.store.as_ref(), &self.source)
            .await?;

        self.record_read(key, &result);
        self.metrics
            .record_latency(CacheOperation::Get, start.elapsed());

        result.try_map(decode)
    }

    /// Write a value through the strategy
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let value = encode(value)?;
        let start = Instant::now();

        self.strategy
            .set(key, value, self.store.as_ref(), &self.source)
            .await?;

        self.metrics
            .record_latency(CacheOperation::Set, start.elapsed());
        self.record_backlog();
        Ok(())
    }

    /// Delete a key through the strategy
    pub async fn delete(&self, key: &str) -> Result<()> {
        let start = Instant::now();

        self.strategy
            .delete(key, self.store.as_ref(), &self.source)
            .await?;

        self.metrics
            .record_latency(CacheOperation::Delete, start.elapsed());
        self.record_backlog();
        Ok(())
    }

    /// Read many keys with one batched load for the misses
    ///
    /// Results are in input order. Cache failures count as misses. A miss
    /// with a queued mutation is answered from the queue, never from the
    /// system of record, and is not cached.
    pub async fn get_many<T>(&self, keys: &[&str]) -> Result<Vec<CacheResult<T>>>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let policy = self.strategy.as_ref();
        let store = self.store.as_ref();

        let lookups = join_all(keys.iter().map(|key| lookup(policy, store, key))).await;

        let mut results: Vec<CacheResult<Value>> = Vec::with_capacity(keys.len());
        let mut missing: Vec<usize> = Vec::new();
        for (index, (key, found)) in keys.iter().zip(lookups).enumerate() {
            match found {
                Ok(Some(value)) => {
                    results.push(CacheResult::Hit(value));
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "strata_cache", key = %key, error = %e, "cache read failed");
                    policy.on_miss(key);
                }
            }

            match policy.pending(key) {
                Some(PendingOperation::Write(value)) => results.push(CacheResult::Loaded(value)),
                Some(PendingOperation::Delete) => results.push(CacheResult::Miss),
                None => {
                    missing.push(index);
                    results.push(CacheResult::Miss);
                }
            }
        }

        if !missing.is_empty() {
            let missing_keys: Vec<&str> = missing.iter().map(|&i| keys[i]).collect();
            let loaded = self.source.load_many(&missing_keys).await?;
            if loaded.len() != missing_keys.len() {
                return Err(CacheError::Internal(format!(
                    "load_many returned {} values for {} keys",
                    loaded.len(),
                    missing_keys.len()
                )));
            }

            if self.config.populate_on_bulk_read {
                let fills = missing_keys
                    .iter()
                    .zip(&loaded)
                    .filter_map(|(key, value)| value.as_ref().map(|value| (*key, value)))
                    .map(|(key, value)| async move {
                        // a mutation queued since the load is newer
                        if policy.pending(key).is_some() {
                            return;
                        }
                        if let Err(e) = populate(policy, store, key, value).await {
                            warn!(target: "strata_cache", key = %key, error = %e, "failed to populate cache");
                        }
                    });
                join_all(fills).await;
            }

            for (index, value) in missing.into_iter().zip(loaded) {
                if let Some(value) = value {
                    results[index] = CacheResult::Loaded(value);
                }
            }
        }

        for (key, result) in keys.iter().zip(&results) {
            self.record_read(key, result);
        }
        self.metrics
            .record_latency(CacheOperation::GetMany, start.elapsed());

        results.into_iter().map(|result| result.try_map(decode)).collect()
    }

    /// Write many values concurrently
    ///
    /// Fails with the first error; writes that already completed stay.
    pub async fn set_many<T>(&self, entries: &[(&str, T)]) -> Result<()>
    where
        T: Serialize,
    {
        let encoded = entries
            .iter()
            .map(|(key, value)| encode(value).map(|value| (*key, value)))
            .collect::<Result<Vec<(&str, Value)>>>()?;
        let start = Instant::now();

        try_join_all(encoded.into_iter().map(|(key, value)| {
            self.strategy
                .set(key, value, self.store.as_ref(), &self.source)
        }))
        .await?;

        self.metrics
            .record_latency(CacheOperation::SetMany, start.elapsed());
        self.record_backlog();
        Ok(())
    }

    /// Delete many keys concurrently
    pub async fn delete_many(&self, keys: &[&str]) -> Result<()> {
        let start = Instant::now();

        try_join_all(keys.iter().map(|key| {
            self.strategy
                .delete(key, self.store.as_ref(), &self.source)
        }))
        .await?;

        self.metrics
            .record_latency(CacheOperation::DeleteMany, start.elapsed());
        self.record_backlog();
        Ok(())
    }

    /// Load keys from the system of record into the cache
    ///
    /// Every non-null value is cached whatever the admission filter says,
    /// replacing any cached entry. Keys with a queued mutation are skipped
    /// since the cache already reflects it. Returns the number of keys
    /// cached.
    pub async fn warm_up(&self, keys: &[&str]) -> Result<usize> {
        let start = Instant::now();
        let loadable: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|key| self.strategy.pending(key).is_none())
            .collect();
        let values = if loadable.is_empty() {
            Vec::new()
        } else {
            self.source.load_many(&loadable).await?
        };

        let writes = loadable
            .iter()
            .zip(&values)
            .filter_map(|(key, value)| match value {
                Some(value) if !value.is_null() => Some((*key, value)),
                _ => None,
            })
            .map(|(key, value)| async move {
                if self.strategy.pending(key).is_some() {
                    return Ok::<bool, CacheError>(false);
                }
                let ttl = self.strategy.ttl_for(key, value);
                self.store.set(key, value.clone(), Some(ttl)).await?;
                let evicted = self.strategy.on_set(key, value);
                evict(self.store.as_ref(), &evicted).await;
                Ok::<_, CacheError>(true)
            });
        let warmed = try_join_all(writes)
            .await?
            .into_iter()
            .filter(|cached| *cached)
            .count();

        debug!(
            target: "strata_cache",
            requested = keys.len(),
            warmed,
            "cache warm-up complete"
        );
        self.metrics
            .record_latency(CacheOperation::WarmUp, start.elapsed());
        Ok(warmed)
    }

    /// Drop cached entries matching a pattern
    ///
    /// The system of record is not touched. Returns the number removed.
    pub async fn invalidate_pattern(&self, pattern: impl Into<KeyPattern>) -> Result<usize> {
        let pattern = pattern.into();
        let keys = self.store.keys(Some(&pattern)).await?;

        let mut removed = 0;
        for key in &keys {
            if self.store.delete(key).await? {
                self.strategy.on_delete(key);
                removed += 1;
            }
        }

        debug!(target: "strata_cache", pattern = %pattern, removed, "invalidated keys");
        Ok(removed)
    }

    /// Strategy counters
    pub fn stats(&self) -> StrategyStats {
        self.strategy.stats()
    }

    /// Store statistics
    pub async fn store_stats(&self) -> Result<CacheStats> {
        self.store.stats().await
    }

    pub async fn is_healthy(&self) -> bool {
        self.store.is_healthy().await
    }

    /// Drain deferred writes and stop background work
    pub async fn shutdown(&self) -> Result<()> {
        self.strategy.shutdown().await
    }

    pub fn strategy(&self) -> &Arc<dyn PropagationStrategy> {
        &self.strategy
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn SystemOfRecord> {
        &self.source
    }

    pub fn config(&self) -> &StrategyCacheConfig {
        &self.config
    }

    fn record_read(&self, key: &str, result: &CacheResult<Value>) {
        match result {
            CacheResult::Hit(_) => self.metrics.record_hit(key),
            CacheResult::Loaded(_) => self.metrics.record_load(key),
            CacheResult::Miss => self.metrics.record_miss(key),
        }
    }

    fn record_backlog(&self) {
        if self.strategy.kind() == StrategyKind::WriteBehind {
            self.metrics
                .record_backlog(self.strategy.stats().pending_writes);
        }
    }
}

impl<M: CacheMetrics> Clone for StrategyCache<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            source: self.source.clone(),
            strategy: self.strategy.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
        }
    }
}

impl<M: CacheMetrics> std::fmt::Debug for StrategyCache<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCache")
            .field("strategy", &self.strategy.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CacheError::Deserialization(e.to_string()))
}
