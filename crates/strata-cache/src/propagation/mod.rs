//! Write propagation strategies
//!
//! Each strategy wraps a policy (admission, TTL, eviction) and decides how
//! reads, writes and deletes move between the cache store and the system of
//! record.

use std::sync::Arc;

use strata_cache_core::{
    CacheResult, CacheStore, CacheStrategy, PropagationStrategy, Result, SystemOfRecord, Value,
};
use tracing::warn;

mod cache_aside;
mod retry;
mod write_around;
mod write_behind;
mod write_through;

pub use cache_aside::{CacheAsideConfig, CacheAsideStrategy};
pub use write_around::{WriteAroundConfig, WriteAroundStrategy};
pub use write_behind::{
    FailureCallback, FlushReport, PendingWriteInfo, WriteBehindConfig, WriteBehindStrategy,
};
pub use write_through::{WriteThroughConfig, WriteThroughStrategy};

/// Implement `CacheStrategy` by forwarding to the wrapped `policy`
///
/// The optional closure-like arm overrides `stats`.
macro_rules! delegate_policy {
    ($strategy:ty, $name:literal) => {
        delegate_policy!($strategy, $name, |this| this.policy.stats());
    };
    ($strategy:ty, $name:literal, |$this:ident| $stats:expr) => {
        impl strata_cache_core::CacheStrategy for $strategy {
            fn name(&self) -> &str {
                $name
            }

            fn should_cache(&self, key: &str, value: &strata_cache_core::Value) -> bool {
                self.policy.should_cache(key, value)
            }

            fn ttl_for(&self, key: &str, value: &strata_cache_core::Value) -> std::time::Duration {
                self.policy.ttl_for(key, value)
            }

            fn on_hit(&self, key: &str) {
                self.policy.on_hit(key)
            }

            fn on_miss(&self, key: &str) {
                self.policy.on_miss(key)
            }

            fn on_set(&self, key: &str, value: &strata_cache_core::Value) -> Vec<String> {
                self.policy.on_set(key, value)
            }

            fn on_delete(&self, key: &str) {
                self.policy.on_delete(key)
            }

            fn stats(&self) -> strata_cache_core::StrategyStats {
                let $this = self;
                $stats
            }
        }
    };
}
pub(crate) use delegate_policy;

/// Configuration selecting a propagation strategy
#[derive(Debug, Clone)]
pub enum PropagationConfig {
    WriteThrough(WriteThroughConfig),
    WriteAround(WriteAroundConfig),
    CacheAside(CacheAsideConfig),
    WriteBehind(WriteBehindConfig),
}

impl Default for PropagationConfig {
    fn default() -> Self {
        PropagationConfig::CacheAside(CacheAsideConfig::default())
    }
}

/// Build a propagation strategy over `policy`
///
/// `WriteBehind` spawns its flusher on the current tokio runtime.
pub fn build_strategy(
    config: PropagationConfig,
    policy: Arc<dyn CacheStrategy>,
) -> Arc<dyn PropagationStrategy> {
    match config {
        PropagationConfig::WriteThrough(config) => {
            Arc::new(WriteThroughStrategy::new(policy, config))
        }
        PropagationConfig::WriteAround(config) => Arc::new(WriteAroundStrategy::new(policy, config)),
        PropagationConfig::CacheAside(config) => Arc::new(CacheAsideStrategy::new(policy, config)),
        PropagationConfig::WriteBehind(config) => Arc::new(WriteBehindStrategy::new(policy, config)),
    }
}

/// Delete displaced keys from the store
///
/// Failures are logged; a key that survives will age out by TTL.
pub(crate) async fn evict(store: &dyn CacheStore, keys: &[String]) {
    for key in keys {
        if let Err(e) = store.delete(key).await {
            warn!(target: "strata_cache", key = %key, error = %e, "failed to evict key");
        }
    }
}

/// Admit a value into the store if the policy allows it
///
/// Returns `false` when the policy rejected the value.
pub(crate) async fn populate<P>(
    policy: &P,
    store: &dyn CacheStore,
    key: &str,
    value: &Value,
) -> Result<bool>
where
    P: CacheStrategy + ?Sized,
{
    if !policy.should_cache(key, value) {
        return Ok(false);
    }

    let ttl = policy.ttl_for(key, value);
    store.set(key, value.clone(), Some(ttl)).await?;

    let evicted = policy.on_set(key, value);
    evict(store, &evicted).await;
    Ok(true)
}

/// Cache lookup that reports the outcome to the policy
pub(crate) async fn lookup<P>(policy: &P, store: &dyn CacheStore, key: &str) -> Result<Option<Value>>
where
    P: CacheStrategy + ?Sized,
{
    match store.get(key).await? {
        Some(entry) => {
            policy.on_hit(key);
            Ok(Some(entry.value))
        }
        None => {
            policy.on_miss(key);
            Ok(None)
        }
    }
}

/// How a read falls back to the system of record
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadPath {
    /// Cache loaded values that pass admission
    pub populate: bool,
    /// Treat cache read failures as misses instead of failing the read
    pub tolerate_cache_errors: bool,
}

/// Cache lookup with fallback to the system of record
pub(crate) async fn read_through<P>(
    policy: &P,
    key: &str,
    store: &dyn CacheStore,
    source: &Arc<dyn SystemOfRecord>,
    path: ReadPath,
) -> Result<CacheResult<Value>>
where
    P: CacheStrategy + ?Sized,
{
    match lookup(policy, store, key).await {
        Ok(Some(value)) => return Ok(CacheResult::Hit(value)),
        Ok(None) => {}
        Err(e) if path.tolerate_cache_errors => {
            warn!(target: "strata_cache", key = %key, error = %e, "cache read failed, falling back to source");
            policy.on_miss(key);
        }
        Err(e) => return Err(e),
    }

    let Some(value) = source.load(key).await? else {
        return Ok(CacheResult::Miss);
    };

    if path.populate {
        if let Err(e) = populate(policy, store, key, &value).await {
            warn!(target: "strata_cache", key = %key, error = %e, "failed to populate cache");
        }
    }
    Ok(CacheResult::Loaded(value))
}

/// Remove a key from the cache, logging instead of failing
///
/// Returns `true` if an entry was removed.
pub(crate) async fn invalidate(store: &dyn CacheStore, key: &str) -> bool {
    match store.delete(key).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!(target: "strata_cache", key = %key, error = %e, "cache invalidation failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{BasePolicy, LruStrategy};
    use crate::test_support::{FlakyStore, RecordingSource};
    use serde_json::json;
    use strata_cache_core::StrategyKind;
    use strata_cache_storage::MemoryStore;

    #[tokio::test]
    async fn test_build_strategy_kinds() {
        let policy: Arc<dyn CacheStrategy> = Arc::new(BasePolicy::default());

        let cases = [
            (
                PropagationConfig::WriteThrough(WriteThroughConfig::default()),
                StrategyKind::WriteThrough,
            ),
            (
                PropagationConfig::WriteAround(WriteAroundConfig::default()),
                StrategyKind::WriteAround,
            ),
            (
                PropagationConfig::CacheAside(CacheAsideConfig::default()),
                StrategyKind::CacheAside,
            ),
            (
                PropagationConfig::WriteBehind(WriteBehindConfig::default()),
                StrategyKind::WriteBehind,
            ),
        ];

        for (config, kind) in cases {
            let strategy = build_strategy(config, policy.clone());
            assert_eq!(strategy.kind(), kind);
            assert_eq!(strategy.name(), kind.as_str());
            strategy.shutdown().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_populate_applies_evictions() {
        let store = MemoryStore::with_defaults();
        let policy = LruStrategy::with_max_size(1);

        assert!(populate(&policy, &store, "a", &json!(1)).await.unwrap());
        assert!(populate(&policy, &store, "b", &json!(2)).await.unwrap());

        assert!(!store.has("a").await.unwrap());
        assert!(store.has("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_populate_skips_rejected() {
        let store = MemoryStore::with_defaults();
        let policy = BasePolicy::default();

        assert!(!populate(&policy, &store, "a", &Value::Null).await.unwrap());
        assert!(!store.has("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_through_tolerates_cache_errors() {
        let store = FlakyStore::new();
        store.fail_gets(1);
        let source: Arc<dyn SystemOfRecord> = Arc::new(RecordingSource::with_data([("k", json!("v"))]));
        let policy = BasePolicy::default();

        let tolerant = ReadPath {
            populate: true,
            tolerate_cache_errors: true,
        };
        let result = read_through(&policy, "k", &store, &source, tolerant).await.unwrap();
        assert_eq!(result, CacheResult::Loaded(json!("v")));

        store.fail_gets(1);
        let strict = ReadPath {
            populate: true,
            tolerate_cache_errors: false,
        };
        assert!(read_through(&policy, "k", &store, &source, strict).await.is_err());
    }
}
