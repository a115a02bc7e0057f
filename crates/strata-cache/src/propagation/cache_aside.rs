//! Cache-aside propagation

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use strata_cache_core::{
    CacheResult, CacheStore, CacheStrategy, PropagationStrategy, Result, StrategyKind,
    SystemOfRecord, Value,
};

use super::{ReadPath, delegate_policy, invalidate, read_through};

/// Configuration for cache-aside propagation
#[derive(Debug, Clone)]
pub struct CacheAsideConfig {
    /// Drop an existing cached entry after a successful write
    pub invalidate_on_write: bool,
}

impl Default for CacheAsideConfig {
    fn default() -> Self {
        Self {
            invalidate_on_write: true,
        }
    }
}

/// On-demand population strategy
///
/// Reads fill the cache on a miss. Writes go straight to the system of
/// record. A cache that cannot be read is treated as empty.
pub struct CacheAsideStrategy {
    policy: Arc<dyn CacheStrategy>,
    config: CacheAsideConfig,
}

impl CacheAsideStrategy {
    pub fn new(policy: Arc<dyn CacheStrategy>, config: CacheAsideConfig) -> Self {
        Self { policy, config }
    }

    pub fn config(&self) -> &CacheAsideConfig {
        &self.config
    }
}

impl std::fmt::Debug for CacheAsideStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAsideStrategy")
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .finish()
    }
}

delegate_policy!(CacheAsideStrategy, "cache_aside");

#[async_trait]
impl PropagationStrategy for CacheAsideStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CacheAside
    }

    async fn get(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<CacheResult<Value>> {
        let path = ReadPath {
            populate: true,
            tolerate_cache_errors: true,
        };
        read_through(self.policy.as_ref(), key, store, source, path).await
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()> {
        source.save(key, &value).await?;

        if !self.config.invalidate_on_write {
            return Ok(());
        }

        let cached = match store.has(key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(target: "strata_cache", key = %key, error = %e, "cache presence check failed");
                true
            }
        };
        if cached && invalidate(store, key).await {
            self.policy.on_delete(key);
        }
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()> {
        source.remove(key).await?;

        invalidate(store, key).await;
        self.policy.on_delete(key);
        Ok(())
    }
}
