//! Write-around propagation
//!
//! Writes go to the system of record only; the cached copy is dropped so the
//! next read reloads it. Cache failures are logged and never fail the
//! operation.

use async_trait::async_trait;
use std::sync::Arc;

use strata_cache_core::{
    CacheResult, CacheStore, CacheStrategy, PropagationStrategy, Result, StrategyKind,
    SystemOfRecord, Value,
};

use super::{ReadPath, delegate_policy, invalidate, read_through};

/// Configuration for write-around propagation
#[derive(Debug, Clone)]
pub struct WriteAroundConfig {
    /// Drop the cached entry after a successful write
    pub invalidate_on_write: bool,
    /// Cache values loaded on a read miss
    pub populate_on_read: bool,
}

impl Default for WriteAroundConfig {
    fn default() -> Self {
        Self {
            invalidate_on_write: true,
            populate_on_read: true,
        }
    }
}

/// Store-first, cache-invalidate strategy
pub struct WriteAroundStrategy {
    policy: Arc<dyn CacheStrategy>,
    config: WriteAroundConfig,
}

impl WriteAroundStrategy {
    pub fn new(policy: Arc<dyn CacheStrategy>, config: WriteAroundConfig) -> Self {
        Self { policy, config }
    }

    pub fn config(&self) -> &WriteAroundConfig {
        &self.config
    }
}

impl std::fmt::Debug for WriteAroundStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAroundStrategy")
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .finish()
    }
}

delegate_policy!(WriteAroundStrategy, "write_around");

#[async_trait]
impl PropagationStrategy for WriteAroundStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WriteAround
    }

    async fn get(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<CacheResult<Value>> {
        let path = ReadPath {
            populate: self.config.populate_on_read,
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

        if self.config.invalidate_on_write && invalidate(store, key).await {
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
