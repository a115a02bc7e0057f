//! Write-through propagation
//!
//! Writes and deletes hit the cache and the system of record concurrently
//! and succeed only if both sides do. Each side is retried independently.
//! Nothing is rolled back: when the retries run out, each side keeps
//! whatever its last attempt left behind.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use strata_cache_core::{
    CacheResult, CacheStore, CacheStrategy, PropagationStrategy, Result, StrategyKind,
    SystemOfRecord, Value,
};

use super::retry::Retry;
use super::{ReadPath, delegate_policy, evict, read_through};

/// Configuration for write-through propagation
#[derive(Debug, Clone)]
pub struct WriteThroughConfig {
    /// Retries per side after the first attempt
    pub max_retries: u32,
    /// Base backoff between attempts, multiplied by the attempt number
    pub retry_delay: Duration,
    /// Deadline for each system-of-record attempt
    pub write_timeout: Option<Duration>,
}

impl Default for WriteThroughConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl WriteThroughConfig {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// Immediate dual-write strategy
pub struct WriteThroughStrategy {
    policy: Arc<dyn CacheStrategy>,
    config: WriteThroughConfig,
}

impl WriteThroughStrategy {
    pub fn new(policy: Arc<dyn CacheStrategy>, config: WriteThroughConfig) -> Self {
        Self { policy, config }
    }

    pub fn config(&self) -> &WriteThroughConfig {
        &self.config
    }

    fn cache_retry(&self) -> Retry {
        Retry {
            max_retries: self.config.max_retries,
            delay: self.config.retry_delay,
            timeout: None,
        }
    }

    fn source_retry(&self) -> Retry {
        Retry {
            timeout: self.config.write_timeout,
            ..self.cache_retry()
        }
    }
}

impl std::fmt::Debug for WriteThroughStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteThroughStrategy")
            .field("policy", &self.policy.name())
            .field("config", &self.config)
            .finish()
    }
}

delegate_policy!(WriteThroughStrategy, "write_through");

#[async_trait]
impl PropagationStrategy for WriteThroughStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WriteThrough
    }

    async fn get(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<CacheResult<Value>> {
        let path = ReadPath {
            populate: true,
            tolerate_cache_errors: false,
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
        let admitted = self.policy.should_cache(key, &value);
        let value_ref = &value;

        let cache_side = async {
            if admitted {
                let ttl = self.policy.ttl_for(key, value_ref);
                self.cache_retry()
                    .run("cache write", key, move || {
                        store.set(key, value_ref.clone(), Some(ttl))
                    })
                    .await
                    .map(|()| false)
            } else {
                // A stale entry must not outlive the new value
                self.cache_retry()
                    .run("cache invalidation", key, move || store.delete(key))
                    .await
            }
        };
        let source_side = self
            .source_retry()
            .run("source write", key, move || source.save(key, value_ref));

        let (cached, saved) = tokio::join!(cache_side, source_side);

        match cached {
            Ok(_) if admitted => {
                let evicted = self.policy.on_set(key, &value);
                evict(store, &evicted).await;
            }
            Ok(true) => self.policy.on_delete(key),
            _ => {}
        }

        saved?;
        cached.map(|_| ())
    }

    async fn delete(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()> {
        let cache_side = self
            .cache_retry()
            .run("cache delete", key, move || store.delete(key));
        let source_side = self
            .source_retry()
            .run("source delete", key, move || source.remove(key));

        let (deleted, removed) = tokio::join!(cache_side, source_side);
        if deleted.is_ok() {
            self.policy.on_delete(key);
        }

        removed?;
        deleted.map(|_| ())
    }
}
