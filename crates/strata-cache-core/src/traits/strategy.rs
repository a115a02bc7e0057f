//! Strategy traits

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::{CacheResult, CacheStore, Result, StrategyStats, SystemOfRecord};

/// Admission, TTL and lifecycle policy shared by every strategy
///
/// `should_cache` and `ttl_for` must be pure: calling them twice with the
/// same arguments gives the same answer. Hooks are observers; they cannot
/// fail and never abort the operation that triggered them.
pub trait CacheStrategy: Send + Sync + 'static {
    /// Strategy name (for logs and metrics)
    fn name(&self) -> &str;

    /// Decide whether a value may enter the cache
    ///
    /// `Value::Null` is never admitted.
    fn should_cache(&self, key: &str, value: &Value) -> bool;

    /// Time-to-live to apply when admitting a value
    fn ttl_for(&self, key: &str, value: &Value) -> Duration;

    /// A read was served from the cache
    fn on_hit(&self, _key: &str) {}

    /// A read could not be served from the cache
    fn on_miss(&self, _key: &str) {}

    /// A value was admitted
    ///
    /// Returns keys the policy displaced; the caller removes them from the
    /// store.
    fn on_set(&self, _key: &str, _value: &Value) -> Vec<String> {
        Vec::new()
    }

    /// A key was explicitly deleted
    fn on_delete(&self, _key: &str) {}

    /// Snapshot of the policy counters
    fn stats(&self) -> StrategyStats {
        StrategyStats::default()
    }
}

/// How writes and deletes relate to the system of record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Cache and system of record written together
    WriteThrough,
    /// System of record written first, cache invalidated
    WriteAround,
    /// Cache populated on read misses
    CacheAside,
    /// Cache written now, system of record written later
    WriteBehind,
}

impl StrategyKind {
    /// Get kind as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::WriteThrough => "write_through",
            StrategyKind::WriteAround => "write_around",
            StrategyKind::CacheAside => "cache_aside",
            StrategyKind::WriteBehind => "write_behind",
        }
    }
}

/// Mutation waiting to be applied to the system of record
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    Write(Value),
    Delete,
}

impl PendingOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingOperation::Write(_) => "write",
            PendingOperation::Delete => "delete",
        }
    }
}

/// Composite read/write/delete operations over a store and a system of record
#[async_trait]
pub trait PropagationStrategy: CacheStrategy {
    /// Which propagation policy this is
    fn kind(&self) -> StrategyKind;

    /// Read with fallback to the system of record
    async fn get(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<CacheResult<Value>>;

    /// Write with propagation to the system of record
    async fn set(
        &self,
        key: &str,
        value: Value,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()>;

    /// Delete with cache invalidation
    async fn delete(
        &self,
        key: &str,
        store: &dyn CacheStore,
        source: &Arc<dyn SystemOfRecord>,
    ) -> Result<()>;

    /// Mutation queued for `key` that the system of record has not applied
    ///
    /// Paths that read the system of record directly consult this so they
    /// never cache a value older than the queued one.
    fn pending(&self, _key: &str) -> Option<PendingOperation> {
        None
    }

    /// Stop background work, draining anything queued
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
