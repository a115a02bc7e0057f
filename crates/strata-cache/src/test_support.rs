//! Test doubles for the store and system-of-record contracts

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use strata_cache_core::{
    CacheEntry, CacheError, CacheStats, CacheStore, KeyPattern, Result, SystemOfRecord, Value,
};
use strata_cache_storage::MemoryStore;

/// Consume one scripted failure, if any are left
///
/// `u32::MAX` fails forever.
fn take_failure(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 => None,
            u32::MAX => Some(u32::MAX),
            n => Some(n - 1),
        })
        .is_ok()
}

/// In-memory system of record that records every call
#[derive(Default)]
pub(crate) struct RecordingSource {
    data: Mutex<HashMap<String, Value>>,
    saves: Mutex<Vec<(String, Value)>>,
    removes: Mutex<Vec<String>>,
    loads: AtomicUsize,
    batch_loads: AtomicUsize,
    save_attempts: AtomicUsize,
    save_delay: Mutex<Option<Duration>>,
    failing_loads: AtomicU32,
    failing_saves: AtomicU32,
    failing_removes: AtomicU32,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        let source = Self::new();
        {
            let mut data = source.data.lock();
            for (key, value) in entries {
                data.insert(key.to_string(), value);
            }
        }
        source
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.data.lock().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Successful saves, in order
    pub fn saves(&self) -> Vec<(String, Value)> {
        self.saves.lock().clone()
    }

    /// Successful removes, in order
    pub fn removes(&self) -> Vec<String> {
        self.removes.lock().clone()
    }

    /// Single-key loads
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Batched loads
    pub fn batch_load_count(&self) -> usize {
        self.batch_loads.load(Ordering::SeqCst)
    }

    /// Save calls, failed ones included
    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self, times: u32) {
        self.failing_loads.store(times, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, times: u32) {
        self.failing_saves.store(times, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, times: u32) {
        self.failing_removes.store(times, Ordering::SeqCst);
    }

    pub fn set_save_delay(&self, delay: Duration) {
        *self.save_delay.lock() = Some(delay);
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        if take_failure(&self.failing_loads) {
            return Err(CacheError::source(format!("load failed for {key}")));
        }
        Ok(self.value(key))
    }
}

#[async_trait]
impl SystemOfRecord for RecordingSource {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.read(key)
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.save_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if take_failure(&self.failing_saves) {
            return Err(CacheError::source(format!("save failed for {key}")));
        }
        self.data.lock().insert(key.to_string(), value.clone());
        self.saves.lock().push((key.to_string(), value.clone()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if take_failure(&self.failing_removes) {
            return Err(CacheError::source(format!("remove failed for {key}")));
        }
        self.data.lock().remove(key);
        self.removes.lock().push(key.to_string());
        Ok(())
    }

    async fn load_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        self.batch_loads.fetch_add(1, Ordering::SeqCst);
        keys.iter().map(|key| self.read(key)).collect()
    }
}

/// `MemoryStore` wrapper with scripted failures
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    failing_gets: AtomicU32,
    failing_sets: AtomicU32,
    failing_deletes: AtomicU32,
    delete_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, times: u32) {
        self.failing_gets.store(times, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, times: u32) {
        self.failing_sets.store(times, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, times: u32) {
        self.failing_deletes.store(times, Ordering::SeqCst);
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>> {
        if take_failure(&self.failing_gets) {
            return Err(CacheError::store("get failed"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        if take_failure(&self.failing_sets) {
            return Err(CacheError::store("set failed"));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_deletes) {
            return Err(CacheError::store("delete failed"));
        }
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        self.inner.has(key).await
    }

    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn stats(&self) -> Result<CacheStats> {
        self.inner.stats().await
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }
}
