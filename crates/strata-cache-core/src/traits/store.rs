//! Cache store contract

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::{CacheEntry, CacheError, CacheStats, KeyPattern};

/// Key/value store the strategies sit in front of
///
/// Strategies only ever talk to the cache through this trait. Every
/// operation is assumed idempotent apart from the write/delete counters a
/// store keeps in its stats.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Get an entry from the store
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>, CacheError>;

    /// Set a value, replacing any existing entry
    ///
    /// `None` stores the value without expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Delete a key from the store
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry
    async fn clear(&self) -> Result<(), CacheError>;

    /// Check if a live entry exists for the key
    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    /// List keys, optionally filtered by a pattern
    async fn keys(&self, pattern: Option<&KeyPattern>) -> Result<Vec<String>, CacheError>;

    /// Remaining time-to-live for a key
    ///
    /// `None` if the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Reset the time-to-live of an existing key
    ///
    /// Returns `false` if the key doesn't exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Get store statistics
    async fn stats(&self) -> Result<CacheStats, CacheError>;

    /// Health check
    async fn is_healthy(&self) -> bool;

    /// Get multiple keys at once
    ///
    /// Returns a vector of results in the same order as the input keys.
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<CacheEntry<Value>>>, CacheError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Delete multiple keys
    ///
    /// Returns the number of keys that were deleted.
    async fn delete_many(&self, keys: &[&str]) -> Result<u64, CacheError> {
        let mut count = 0;
        for key in keys {
            if self.delete(key).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Get the number of entries in the store
    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.stats().await?.size)
    }

    /// Check if the store is empty
    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
