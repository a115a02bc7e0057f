//! System-of-record contract

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// The authoritative data source a cache accelerates
///
/// Supplied by the application at each call site. Strategies treat any
/// error as an opaque failure.
#[async_trait]
pub trait SystemOfRecord: Send + Sync + 'static {
    /// Load the current value for a key
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Persist a value for a key
    async fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove a key
    async fn remove(&self, key: &str) -> Result<()>;

    /// Load several keys in one round trip
    ///
    /// Returns one slot per requested key, in order. The default issues
    /// sequential `load` calls; sources with a batch query should override it.
    async fn load_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.load(key).await?);
        }
        Ok(values)
    }
}
