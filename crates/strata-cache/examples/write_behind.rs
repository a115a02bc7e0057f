//! Write-behind example: deferred writes, retries and the failure callback

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use strata_cache::prelude::*;
use strata_cache::PendingWriteInfo;

/// A database that rejects the first few writes
#[derive(Default)]
struct FlakyDatabase {
    rows: DashMap<String, Value>,
    rejections_left: AtomicU32,
}

#[async_trait]
impl SystemOfRecord for FlakyDatabase {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.rows.get(key).map(|v| v.clone()))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let rejected = self
            .rejections_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(CacheError::source("database busy"));
        }
        println!("   💾 saved {key} = {value}");
        self.rows.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        println!("   🗑️  removed {key}");
        self.rows.remove(key);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== strata-cache Write-Behind Example ===\n");

    let database = Arc::new(FlakyDatabase::default());
    database.rejections_left.store(2, Ordering::SeqCst);

    let config = WriteBehindConfig::default()
        .flush_interval(Duration::from_millis(200))
        .retry_delay(Duration::from_millis(100))
        .max_retries(3);
    let strategy = WriteBehindStrategy::new(Arc::new(BasePolicy::default()), config)
        .with_failure_callback(|info: &PendingWriteInfo, err: &CacheError| {
            eprintln!("   ❌ gave up on {} after {} retries: {err}", info.key, info.retries);
        });
    let strategy = Arc::new(strategy);

    let cache = StrategyCache::new(
        Arc::new(MemoryStore::with_defaults()),
        database.clone(),
        strategy.clone(),
    );

    println!("Writing counter three times before the first flush...");
    for n in 1..=3 {
        cache.set("counter", &n).await?;
    }
    cache.set("greeting", &"hello").await?;
    cache.delete("obsolete").await?;

    println!("Pending: {:?}", strategy.pending_keys());
    println!("Read-your-writes: {:?}", cache.get::<i32>("counter").await?);

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("\nAfter one second: {:?}", strategy.stats());

    cache.set("late", &true).await?;
    cache.shutdown().await?;
    println!("\nAfter shutdown, pending = {}", strategy.pending_len());

    Ok(())
}
