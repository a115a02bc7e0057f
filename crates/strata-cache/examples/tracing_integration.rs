use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use strata_cache::TracingMetrics;
use strata_cache::prelude::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Default)]
struct Users(DashMap<String, Value>);

#[async_trait]
impl SystemOfRecord for Users {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.0.get(key).map(|v| v.clone()))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.0.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.0.remove(key);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing subscriber
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE) // Enable TRACE to see latency logs
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    println!("🔍 Initialized tracing...");

    // 2. Create a StrategyCache with TracingMetrics
    let metrics = TracingMetrics::new().with_service_name("example-service");
    let strategy = build_strategy(
        PropagationConfig::WriteBehind(WriteBehindConfig::default()),
        Arc::new(LruStrategy::with_max_size(100)),
    );
    let cache = StrategyCache::with_metrics(
        Arc::new(MemoryStore::with_defaults()),
        Arc::new(Users::default()),
        strategy,
        metrics,
        StrategyCacheConfig::default(),
    );

    println!("\n⚡ Setting value...");
    cache.set("user:1", &"Alice").await?;

    println!("\n⚡ Getting value (Hit)...");
    let val = cache.get::<String>("user:1").await?.value();
    println!("   Got: {:?}", val);

    println!("\n⚡ Getting missing value (Miss)...");
    let miss = cache.get::<String>("user:99").await?.value();
    println!("   Got: {:?}", miss);

    println!("\n⚡ Shutting down (drains the write-behind queue)...");
    cache.shutdown().await?;

    println!("\n✅ Check your console output for structured logs!");

    Ok(())
}
