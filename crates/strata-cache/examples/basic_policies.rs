//! Basic example: LRU and TTL policies behind cache-aside and write-through

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use strata_cache::prelude::*;

/// A stand-in for a database table
#[derive(Default)]
struct Products(DashMap<String, Value>);

#[async_trait]
impl SystemOfRecord for Products {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        println!("   (loading {key} from the database)");
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

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Product {
    sku: String,
    price_cents: u64,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== strata-cache Basic Example ===\n");

    let store = Arc::new(MemoryStore::with_defaults());
    let products: Arc<dyn SystemOfRecord> = Arc::new(Products::default());

    // Cache-aside over a two-slot LRU
    let cache = StrategyCache::from_config(
        store.clone(),
        products.clone(),
        Arc::new(LruStrategy::with_max_size(2)),
        PropagationConfig::CacheAside(CacheAsideConfig::default()),
    );

    for sku in ["A", "B", "C"] {
        let product = Product {
            sku: sku.to_string(),
            price_cents: 999,
        };
        cache.set(&format!("product:{sku}"), &product).await?;
    }

    println!("Reading product:A twice...");
    for _ in 0..2 {
        match cache.get::<Product>("product:A").await? {
            CacheResult::Hit(p) => println!("✅ Cache HIT: {p:?}"),
            CacheResult::Loaded(p) => println!("📥 Loaded: {p:?}"),
            CacheResult::Miss => println!("❌ Not found"),
        }
    }

    cache.get::<Product>("product:B").await?;
    cache.get::<Product>("product:C").await?;
    println!("\nCached keys after reading A, B, C: {:?}", store.keys(None).await?);
    println!("Strategy stats: {:?}", cache.stats());

    // Rule-based TTLs
    println!("\n=== TTL rules ===\n");
    let ttl = TtlStrategy::with_rules(
        TtlConfig::default().adaptive(),
        [
            TtlRule::new("config:*", Duration::from_secs(3600)),
            TtlRule::new("inventory:*", Duration::from_secs(600)),
        ],
    );
    for key in ["config:site", "inventory:sku-1", "session:xyz"] {
        let ttl = ttl.ttl_for(key, &Value::from("payload"));
        println!("{key:>16} -> {ttl:?}");
    }

    // Write-through keeps both sides in step
    println!("\n=== Write-through ===\n");
    let cache = StrategyCache::from_config(
        Arc::new(MemoryStore::with_defaults()),
        products,
        Arc::new(ttl),
        PropagationConfig::WriteThrough(WriteThroughConfig::default()),
    );
    cache.set("config:site", &"dark-mode").await?;
    println!("config:site -> {:?}", cache.get::<String>("config:site").await?);

    Ok(())
}
