//! Benchmarks for policy decisions and strategy round trips

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use strata_cache::{
    BasePolicy, CacheResult, CacheStrategy, LruStrategy, MemoryStore, PropagationConfig,
    StrategyCache, TtlConfig, TtlRule, TtlStrategy, Value, WriteThroughConfig,
};
use tokio::runtime::Runtime;

mod source {
    use async_trait::async_trait;
    use dashmap::DashMap;
    use strata_cache::{Result, SystemOfRecord, Value};

    /// In-memory system of record
    #[derive(Default)]
    pub struct MapSource(pub DashMap<String, Value>);

    #[async_trait]
    impl SystemOfRecord for MapSource {
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
}

fn bench_lru(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru");
    group.throughput(Throughput::Elements(1));

    let value = json!(1);
    group.bench_function("admit_under_capacity", |b| {
        let lru = LruStrategy::with_max_size(1_000_000);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(lru.on_set(&format!("key:{i}"), &value));
        });
    });

    group.bench_function("admit_with_eviction", |b| {
        let lru = LruStrategy::with_max_size(1_000);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(lru.on_set(&format!("key:{i}"), &value));
        });
    });

    group.bench_function("hit", |b| {
        let lru = LruStrategy::with_max_size(1_000);
        for i in 0..1_000 {
            lru.on_set(&format!("key:{i}"), &value);
        }
        b.iter(|| lru.on_hit(black_box("key:500")));
    });

    group.finish();
}

fn bench_ttl(c: &mut Criterion) {
    let rules = (0..50).map(|i| TtlRule::new(format!("tenant:{i}:*"), Duration::from_secs(60 + i)));
    let ttl = TtlStrategy::with_rules(TtlConfig::default().adaptive(), rules);
    let small = json!({"name": "widget"});
    let large = Value::String("x".repeat(128 * 1024));

    let mut group = c.benchmark_group("ttl");
    group.throughput(Throughput::Elements(1));

    group.bench_function("first_rule", |b| {
        b.iter(|| black_box(ttl.ttl_for(black_box("tenant:0:category"), &small)));
    });

    group.bench_function("last_rule", |b| {
        b.iter(|| black_box(ttl.ttl_for(black_box("tenant:49:item"), &small)));
    });

    group.bench_function("no_match", |b| {
        b.iter(|| black_box(ttl.ttl_for(black_box("other:1"), &small)));
    });

    group.bench_function("large_value", |b| {
        b.iter(|| black_box(ttl.ttl_for(black_box("tenant:0:item"), &large)));
    });

    group.finish();
}

fn bench_strategy_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = StrategyCache::from_config(
        Arc::new(MemoryStore::with_defaults()),
        Arc::new(source::MapSource::default()),
        Arc::new(BasePolicy::default()),
        PropagationConfig::WriteThrough(WriteThroughConfig::default()),
    );

    rt.block_on(async {
        cache.set("key", &42i32).await.unwrap();
    });

    let mut group = c.benchmark_group("strategy_cache");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_through_set", |b| {
        b.iter(|| {
            rt.block_on(async {
                cache.set(black_box("key"), black_box(&42i32)).await.unwrap();
            });
        });
    });

    group.bench_function("hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result: CacheResult<i32> = cache.get(black_box("key")).await.unwrap();
                black_box(result);
            });
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result: CacheResult<i32> = cache.get(black_box("nonexistent")).await.unwrap();
                black_box(result);
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lru, bench_ttl, bench_strategy_cache);
criterion_main!(benches);
