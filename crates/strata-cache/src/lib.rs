//! strata-cache: Pluggable cache strategies for Rust
//!
//! # Features
//!
//! - **LRU eviction** with displaced keys handed back to the caller
//! - **Rule-based TTLs** with optional size and key-name adaptation
//! - **Write propagation**: write-through, write-around, cache-aside and
//!   write-behind with a batched background flusher
//! - **Bulk reads and writes** plus cache warm-up
//! - **Metrics integration**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_cache::prelude::*;
//!
//! # async fn run(source: Arc<dyn SystemOfRecord>) -> Result<()> {
//! let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::with_defaults());
//! let policy: Arc<dyn CacheStrategy> = Arc::new(LruStrategy::with_max_size(10_000));
//! let cache = StrategyCache::from_config(
//!     store,
//!     source,
//!     policy,
//!     PropagationConfig::CacheAside(CacheAsideConfig::default()),
//! );
//!
//! cache.set("user:42", &"ada").await?;
//! match cache.get::<String>("user:42").await? {
//!     CacheResult::Hit(name) | CacheResult::Loaded(name) => println!("Got: {name}"),
//!     CacheResult::Miss => println!("Not found"),
//! }
//! # Ok(())
//! # }
//! ```

mod manager;
pub mod propagation;
pub mod strategy;

// Re-export core
pub use strata_cache_core::*;

// Re-export storage
#[cfg(feature = "memory")]
pub use strata_cache_storage::{MemoryConfig, MemoryStore};

pub use manager::{StrategyCache, StrategyCacheConfig};
pub use propagation::{
    CacheAsideConfig, CacheAsideStrategy, FailureCallback, FlushReport, PendingWriteInfo,
    PropagationConfig, WriteAroundConfig, WriteAroundStrategy,
    WriteBehindConfig, WriteBehindStrategy, WriteThroughConfig, WriteThroughStrategy,
    build_strategy,
};
pub use strategy::{
    AdmissionConfig, BasePolicy, Condition, LruConfig, LruStrategy, Predicate, SizeTier,
    TtlConfig, TtlRule, TtlStrategy,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AdmissionConfig, BasePolicy, CacheAsideConfig, CacheError, CacheResult, CacheStore,
        CacheStrategy, KeyPattern, LruStrategy, PropagationConfig, PropagationStrategy, Result,
        StrategyCache, StrategyCacheConfig, SystemOfRecord, TtlConfig, TtlRule, TtlStrategy,
        Value, WriteAroundConfig, WriteBehindConfig, WriteBehindStrategy, WriteThroughConfig,
        build_strategy,
    };

    #[cfg(feature = "memory")]
    pub use crate::{MemoryConfig, MemoryStore};
}

#[cfg(test)]
mod test_support;
