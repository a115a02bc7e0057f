//! Core traits for cache strategies

mod metrics;
mod source;
mod store;
mod strategy;
#[cfg(feature = "tracing")]
mod tracing;

pub use metrics::{CacheMetrics, CacheOperation, NoopMetrics};
pub use source::SystemOfRecord;
pub use store::CacheStore;
pub use strategy::{CacheStrategy, PendingOperation, PropagationStrategy, StrategyKind};

#[cfg(feature = "metrics")]
pub use metrics::MetricsCrateAdapter;

#[cfg(feature = "tracing")]
pub use self::tracing::TracingMetrics;
