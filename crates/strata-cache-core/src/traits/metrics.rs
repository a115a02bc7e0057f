//! Metrics trait for strategy observability

use std::time::Duration;

/// Consumer operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    Set,
    Delete,
    GetMany,
    SetMany,
    DeleteMany,
    WarmUp,
}

impl CacheOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::Set => "set",
            CacheOperation::Delete => "delete",
            CacheOperation::GetMany => "get_many",
            CacheOperation::SetMany => "set_many",
            CacheOperation::DeleteMany => "delete_many",
            CacheOperation::WarmUp => "warm_up",
        }
    }
}

/// Trait for cache metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record a read served from the cache
    fn record_hit(&self, key: &str);

    /// Record a read neither the cache nor the system of record could serve
    fn record_miss(&self, key: &str);

    /// Record a read served from the system of record
    fn record_load(&self, key: &str);

    /// Record operation latency
    fn record_latency(&self, operation: CacheOperation, duration: Duration);

    /// Record the deferred-write backlog
    fn record_backlog(&self, pending: usize);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_load(&self, _key: &str) {}

    #[inline]
    fn record_latency(&self, _operation: CacheOperation, _duration: Duration) {}

    #[inline]
    fn record_backlog(&self, _pending: usize) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use strata_cache_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("strata_cache");
/// // Emits: strata_cache_hits_total, strata_cache_loads_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str) {
        metrics::counter!(self.metric_name("hits_total")).increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("misses_total")).increment(1);
    }

    fn record_load(&self, _key: &str) {
        metrics::counter!(self.metric_name("loads_total")).increment(1);
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("operation_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_backlog(&self, pending: usize) {
        metrics::gauge!(self.metric_name("pending_writes")).set(pending as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_as_str() {
        assert_eq!(CacheOperation::Get.as_str(), "get");
        assert_eq!(CacheOperation::WarmUp.as_str(), "warm_up");
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        // Just verify these don't panic
        metrics.record_hit("key");
        metrics.record_miss("key");
        metrics.record_load("key");
        metrics.record_latency(CacheOperation::Get, Duration::from_millis(1));
        metrics.record_backlog(3);
    }
}
