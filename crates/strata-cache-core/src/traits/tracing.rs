use crate::{CacheMetrics, CacheOperation};
use std::time::Duration;
use tracing::debug;

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_hit(&self, key: &str) {
        debug!(
            target: "strata_cache",
            event = "hit",
            key = %key,
            service = ?self.service_name,
            "Cache Hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "strata_cache",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "Cache Miss"
        );
    }

    fn record_load(&self, key: &str) {
        debug!(
            target: "strata_cache",
            event = "load",
            key = %key,
            service = ?self.service_name,
            "Loaded From System Of Record"
        );
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        tracing::trace!(
            target: "strata_cache",
            event = "latency",
            operation = operation.as_str(),
            duration_ms = duration.as_millis(),
            service = ?self.service_name,
            "Cache Operation Latency"
        );
    }

    fn record_backlog(&self, pending: usize) {
        tracing::trace!(
            target: "strata_cache",
            event = "backlog",
            pending = pending,
            service = ?self.service_name,
            "Deferred Write Backlog"
        );
    }
}
