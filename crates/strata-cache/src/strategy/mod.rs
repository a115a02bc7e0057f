//! Admission and TTL policies
//!
//! A policy decides whether a value may enter the cache, how long it lives
//! there and which keys it displaces. Propagation strategies delegate to a
//! policy for all three.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use strata_cache_core::{
    CacheError, CacheStrategy, KeyPattern, Result, StrategyCounters, StrategyStats, Value,
};

mod lru;
mod ttl;

pub use lru::{LruConfig, LruStrategy};
pub use ttl::{SizeTier, TtlConfig, TtlRule, TtlStrategy};

/// Predicate over a key and its value
pub type Predicate = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;

/// Serialized size of a value in bytes
pub(crate) fn value_size(value: &Value) -> Result<usize> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| CacheError::Serialization(e.to_string()))
}

/// Clamp a TTL into the configured bounds
///
/// With inverted bounds the minimum wins.
pub(crate) fn clamp_ttl(ttl: Duration, min: Option<Duration>, max: Option<Duration>) -> Duration {
    let ttl = match max {
        Some(max) => ttl.min(max),
        None => ttl,
    };
    match min {
        Some(min) => ttl.max(min),
        None => ttl,
    }
}

/// Admission rule scoped to keys matching a pattern
///
/// When the pattern matches, the predicate must hold for the value to be
/// admitted.
#[derive(Clone)]
pub struct Condition {
    pub pattern: KeyPattern,
    pub predicate: Predicate,
}

impl Condition {
    pub fn new<F>(pattern: impl Into<KeyPattern>, predicate: F) -> Self
    where
        F: Fn(&str, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Admission filter and TTL bounds shared by the built-in policies
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// TTL applied when nothing more specific decides
    pub default_ttl: Duration,
    /// Lower TTL bound
    pub min_ttl: Option<Duration>,
    /// Upper TTL bound
    pub max_ttl: Option<Duration>,
    /// Largest serialized value admitted, in bytes
    pub max_value_size: Option<usize>,
    /// Keys that are never cached
    pub exclude_patterns: Vec<KeyPattern>,
    /// Per-pattern admission predicates
    pub conditions: Vec<Condition>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            min_ttl: None,
            max_ttl: None,
            max_value_size: None,
            exclude_patterns: Vec::new(),
            conditions: Vec::new(),
        }
    }
}

impl AdmissionConfig {
    /// Create config with specific default TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: ttl,
            ..Default::default()
        }
    }

    /// Bound every TTL to `[min, max]`
    pub fn ttl_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_ttl = Some(min);
        self.max_ttl = Some(max);
        self
    }

    /// Reject values whose serialized form exceeds `bytes`
    pub fn max_value_size(mut self, bytes: usize) -> Self {
        self.max_value_size = Some(bytes);
        self
    }

    /// Never cache keys matching `pattern`
    pub fn exclude(mut self, pattern: impl Into<KeyPattern>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Require `predicate` for keys matching `pattern`
    pub fn condition<F>(mut self, pattern: impl Into<KeyPattern>, predicate: F) -> Self
    where
        F: Fn(&str, &Value) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Condition::new(pattern, predicate));
        self
    }

    /// Apply the admission filter
    pub fn admits(&self, key: &str, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }

        if let Some(limit) = self.max_value_size {
            match value_size(value) {
                Ok(size) if size <= limit => {}
                _ => return false,
            }
        }

        if self.exclude_patterns.iter().any(|p| p.matches(key)) {
            return false;
        }

        self.conditions
            .iter()
            .filter(|c| c.pattern.matches(key))
            .all(|c| (c.predicate)(key, value))
    }

    /// Clamp a TTL into the configured bounds
    pub fn clamp(&self, ttl: Duration) -> Duration {
        clamp_ttl(ttl, self.min_ttl, self.max_ttl)
    }
}

/// Policy that applies an `AdmissionConfig` and the default TTL
///
/// Used by propagation strategies when no eviction or TTL rules are needed.
#[derive(Debug, Default)]
pub struct BasePolicy {
    config: AdmissionConfig,
    counters: StrategyCounters,
}

impl BasePolicy {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            counters: StrategyCounters::new(),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }
}

impl CacheStrategy for BasePolicy {
    fn name(&self) -> &str {
        "base"
    }

    fn should_cache(&self, key: &str, value: &Value) -> bool {
        self.config.admits(key, value)
    }

    fn ttl_for(&self, _key: &str, _value: &Value) -> Duration {
        self.config.clamp(self.config.default_ttl)
    }

    fn on_hit(&self, _key: &str) {
        self.counters.hit();
    }

    fn on_miss(&self, _key: &str) {
        self.counters.miss();
    }

    fn on_set(&self, _key: &str, _value: &Value) -> Vec<String> {
        self.counters.admission();
        Vec::new()
    }

    fn on_delete(&self, _key: &str) {
        self.counters.delete();
    }

    fn stats(&self) -> StrategyStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_null() {
        let policy = BasePolicy::default();
        assert!(!policy.should_cache("key", &Value::Null));
        assert!(policy.should_cache("key", &json!(0)));
    }

    #[test]
    fn test_rejects_oversized() {
        let policy = BasePolicy::new(AdmissionConfig::default().max_value_size(8));
        assert!(policy.should_cache("key", &json!("short")));
        assert!(!policy.should_cache("key", &json!("much too long for eight bytes")));
    }

    #[test]
    fn test_rejects_excluded_keys() {
        let policy = BasePolicy::new(
            AdmissionConfig::default()
                .exclude("session:*")
                .exclude(KeyPattern::regex(r"^tmp:\d+$").unwrap()),
        );
        assert!(!policy.should_cache("session:abc", &json!(1)));
        assert!(!policy.should_cache("tmp:42", &json!(1)));
        assert!(policy.should_cache("product:42", &json!(1)));
    }

    #[test]
    fn test_conditions_apply_to_matching_keys_only() {
        let policy = BasePolicy::new(AdmissionConfig::default().condition(
            "product:*",
            |_, value: &Value| value.get("active").and_then(Value::as_bool) == Some(true),
        ));

        assert!(policy.should_cache("product:1", &json!({"active": true})));
        assert!(!policy.should_cache("product:2", &json!({"active": false})));
        assert!(policy.should_cache("order:1", &json!({"active": false})));
    }

    #[test]
    fn test_admission_is_pure() {
        let policy = BasePolicy::new(AdmissionConfig::default().max_value_size(64));
        let value = json!({"sku": "X"});
        let first = policy.should_cache("product:1", &value);
        let second = policy.should_cache("product:1", &value);
        assert_eq!(first, second);
        assert_eq!(policy.stats(), StrategyStats::default());
    }

    #[test]
    fn test_ttl_clamped() {
        let config = AdmissionConfig::with_ttl(Duration::from_secs(10))
            .ttl_bounds(Duration::from_secs(60), Duration::from_secs(600));
        let policy = BasePolicy::new(config);
        assert_eq!(policy.ttl_for("k", &json!(1)), Duration::from_secs(60));

        let config = AdmissionConfig::with_ttl(Duration::from_secs(7200))
            .ttl_bounds(Duration::from_secs(60), Duration::from_secs(600));
        let policy = BasePolicy::new(config);
        assert_eq!(policy.ttl_for("k", &json!(1)), Duration::from_secs(600));
    }

    #[test]
    fn test_hooks_update_counters() {
        let policy = BasePolicy::default();
        policy.on_hit("a");
        policy.on_miss("b");
        assert!(policy.on_set("b", &json!(1)).is_empty());
        policy.on_delete("a");

        let stats = policy.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.admissions, 1);
        assert_eq!(stats.deletes, 1);
    }
}
