//! Rule-based TTL policy
//!
//! Rules are checked in declaration order and the first one whose pattern
//! matches the key (and whose condition, if any, holds) supplies the base
//! TTL. Adaptive mode then scales that TTL by payload size and by naming
//! heuristics for static and volatile data. Keys no rule matches get the
//! default TTL without adaptive scaling.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use strata_cache_core::{CacheStrategy, KeyPattern, StrategyCounters, StrategyStats, Value};

use super::{Predicate, clamp_ttl, value_size};

/// A TTL assignment for keys matching a pattern
#[derive(Clone)]
pub struct TtlRule {
    pub pattern: KeyPattern,
    pub ttl: Duration,
    pub condition: Option<Predicate>,
}

impl TtlRule {
    pub fn new(pattern: impl Into<KeyPattern>, ttl: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            ttl,
            condition: None,
        }
    }

    /// Only apply the rule when `condition` holds for the key and value
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&str, &Value) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    fn applies(&self, key: &str, value: &Value) -> bool {
        self.pattern.matches(key)
            && self
                .condition
                .as_ref()
                .is_none_or(|condition| condition(key, value))
    }
}

impl fmt::Debug for TtlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlRule")
            .field("pattern", &self.pattern)
            .field("ttl", &self.ttl)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// Payloads larger than `min_bytes` have their TTL scaled by `multiplier`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeTier {
    pub min_bytes: usize,
    pub multiplier: f64,
}

/// Configuration for the TTL policy
#[derive(Debug, Clone)]
pub struct TtlConfig {
    /// TTL for keys no rule matches
    pub default_ttl: Duration,
    /// Lower TTL bound
    pub min_ttl: Option<Duration>,
    /// Upper TTL bound
    pub max_ttl: Option<Duration>,
    /// Scale rule TTLs by size and naming heuristics
    pub adaptive: bool,
    /// Largest serialized value admitted, in bytes
    pub max_value_size: usize,
    /// Size tiers; the largest tier a payload exceeds applies
    pub size_tiers: Vec<SizeTier>,
    /// Key fragments marking rarely-changing data
    pub static_markers: Vec<String>,
    /// Key fragments marking frequently-changing data
    pub volatile_markers: Vec<String>,
    pub static_multiplier: f64,
    pub volatile_multiplier: f64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            min_ttl: Some(Duration::from_secs(60)),
            max_ttl: Some(Duration::from_secs(86_400)),
            adaptive: false,
            max_value_size: 1024 * 1024,
            size_tiers: vec![
                SizeTier {
                    min_bytes: 100 * 1024,
                    multiplier: 0.5,
                },
                SizeTier {
                    min_bytes: 10 * 1024,
                    multiplier: 0.75,
                },
            ],
            static_markers: ["category", "categories", "setting", "config"]
                .map(String::from)
                .to_vec(),
            volatile_markers: ["inventory", "order", "stock"].map(String::from).to_vec(),
            static_multiplier: 2.0,
            volatile_multiplier: 0.5,
        }
    }
}

impl TtlConfig {
    /// Create config with specific default TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: ttl,
            ..Default::default()
        }
    }

    /// Enable adaptive scaling
    pub fn adaptive(mut self) -> Self {
        self.adaptive = true;
        self
    }

    /// Bound every TTL to `[min, max]`
    pub fn ttl_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_ttl = Some(min);
        self.max_ttl = Some(max);
        self
    }

    /// Remove both TTL bounds
    pub fn unbounded(mut self) -> Self {
        self.min_ttl = None;
        self.max_ttl = None;
        self
    }

    fn size_multiplier(&self, size: usize) -> f64 {
        self.size_tiers
            .iter()
            .filter(|tier| size > tier.min_bytes)
            .max_by_key(|tier| tier.min_bytes)
            .map_or(1.0, |tier| tier.multiplier)
    }

    fn naming_multiplier(&self, key: &str) -> f64 {
        let key = key.to_lowercase();
        if self.static_markers.iter().any(|m| key.contains(m.as_str())) {
            self.static_multiplier
        } else if self.volatile_markers.iter().any(|m| key.contains(m.as_str())) {
            self.volatile_multiplier
        } else {
            1.0
        }
    }
}

/// Policy assigning TTLs from ordered pattern rules
pub struct TtlStrategy {
    config: TtlConfig,
    rules: RwLock<Vec<TtlRule>>,
    counters: StrategyCounters,
}

impl TtlStrategy {
    pub fn new(config: TtlConfig) -> Self {
        Self {
            config,
            rules: RwLock::new(Vec::new()),
            counters: StrategyCounters::new(),
        }
    }

    /// Start with an initial rule list
    pub fn with_rules(config: TtlConfig, rules: impl IntoIterator<Item = TtlRule>) -> Self {
        let strategy = Self::new(config);
        strategy.rules.write().extend(rules);
        strategy
    }

    /// Append a rule; it is checked after every existing rule
    pub fn add_rule(&self, rule: TtlRule) {
        self.rules.write().push(rule);
    }

    /// Remove every rule with the given pattern
    ///
    /// Returns `true` if any rule was removed.
    pub fn remove_rule(&self, pattern: &KeyPattern) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| &rule.pattern != pattern);
        rules.len() != before
    }

    /// Remove every rule
    pub fn clear_rules(&self) {
        self.rules.write().clear();
    }

    /// Rule patterns in evaluation order
    pub fn rules(&self) -> Vec<KeyPattern> {
        self.rules
            .read()
            .iter()
            .map(|rule| rule.pattern.clone())
            .collect()
    }

    pub fn config(&self) -> &TtlConfig {
        &self.config
    }

    fn matching_rule_ttl(&self, key: &str, value: &Value) -> Option<Duration> {
        self.rules
            .read()
            .iter()
            .find(|rule| rule.applies(key, value))
            .map(|rule| rule.ttl)
    }

    fn adapt(&self, key: &str, value: &Value, base: Duration) -> Duration {
        let size = value_size(value).unwrap_or_default();
        let factor = self.config.size_multiplier(size) * self.config.naming_multiplier(key);
        scale(base, factor)
    }
}

/// Multiply a TTL, saturating at `Duration::MAX` and flooring NaN or
/// negative results at zero
fn scale(ttl: Duration, factor: f64) -> Duration {
    let secs = ttl.as_secs_f64() * factor;
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

impl fmt::Debug for TtlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlStrategy")
            .field("config", &self.config)
            .field("rules", &*self.rules.read())
            .finish()
    }
}

impl CacheStrategy for TtlStrategy {
    fn name(&self) -> &str {
        "ttl"
    }

    fn should_cache(&self, _key: &str, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        match value_size(value) {
            Ok(size) => size <= self.config.max_value_size,
            Err(_) => false,
        }
    }

    fn ttl_for(&self, key: &str, value: &Value) -> Duration {
        let ttl = match self.matching_rule_ttl(key, value) {
            Some(base) if self.config.adaptive => self.adapt(key, value, base),
            Some(base) => base,
            None => self.config.default_ttl,
        };
        clamp_ttl(ttl, self.config.min_ttl, self.config.max_ttl)
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

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_adaptive_scaling_saturates() {
        let strategy = TtlStrategy::with_rules(
            TtlConfig::default().unbounded().adaptive(),
            [TtlRule::new("*", Duration::MAX)],
        );

        assert_eq!(strategy.ttl_for("config:site", &json!(1)), Duration::MAX);
        assert_eq!(strategy.ttl_for("user:1", &json!(1)), Duration::MAX);
    }

    #[test]
    fn test_invalid_multipliers_floor_at_zero() {
        let mut config = TtlConfig::default().unbounded().adaptive();
        config.static_multiplier = -2.0;
        config.volatile_multiplier = f64::NAN;
        let strategy = TtlStrategy::with_rules(config, [TtlRule::new("*", secs(600))]);

        assert_eq!(strategy.ttl_for("config:site", &json!(1)), Duration::ZERO);
        assert_eq!(strategy.ttl_for("order:1", &json!(1)), Duration::ZERO);

        // bounds still apply afterwards
        let mut config = TtlConfig::default().adaptive();
        config.static_multiplier = f64::NAN;
        let strategy = TtlStrategy::with_rules(config, [TtlRule::new("*", secs(600))]);
        assert_eq!(strategy.ttl_for("config:site", &json!(1)), secs(60));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let strategy = TtlStrategy::with_rules(
            TtlConfig::default().unbounded(),
            [
                TtlRule::new("product:*", secs(600)),
                TtlRule::new("product:featured:*", secs(60)),
            ],
        );

        assert_eq!(strategy.ttl_for("product:featured:1", &json!(1)), secs(600));
    }

    #[test]
    fn test_order_not_specificity() {
        let strategy = TtlStrategy::with_rules(
            TtlConfig::default().unbounded(),
            [
                TtlRule::new("product:featured:*", secs(60)),
                TtlRule::new("product:*", secs(600)),
            ],
        );

        assert_eq!(strategy.ttl_for("product:featured:1", &json!(1)), secs(60));
        assert_eq!(strategy.ttl_for("product:2", &json!(1)), secs(600));
    }

    #[test]
    fn test_condition_must_hold() {
        let strategy = TtlStrategy::with_rules(
            TtlConfig::with_ttl(secs(120)).unbounded(),
            [
                TtlRule::new("product:*", secs(30))
                    .when(|_, value| value.get("on_sale").and_then(Value::as_bool) == Some(true)),
                TtlRule::new("product:*", secs(900)),
            ],
        );

        assert_eq!(strategy.ttl_for("product:1", &json!({"on_sale": true})), secs(30));
        assert_eq!(strategy.ttl_for("product:1", &json!({"on_sale": false})), secs(900));
        assert_eq!(strategy.ttl_for("user:1", &json!({})), secs(120));
    }

    #[test]
    fn test_default_ttl_not_adapted() {
        let strategy = TtlStrategy::new(TtlConfig::with_ttl(secs(1000)).unbounded().adaptive());
        assert_eq!(strategy.ttl_for("inventory:1", &json!(1)), secs(1000));
    }

    #[test]
    fn test_adaptive_naming() {
        let strategy = TtlStrategy::with_rules(
            TtlConfig::default().unbounded().adaptive(),
            [TtlRule::new("*", secs(1000))],
        );

        assert_eq!(strategy.ttl_for("category:shoes", &json!(1)), secs(2000));
        assert_eq!(strategy.ttl_for("inventory:sku-1", &json!(1)), secs(500));
        assert_eq!(strategy.ttl_for("user:1", &json!(1)), secs(1000));
    }

    #[test]
    fn test_adaptive_size_tiers() {
        let strategy = TtlStrategy::with_rules(
            TtlConfig::default().unbounded().adaptive(),
            [TtlRule::new("blob:*", secs(1000))],
        );

        let medium = json!("x".repeat(20 * 1024));
        let large = json!("x".repeat(200 * 1024));
        assert_eq!(strategy.ttl_for("blob:1", &medium), secs(750));
        assert_eq!(strategy.ttl_for("blob:1", &large), secs(500));
    }

    #[test]
    fn test_clamping_holds_for_every_path() {
        let min = secs(60);
        let max = secs(3600);
        let strategy = TtlStrategy::with_rules(
            TtlConfig::with_ttl(secs(10)).ttl_bounds(min, max).adaptive(),
            [
                TtlRule::new("category:*", secs(3000)),
                TtlRule::new("stock:*", secs(90)),
                TtlRule::new("tiny:*", secs(1)),
                TtlRule::new("huge:*", secs(1_000_000)),
            ],
        );

        let big = json!("x".repeat(200 * 1024));
        for key in ["category:a", "stock:a", "tiny:a", "huge:a", "unmatched"] {
            for value in [json!(1), big.clone()] {
                let ttl = strategy.ttl_for(key, &value);
                assert!(ttl >= min && ttl <= max, "{key} -> {ttl:?}");
            }
        }
    }

    #[test]
    fn test_rules_add_and_remove() {
        let strategy = TtlStrategy::new(TtlConfig::with_ttl(secs(300)).unbounded());
        let regex = KeyPattern::regex(r"^order:\d+$").unwrap();

        strategy.add_rule(TtlRule::new("product:*", secs(60)));
        strategy.add_rule(TtlRule::new(regex.clone(), secs(30)));
        assert_eq!(strategy.ttl_for("order:7", &json!(1)), secs(30));

        assert!(strategy.remove_rule(&KeyPattern::regex(r"^order:\d+$").unwrap()));
        assert!(!strategy.remove_rule(&regex));
        assert_eq!(strategy.ttl_for("order:7", &json!(1)), secs(300));
        assert_eq!(strategy.rules(), vec![KeyPattern::glob("product:*")]);
    }

    #[test]
    fn test_should_cache() {
        let config = TtlConfig {
            max_value_size: 16,
            ..Default::default()
        };
        let strategy = TtlStrategy::new(config);

        assert!(strategy.should_cache("k", &json!("small")));
        assert!(!strategy.should_cache("k", &json!("this is far beyond sixteen bytes")));
        assert!(!strategy.should_cache("k", &Value::Null));
    }
}
