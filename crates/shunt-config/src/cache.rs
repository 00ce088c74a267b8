use std::collections::HashMap;

use serde::Deserialize;

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether caching is enabled; a disabled cache never returns hits
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum entries before oldest-first eviction
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Default TTL in seconds for cached responses
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Per-domain TTL overrides in seconds
    #[serde(default)]
    pub domain_ttl_seconds: HashMap<String, u64>,
    /// Hit-rate target compared by `is_performance_target`
    #[serde(default = "default_hit_rate_target")]
    pub hit_rate_target: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            capacity: default_capacity(),
            default_ttl_seconds: default_ttl_seconds(),
            domain_ttl_seconds: HashMap::new(),
            hit_rate_target: default_hit_rate_target(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_enabled() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_capacity() -> usize {
    1000
}

#[allow(clippy::missing_const_for_fn)]
fn default_ttl_seconds() -> u64 {
    3600
}

#[allow(clippy::missing_const_for_fn)]
fn default_hit_rate_target() -> f64 {
    0.8
}
