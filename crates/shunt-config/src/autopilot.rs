use serde::Deserialize;

/// Autopilot weight controller configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutopilotConfig {
    /// Interval between drift checks
    #[serde(default = "default_drift_interval_seconds")]
    pub drift_interval_seconds: u64,
    /// Minimum seconds between successive weight reductions for one key
    #[serde(default = "default_drift_debounce_seconds")]
    pub drift_debounce_seconds: u64,
    /// Seconds under threshold before weight is raised again
    #[serde(default = "default_recovery_delay_seconds")]
    pub recovery_delay_seconds: u64,
    /// Multiplier applied on each drift-triggered reduction
    #[serde(default = "default_reduction_factor")]
    pub reduction_factor: f64,
    /// Weight floor; reductions never go below this
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    /// Multiplier applied on each recovery step, capped at 1.0
    #[serde(default = "default_recovery_multiplier")]
    pub recovery_multiplier: f64,
    /// Minimum samples in the window before a pair is considered
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Context-shortening ratio applied when escalating at the floor
    #[serde(default = "default_context_shortening_ratio")]
    pub context_shortening_ratio: f64,
    /// TTL for stale-while-revalidate serving enabled by escalation
    #[serde(default = "default_stale_cache_ttl_seconds")]
    pub stale_cache_ttl_seconds: u64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            drift_interval_seconds: default_drift_interval_seconds(),
            drift_debounce_seconds: default_drift_debounce_seconds(),
            recovery_delay_seconds: default_recovery_delay_seconds(),
            reduction_factor: default_reduction_factor(),
            min_weight: default_min_weight(),
            recovery_multiplier: default_recovery_multiplier(),
            min_samples: default_min_samples(),
            context_shortening_ratio: default_context_shortening_ratio(),
            stale_cache_ttl_seconds: default_stale_cache_ttl_seconds(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_drift_interval_seconds() -> u64 {
    60
}

#[allow(clippy::missing_const_for_fn)]
fn default_drift_debounce_seconds() -> u64 {
    120
}

#[allow(clippy::missing_const_for_fn)]
fn default_recovery_delay_seconds() -> u64 {
    300
}

#[allow(clippy::missing_const_for_fn)]
fn default_reduction_factor() -> f64 {
    0.75
}

#[allow(clippy::missing_const_for_fn)]
fn default_min_weight() -> f64 {
    0.1
}

#[allow(clippy::missing_const_for_fn)]
fn default_recovery_multiplier() -> f64 {
    1.2
}

#[allow(clippy::missing_const_for_fn)]
fn default_min_samples() -> usize {
    10
}

#[allow(clippy::missing_const_for_fn)]
fn default_context_shortening_ratio() -> f64 {
    0.5
}

#[allow(clippy::missing_const_for_fn)]
fn default_stale_cache_ttl_seconds() -> u64 {
    300
}
