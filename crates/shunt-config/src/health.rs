use serde::Deserialize;

/// Health aggregation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Interval between background analysis passes
    #[serde(default = "default_analysis_interval_seconds")]
    pub analysis_interval_seconds: u64,
    /// Score penalty per unhealthy backend
    #[serde(default = "default_unhealthy_penalty")]
    pub unhealthy_penalty: u32,
    /// Score penalty per open circuit breaker
    #[serde(default = "default_breaker_open_penalty")]
    pub breaker_open_penalty: u32,
    /// Success rate below which an immediate recommendation fires
    #[serde(default = "default_success_rate_floor")]
    pub success_rate_floor: f64,
    /// Cost-anomaly threshold as a ratio of the rolling baseline
    #[serde(default = "default_cost_anomaly_ratio")]
    pub cost_anomaly_ratio: f64,
    /// Traffic share above which one backend counts as imbalanced
    #[serde(default = "default_imbalance_share")]
    pub imbalance_share: f64,
    /// Fallback share above which fallback overuse fires
    #[serde(default = "default_fallback_share")]
    pub fallback_share: f64,
    /// Number of routing decisions retained for efficiency replay
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            analysis_interval_seconds: default_analysis_interval_seconds(),
            unhealthy_penalty: default_unhealthy_penalty(),
            breaker_open_penalty: default_breaker_open_penalty(),
            success_rate_floor: default_success_rate_floor(),
            cost_anomaly_ratio: default_cost_anomaly_ratio(),
            imbalance_share: default_imbalance_share(),
            fallback_share: default_fallback_share(),
            outcome_window: default_outcome_window(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_analysis_interval_seconds() -> u64 {
    120
}

#[allow(clippy::missing_const_for_fn)]
fn default_unhealthy_penalty() -> u32 {
    25
}

#[allow(clippy::missing_const_for_fn)]
fn default_breaker_open_penalty() -> u32 {
    15
}

#[allow(clippy::missing_const_for_fn)]
fn default_success_rate_floor() -> f64 {
    0.95
}

#[allow(clippy::missing_const_for_fn)]
fn default_cost_anomaly_ratio() -> f64 {
    1.5
}

#[allow(clippy::missing_const_for_fn)]
fn default_imbalance_share() -> f64 {
    0.8
}

#[allow(clippy::missing_const_for_fn)]
fn default_fallback_share() -> f64 {
    0.4
}

#[allow(clippy::missing_const_for_fn)]
fn default_outcome_window() -> usize {
    1000
}
