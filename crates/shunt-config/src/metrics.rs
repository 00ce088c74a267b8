use serde::Deserialize;

/// Sliding-window percentile estimator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Window size in seconds; older samples never appear in queries
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Per-bucket sample cap; oldest samples evicted beyond this
    #[serde(default = "default_max_samples")]
    pub max_samples_per_bucket: usize,
    /// Interval between background stale-sample sweeps
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            max_samples_per_bucket: default_max_samples(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_window_seconds() -> u64 {
    1800
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_samples() -> usize {
    10_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_cleanup_interval_seconds() -> u64 {
    60
}
