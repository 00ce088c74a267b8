#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

//! Configuration for the Shunt control plane
//!
//! Loaded once from TOML at process start; partial updates merge into
//! the live configuration without a restart.

pub mod autopilot;
pub mod cache;
pub mod health;
mod loader;
pub mod metrics;
pub mod routing;
pub mod slo;
mod update;

use serde::Deserialize;

pub use autopilot::AutopilotConfig;
pub use cache::CacheConfig;
pub use health::HealthConfig;
pub use metrics::MetricsConfig;
pub use routing::{CostStrategy, RoutingConfig};
pub use slo::SloConfig;
pub use update::ConfigUpdate;

/// Top-level control-plane configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Latency percentile estimator configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Per-route latency objectives
    #[serde(default)]
    pub slo: SloConfig,
    /// Autopilot weight controller configuration
    #[serde(default)]
    pub autopilot: AutopilotConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Cost-aware routing configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Health aggregation configuration
    #[serde(default)]
    pub health: HealthConfig,
}
