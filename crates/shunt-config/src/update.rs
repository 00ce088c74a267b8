//! Live partial configuration updates
//!
//! Every field is optional; `Config::apply` merges only what is set,
//! so unspecified fields retain their prior values.

use serde::Deserialize;

use crate::{Config, routing::CostStrategy};

/// Partial update merged into a live [`Config`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    /// Latency objective overrides
    #[serde(default)]
    pub slo: Option<SloUpdate>,
    /// Autopilot tuning overrides
    #[serde(default)]
    pub autopilot: Option<AutopilotUpdate>,
    /// Cost-routing overrides
    #[serde(default)]
    pub routing: Option<RoutingUpdate>,
    /// Cache overrides
    #[serde(default)]
    pub cache: Option<CacheUpdate>,
    /// Health-rule overrides
    #[serde(default)]
    pub health: Option<HealthUpdate>,
}

/// Partial latency objectives
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SloUpdate {
    pub generation_p95_ms: Option<f64>,
    pub retrieval_p95_ms: Option<f64>,
    pub cached_p95_ms: Option<f64>,
}

/// Partial autopilot tuning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutopilotUpdate {
    pub drift_debounce_seconds: Option<u64>,
    pub recovery_delay_seconds: Option<u64>,
    pub reduction_factor: Option<f64>,
    pub min_weight: Option<f64>,
    pub recovery_multiplier: Option<f64>,
    pub min_samples: Option<usize>,
}

/// Partial cost-routing tuning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingUpdate {
    pub strategy: Option<CostStrategy>,
    pub cost_weight: Option<f64>,
    pub speed_weight: Option<f64>,
    pub off_peak_start: Option<u8>,
    pub off_peak_end: Option<u8>,
}

/// Partial cache tuning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheUpdate {
    pub enabled: Option<bool>,
    pub default_ttl_seconds: Option<u64>,
    pub hit_rate_target: Option<f64>,
}

/// Partial health-rule tuning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthUpdate {
    pub success_rate_floor: Option<f64>,
    pub cost_anomaly_ratio: Option<f64>,
    pub imbalance_share: Option<f64>,
    pub fallback_share: Option<f64>,
}

macro_rules! merge {
    ($target:expr, $source:expr, $($field:ident),+ $(,)?) => {
        $(if let Some(value) = $source.$field {
            $target.$field = value;
        })+
    };
}

impl Config {
    /// Merge a partial update into this configuration
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(slo) = update.slo {
            merge!(self.slo, slo, generation_p95_ms, retrieval_p95_ms, cached_p95_ms);
        }
        if let Some(autopilot) = update.autopilot {
            merge!(
                self.autopilot,
                autopilot,
                drift_debounce_seconds,
                recovery_delay_seconds,
                reduction_factor,
                min_weight,
                recovery_multiplier,
                min_samples,
            );
        }
        if let Some(routing) = update.routing {
            merge!(
                self.routing,
                routing,
                strategy,
                cost_weight,
                speed_weight,
                off_peak_start,
                off_peak_end,
            );
        }
        if let Some(cache) = update.cache {
            merge!(self.cache, cache, enabled, default_ttl_seconds, hit_rate_target);
        }
        if let Some(health) = update.health {
            merge!(
                self.health,
                health,
                success_rate_floor,
                cost_anomaly_ratio,
                imbalance_share,
                fallback_share,
            );
        }
    }
}
