use serde::Deserialize;

/// Strategy applied by the cost-aware router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CostStrategy {
    /// Always pick the cheapest eligible backend
    AggressiveCostReduction,
    /// Blend normalized cost and speed scores
    #[default]
    BalancedCostPerformance,
    /// Aggressive during off-peak hours, balanced otherwise
    DynamicCostRouting,
    /// Route for speed; cost only breaks ties
    PerformanceFirst,
}

/// Cost-aware routing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Active cost strategy
    #[serde(default)]
    pub strategy: CostStrategy,
    /// Weight on the (1 - normalized cost) term in the balanced score
    #[serde(default = "default_blend_weight")]
    pub cost_weight: f64,
    /// Weight on the normalized speed term in the balanced score
    #[serde(default = "default_blend_weight")]
    pub speed_weight: f64,
    /// First off-peak hour, inclusive (0-23); the range may wrap midnight
    #[serde(default = "default_off_peak_start")]
    pub off_peak_start: u8,
    /// First on-peak hour after the off-peak range, exclusive (0-23)
    #[serde(default = "default_off_peak_end")]
    pub off_peak_end: u8,
}

impl RoutingConfig {
    /// Whether an hour of day falls in the configured off-peak range
    pub const fn is_off_peak(&self, hour: u8) -> bool {
        if self.off_peak_start <= self.off_peak_end {
            hour >= self.off_peak_start && hour < self.off_peak_end
        } else {
            // Wraps midnight, e.g. 22..6
            hour >= self.off_peak_start || hour < self.off_peak_end
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: CostStrategy::default(),
            cost_weight: default_blend_weight(),
            speed_weight: default_blend_weight(),
            off_peak_start: default_off_peak_start(),
            off_peak_end: default_off_peak_end(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_blend_weight() -> f64 {
    0.5
}

#[allow(clippy::missing_const_for_fn)]
fn default_off_peak_start() -> u8 {
    22
}

#[allow(clippy::missing_const_for_fn)]
fn default_off_peak_end() -> u8 {
    6
}
