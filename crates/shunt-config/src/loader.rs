use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails,
    /// or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config: Self = toml::from_str(&raw).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error on out-of-range tuning values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.autopilot.reduction_factor <= 0.0 || self.autopilot.reduction_factor >= 1.0 {
            anyhow::bail!("autopilot.reduction_factor must be in (0, 1)");
        }
        if self.autopilot.min_weight <= 0.0 || self.autopilot.min_weight > 1.0 {
            anyhow::bail!("autopilot.min_weight must be in (0, 1]");
        }
        if self.autopilot.recovery_multiplier < 1.0 {
            anyhow::bail!("autopilot.recovery_multiplier must be at least 1.0");
        }
        if (self.routing.cost_weight + self.routing.speed_weight - 1.0).abs() > 1e-6 {
            anyhow::bail!("routing.cost_weight and routing.speed_weight must sum to 1.0");
        }
        if self.routing.off_peak_start > 23 || self.routing.off_peak_end > 23 {
            anyhow::bail!("routing off-peak hours must be in 0..=23");
        }
        if self.slo.generation_p95_ms <= 0.0 || self.slo.retrieval_p95_ms <= 0.0 || self.slo.cached_p95_ms <= 0.0 {
            anyhow::bail!("slo thresholds must be positive");
        }
        if !(0.0..=1.0).contains(&self.cache.hit_rate_target) {
            anyhow::bail!("cache.hit_rate_target must be in [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parses_full_toml() {
        let config: Config = toml::from_str(
            r#"
            [metrics]
            window_seconds = 900

            [slo]
            generation_p95_ms = 1200.0

            [autopilot]
            reduction_factor = 0.8
            min_weight = 0.15

            [cache]
            enabled = true
            capacity = 500
            [cache.domain_ttl_seconds]
            support = 600

            [routing]
            strategy = "aggressive-cost-reduction"

            [health]
            outcome_window = 200
            "#,
        )
        .unwrap();

        assert_eq!(config.metrics.window_seconds, 900);
        assert_eq!(config.cache.domain_ttl_seconds.get("support"), Some(&600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_reduction_factor() {
        let mut config = Config::default();
        config.autopilot.reduction_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unbalanced_blend_weights() {
        let mut config = Config::default();
        config.routing.cost_weight = 0.7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<Config, _> = toml::from_str("[metrics]\nbogus = 1");
        assert!(result.is_err());
    }
}
