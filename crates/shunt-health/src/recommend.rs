//! Recommendation rules
//!
//! Independent checks over the aggregated signals. Each rule appends
//! at most one string and every rule runs; several may fire from the
//! same status pass.

use shunt_config::{HealthConfig, SloConfig};
use shunt_core::BreakerState;
use shunt_metrics::PercentileEstimator;

use crate::{HealthAggregator, HealthSnapshot};

/// Prioritized recommendation lists
#[derive(Debug, Clone, Default)]
pub struct Recommendations {
    /// Act now: outages, open breakers, failing requests
    pub immediate: Vec<String>,
    /// Tune soon: latency, cost, and balance drift
    pub optimization: Vec<String>,
    /// Housekeeping: structural routing issues
    pub maintenance: Vec<String>,
}

impl Recommendations {
    /// Whether any list has entries
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.optimization.is_empty() && self.maintenance.is_empty()
    }
}

impl HealthAggregator {
    pub(crate) fn recommend(
        &self,
        config: &HealthConfig,
        slo: &SloConfig,
        snapshots: &[HealthSnapshot],
        estimator: &PercentileEstimator,
    ) -> Recommendations {
        let mut recs = Recommendations::default();

        // Unhealthy backends
        let unhealthy: Vec<&str> = snapshots
            .iter()
            .filter(|s| !s.healthy)
            .map(|s| s.backend.as_str())
            .collect();
        if !unhealthy.is_empty() {
            recs.immediate.push(format!(
                "backend(s) {} unhealthy; shift traffic away until probes recover",
                unhealthy.join(", ")
            ));
        }

        // Open circuit breakers
        let open: Vec<&str> = snapshots
            .iter()
            .filter(|s| s.breaker == BreakerState::Open)
            .map(|s| s.backend.as_str())
            .collect();
        if !open.is_empty() {
            recs.immediate.push(format!(
                "circuit breaker open for {}; hold traffic until the half-open probe succeeds",
                open.join(", ")
            ));
        }

        // Success rate below floor, worst offender named
        let worst_rate = snapshots
            .iter()
            .filter_map(|s| self.success_rate(&s.backend).map(|rate| (s.backend.clone(), rate)))
            .filter(|(_, rate)| *rate < config.success_rate_floor)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((backend, rate)) = worst_rate {
            recs.immediate.push(format!(
                "success rate for {backend} at {:.1}% is below the {:.1}% floor; investigate recent failures",
                rate * 100.0,
                config.success_rate_floor * 100.0
            ));
        }

        // p95 over the route objective, worst pair named
        let mut worst_breach: Option<(String, f64, f64)> = None;
        for (backend, route) in estimator.tracked_pairs() {
            let snap = estimator.route_backend_percentiles(route, &backend);
            if snap.count == 0 {
                continue;
            }
            let threshold = slo.threshold_for(route);
            if snap.p95 > threshold {
                let overshoot = snap.p95 - threshold;
                if worst_breach.as_ref().is_none_or(|(_, _, prior)| overshoot > *prior) {
                    worst_breach = Some((format!("{backend} on {route}"), snap.p95, overshoot));
                }
            }
        }
        if let Some((pair, p95, _)) = worst_breach {
            recs.optimization
                .push(format!("p95 for {pair} at {p95:.0}ms exceeds its latency objective; shift weight or scale"));
        }

        // Cost anomaly against the rolling baseline
        let anomaly = snapshots
            .iter()
            .find_map(|s| self.cost_anomaly(&s.backend, config.cost_anomaly_ratio).map(|c| (s.backend.clone(), c)));
        if let Some((backend, (current, baseline))) = anomaly {
            recs.optimization.push(format!(
                "cost for {backend} at {current:.4} is over {:.0}% of its {baseline:.4} baseline; review pricing or routing",
                config.cost_anomaly_ratio * 100.0
            ));
        }

        // Traffic imbalance
        let dominant = self
            .traffic_shares()
            .into_iter()
            .find(|(_, share)| *share > config.imbalance_share);
        if let Some((backend, share)) = dominant {
            recs.optimization.push(format!(
                "{backend} carries {:.0}% of traffic; rebalance before it becomes a single point of failure",
                share * 100.0
            ));
        }

        // Fallback overuse
        let fallback = self.fallback_share();
        if fallback > config.fallback_share {
            recs.maintenance.push(format!(
                "{:.0}% of decisions fell back from the intended backend; revisit base routing configuration",
                fallback * 100.0
            ));
        }

        recs
    }
}
