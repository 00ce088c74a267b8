//! Per-backend cost profiles with time-of-day multipliers
//!
//! Seed data supplied at startup, refreshed periodically from observed
//! actual costs. Backends without a profile cost 0 so routing never
//! blocks on incomplete data.

use dashmap::DashMap;
use shunt_core::{BackendId, BackendKind};

/// Cost profile for one backend
#[derive(Debug, Clone)]
pub struct RouteCostProfile {
    /// Backend this profile describes
    pub backend: BackendId,
    /// Serving-path kind
    pub kind: BackendKind,
    /// Average cost per request in USD
    pub avg_cost_per_request: f64,
    /// Cost per token in USD
    pub cost_per_token: f64,
    /// Hourly cost multipliers, index 0 = midnight (off-peak cheaper)
    pub hourly_multipliers: [f64; 24],
    /// Derived score, 1.0 for the cheapest profiled backend
    pub cost_efficiency_score: f64,
}

impl RouteCostProfile {
    /// Flat profile with no time-of-day variation
    pub fn flat(backend: impl Into<BackendId>, kind: BackendKind, avg_cost_per_request: f64) -> Self {
        Self {
            backend: backend.into(),
            kind,
            avg_cost_per_request,
            cost_per_token: 0.0,
            hourly_multipliers: [1.0; 24],
            cost_efficiency_score: 0.0,
        }
    }

    /// Estimated cost of one request at the given hour of day
    pub fn cost_at_hour(&self, hour: u8) -> f64 {
        self.avg_cost_per_request * self.hourly_multipliers[usize::from(hour % 24)]
    }
}

/// Rolling observation of actual costs since the last recompute
#[derive(Debug, Clone, Copy, Default)]
struct ObservedCost {
    total: f64,
    count: u64,
}

/// Concurrent store of cost profiles, refreshed from observed spend
pub struct CostProfileStore {
    profiles: DashMap<BackendId, RouteCostProfile>,
    observed: DashMap<BackendId, ObservedCost>,
}

impl CostProfileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            observed: DashMap::new(),
        }
    }

    /// Seed or replace profiles, then derive efficiency scores
    pub fn seed(&self, profiles: impl IntoIterator<Item = RouteCostProfile>) {
        for profile in profiles {
            self.profiles.insert(profile.backend.clone(), profile);
        }
        self.refresh_efficiency_scores();
    }

    /// Profile for a backend, if one exists
    pub fn profile(&self, backend: &BackendId) -> Option<RouteCostProfile> {
        self.profiles.get(backend).map(|p| p.clone())
    }

    /// All profiles, sorted by backend for stable output
    pub fn profiles(&self) -> Vec<RouteCostProfile> {
        let mut all: Vec<RouteCostProfile> = self.profiles.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| a.backend.cmp(&b.backend));
        all
    }

    /// Estimated cost for a backend at an hour of day
    ///
    /// Unknown backends cost 0 rather than erroring, so routing can
    /// proceed on incomplete profile data.
    pub fn cost_for(&self, backend: &BackendId, hour: u8) -> f64 {
        self.profiles.get(backend).map_or_else(
            || {
                tracing::warn!(backend = %backend, "no cost profile for backend, assuming zero cost");
                0.0
            },
            |profile| profile.cost_at_hour(hour),
        )
    }

    /// Derived efficiency score for a backend, 0.0 when unprofiled
    pub fn efficiency_score(&self, backend: &BackendId) -> f64 {
        self.profiles.get(backend).map_or(0.0, |p| p.cost_efficiency_score)
    }

    /// Record an actually observed request cost
    pub fn record_observed_cost(&self, backend: &BackendId, cost: f64) {
        let mut entry = self.observed.entry(backend.clone()).or_default();
        entry.total += cost;
        entry.count += 1;
    }

    /// Fold observed costs back into the averages and re-derive scores
    ///
    /// Observations reset after each recompute so the next cycle sees
    /// fresh traffic only.
    pub fn recompute(&self) {
        for mut observed in self.observed.iter_mut() {
            if observed.count == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = observed.total / observed.count as f64;
            if let Some(mut profile) = self.profiles.get_mut(observed.key()) {
                tracing::debug!(
                    backend = %observed.key(),
                    prior = profile.avg_cost_per_request,
                    observed = mean,
                    "refreshing cost profile from observed spend"
                );
                profile.avg_cost_per_request = mean;
            }
            *observed = ObservedCost::default();
        }
        self.refresh_efficiency_scores();
    }

    fn refresh_efficiency_scores(&self) {
        let cheapest = self
            .profiles
            .iter()
            .map(|p| p.avg_cost_per_request)
            .filter(|c| *c > 0.0)
            .fold(f64::INFINITY, f64::min);

        for mut profile in self.profiles.iter_mut() {
            profile.cost_efficiency_score = if !cheapest.is_finite() || profile.avg_cost_per_request <= 0.0 {
                1.0
            } else {
                (cheapest / profile.avg_cost_per_request).clamp(0.0, 1.0)
            };
        }
    }
}

impl Default for CostProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CostProfileStore {
        let store = CostProfileStore::new();
        let mut off_peak = RouteCostProfile::flat("direct-model", BackendKind::DirectModel, 0.010);
        off_peak.hourly_multipliers[3] = 0.5;
        store.seed([
            off_peak,
            RouteCostProfile::flat("tool-router", BackendKind::ToolRouter, 0.002),
        ]);
        store
    }

    #[test]
    fn hourly_multiplier_applies() {
        let store = store();
        let backend = BackendId::from("direct-model");
        assert!((store.cost_for(&backend, 12) - 0.010).abs() < 1e-9);
        assert!((store.cost_for(&backend, 3) - 0.005).abs() < 1e-9);
        // Hour wraps modulo 24
        assert!((store.cost_for(&backend, 27) - 0.005).abs() < 1e-9);
    }

    #[test]
    fn unknown_backend_costs_zero() {
        let store = store();
        assert!(store.cost_for(&BackendId::from("mystery"), 12).abs() < f64::EPSILON);
        assert!(store.efficiency_score(&BackendId::from("mystery")).abs() < f64::EPSILON);
    }

    #[test]
    fn cheapest_backend_scores_one() {
        let store = store();
        assert!((store.efficiency_score(&BackendId::from("tool-router")) - 1.0).abs() < 1e-9);
        assert!((store.efficiency_score(&BackendId::from("direct-model")) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn recompute_folds_observed_costs() {
        let store = store();
        let backend = BackendId::from("direct-model");
        store.record_observed_cost(&backend, 0.004);
        store.record_observed_cost(&backend, 0.008);

        store.recompute();
        let profile = store.profile(&backend).unwrap();
        assert!((profile.avg_cost_per_request - 0.006).abs() < 1e-9);

        // Observations reset after folding
        store.recompute();
        let profile = store.profile(&backend).unwrap();
        assert!((profile.avg_cost_per_request - 0.006).abs() < 1e-9);
    }
}
