//! Cost-aware routing decisions
//!
//! Scores the structurally eligible backend set under the configured
//! strategy. Autopilot weight feeds the scoring: a down-weighted
//! backend looks more expensive and slower than its raw numbers.
//! Emergency and critical priorities skip all of this and take the
//! fastest path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use shunt_config::{CostStrategy, RoutingConfig};
use shunt_core::{BackendId, BackendKind, Priority, RouteRequest};

use crate::error::CostRoutingError;
use crate::profile::CostProfileStore;

/// Guard against division by a fully collapsed weight
const MIN_EFFECTIVE_WEIGHT: f64 = 0.01;

/// A structurally eligible backend with its live routing signals
#[derive(Debug, Clone)]
pub struct BackendCandidate {
    /// Backend identity
    pub backend: BackendId,
    /// Serving-path kind
    pub kind: BackendKind,
    /// Expected latency in milliseconds (observed p50 or probe RTT)
    pub expected_latency_ms: f64,
    /// Current autopilot weight in [min_weight, 1.0]
    pub weight: f64,
}

/// Why the router picked a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Emergency/critical priority forced the fastest path
    EmergencyOverride,
    /// Lowest effective cost won
    CheapestEligible,
    /// Blended cost/performance score won
    BalancedBlend,
    /// Fastest backend won; cost broke ties only
    FastestPreferred,
}

/// Result of a cost-aware routing decision
#[derive(Debug, Clone)]
pub struct CostDecision {
    /// Backend to invoke
    pub selected_backend: BackendId,
    /// Estimated cost of the request at the current hour
    pub estimated_cost: f64,
    /// Base-router cost minus chosen cost, floored at 0
    pub cost_savings: f64,
    /// Efficiency score of the chosen backend's profile
    pub cost_efficiency_score: f64,
    /// Hour-adjusted costs of the unchosen candidates
    pub alternative_costs: Vec<(BackendId, f64)>,
    /// Why this backend won
    pub reason: DecisionReason,
}

/// Cumulative optimization accounting
#[derive(Debug, Clone, Default)]
pub struct OptimizationMetrics {
    /// Total decisions made
    pub decisions: u64,
    /// Decisions short-circuited by the emergency override
    pub emergency_overrides: u64,
    /// Sum of per-decision cost savings
    pub total_savings: f64,
    /// Decision counts per strategy name
    pub by_strategy: HashMap<String, u64>,
}

/// Routes requests by blended cost, performance, and time-of-day profiles
pub struct CostAwareRouter {
    store: Arc<CostProfileStore>,
    config: RwLock<RoutingConfig>,
    metrics: Mutex<OptimizationMetrics>,
}

impl CostAwareRouter {
    /// Create a router over a profile store
    pub fn new(store: Arc<CostProfileStore>, config: RoutingConfig) -> Self {
        Self {
            store,
            config: RwLock::new(config),
            metrics: Mutex::new(OptimizationMetrics::default()),
        }
    }

    /// Replace the live configuration
    pub fn update_config(&self, config: RoutingConfig) {
        *self.config.write().unwrap_or_else(std::sync::PoisonError::into_inner) = config;
    }

    /// Decide which backend should serve a request, at the current hour
    pub fn decide(
        &self,
        request: &RouteRequest,
        candidates: &[BackendCandidate],
        base_choice: &BackendId,
    ) -> Result<CostDecision, CostRoutingError> {
        #[allow(clippy::cast_sign_loss)]
        let hour = jiff::Zoned::now().hour() as u8;
        self.decide_at_hour(request, candidates, base_choice, hour)
    }

    /// Decide with an explicit hour of day
    ///
    /// Everything is computed into locals and committed only on
    /// success; an abandoned call never partially updates accounting.
    pub fn decide_at_hour(
        &self,
        request: &RouteRequest,
        candidates: &[BackendCandidate],
        base_choice: &BackendId,
        hour: u8,
    ) -> Result<CostDecision, CostRoutingError> {
        if candidates.is_empty() {
            return Err(CostRoutingError::NoCandidates);
        }

        let config = self
            .config
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let costs: Vec<f64> = candidates
            .iter()
            .map(|c| self.store.cost_for(&c.backend, hour))
            .collect();

        let (index, reason) = if request.priority.bypasses_cost_optimization() {
            (Self::fastest(candidates), DecisionReason::EmergencyOverride)
        } else {
            match config.strategy {
                CostStrategy::AggressiveCostReduction => (Self::cheapest(candidates, &costs), DecisionReason::CheapestEligible),
                CostStrategy::BalancedCostPerformance => {
                    (Self::balanced(candidates, &costs, &config), DecisionReason::BalancedBlend)
                }
                CostStrategy::DynamicCostRouting => {
                    if config.is_off_peak(hour) {
                        (Self::cheapest(candidates, &costs), DecisionReason::CheapestEligible)
                    } else {
                        (Self::balanced(candidates, &costs, &config), DecisionReason::BalancedBlend)
                    }
                }
                CostStrategy::PerformanceFirst => {
                    (Self::fastest_cost_tiebreak(candidates, &costs), DecisionReason::FastestPreferred)
                }
            }
        };

        let chosen = &candidates[index];
        let estimated_cost = costs[index];
        let base_cost = self.store.cost_for(base_choice, hour);
        let cost_savings = (base_cost - estimated_cost).max(0.0);

        let alternative_costs = candidates
            .iter()
            .zip(&costs)
            .filter(|(c, _)| c.backend != chosen.backend)
            .map(|(c, cost)| (c.backend.clone(), *cost))
            .collect();

        let decision = CostDecision {
            selected_backend: chosen.backend.clone(),
            estimated_cost,
            cost_savings,
            cost_efficiency_score: self.store.efficiency_score(&chosen.backend),
            alternative_costs,
            reason,
        };

        tracing::info!(
            backend = %decision.selected_backend,
            cost = decision.estimated_cost,
            savings = decision.cost_savings,
            reason = ?decision.reason,
            "cost-aware routing decision"
        );

        self.commit_metrics(&config, &decision);
        Ok(decision)
    }

    /// Snapshot of cumulative optimization accounting
    pub fn metrics(&self) -> OptimizationMetrics {
        self.metrics.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    fn commit_metrics(&self, config: &RoutingConfig, decision: &CostDecision) {
        let mut metrics = self.metrics.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        metrics.decisions += 1;
        metrics.total_savings += decision.cost_savings;
        if decision.reason == DecisionReason::EmergencyOverride {
            metrics.emergency_overrides += 1;
        }
        *metrics.by_strategy.entry(strategy_name(config.strategy).to_owned()).or_default() += 1;
    }

    /// Lowest expected latency; ties prefer the direct path
    fn fastest(candidates: &[BackendCandidate]) -> usize {
        best_index(candidates.len(), |a, b| {
            let (ca, cb) = (&candidates[a], &candidates[b]);
            ca.expected_latency_ms
                .partial_cmp(&cb.expected_latency_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| direct_first(ca.kind, cb.kind))
        })
    }

    /// Lowest weight-adjusted cost; ties by latency
    fn cheapest(candidates: &[BackendCandidate], costs: &[f64]) -> usize {
        best_index(candidates.len(), |a, b| {
            let ea = costs[a] / candidates[a].weight.max(MIN_EFFECTIVE_WEIGHT);
            let eb = costs[b] / candidates[b].weight.max(MIN_EFFECTIVE_WEIGHT);
            ea.partial_cmp(&eb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    candidates[a]
                        .expected_latency_ms
                        .partial_cmp(&candidates[b].expected_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        })
    }

    /// Highest weighted blend of normalized cost and speed
    fn balanced(candidates: &[BackendCandidate], costs: &[f64], config: &RoutingConfig) -> usize {
        let max_cost = costs.iter().copied().fold(0.0_f64, f64::max);
        let max_latency = candidates
            .iter()
            .map(|c| c.expected_latency_ms)
            .fold(0.0_f64, f64::max);

        let score = |i: usize| {
            let norm_cost = if max_cost > 0.0 { costs[i] / max_cost } else { 0.0 };
            let norm_speed = if max_latency > 0.0 {
                1.0 - candidates[i].expected_latency_ms / max_latency
            } else {
                1.0
            };
            (config.cost_weight * (1.0 - norm_cost) + config.speed_weight * norm_speed) * candidates[i].weight
        };

        best_index(candidates.len(), |a, b| {
            score(b).partial_cmp(&score(a)).unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Lowest weight-adjusted latency; cost is the tiebreaker only
    fn fastest_cost_tiebreak(candidates: &[BackendCandidate], costs: &[f64]) -> usize {
        best_index(candidates.len(), |a, b| {
            let la = candidates[a].expected_latency_ms / candidates[a].weight.max(MIN_EFFECTIVE_WEIGHT);
            let lb = candidates[b].expected_latency_ms / candidates[b].weight.max(MIN_EFFECTIVE_WEIGHT);
            la.partial_cmp(&lb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| costs[a].partial_cmp(&costs[b]).unwrap_or(std::cmp::Ordering::Equal))
        })
    }
}

/// Index that sorts first under the comparator
fn best_index(len: usize, compare: impl Fn(usize, usize) -> std::cmp::Ordering) -> usize {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.sort_by(|a, b| compare(*a, *b));
    indices[0]
}

const fn direct_first(a: BackendKind, b: BackendKind) -> std::cmp::Ordering {
    match (a, b) {
        (BackendKind::DirectModel, BackendKind::ToolRouter) => std::cmp::Ordering::Less,
        (BackendKind::ToolRouter, BackendKind::DirectModel) => std::cmp::Ordering::Greater,
        _ => std::cmp::Ordering::Equal,
    }
}

const fn strategy_name(strategy: CostStrategy) -> &'static str {
    match strategy {
        CostStrategy::AggressiveCostReduction => "aggressive-cost-reduction",
        CostStrategy::BalancedCostPerformance => "balanced-cost-performance",
        CostStrategy::DynamicCostRouting => "dynamic-cost-routing",
        CostStrategy::PerformanceFirst => "performance-first",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::RouteCostProfile;
    use shunt_core::Route;

    fn store() -> Arc<CostProfileStore> {
        let store = CostProfileStore::new();
        let mut direct = RouteCostProfile::flat("direct-model", BackendKind::DirectModel, 0.010);
        direct.hourly_multipliers[2] = 0.1;
        store.seed([
            direct,
            RouteCostProfile::flat("tool-router", BackendKind::ToolRouter, 0.002),
        ]);
        Arc::new(store)
    }

    fn candidates() -> Vec<BackendCandidate> {
        vec![
            BackendCandidate {
                backend: BackendId::from("direct-model"),
                kind: BackendKind::DirectModel,
                expected_latency_ms: 400.0,
                weight: 1.0,
            },
            BackendCandidate {
                backend: BackendId::from("tool-router"),
                kind: BackendKind::ToolRouter,
                expected_latency_ms: 900.0,
                weight: 1.0,
            },
        ]
    }

    fn request(priority: Priority) -> RouteRequest {
        RouteRequest {
            prompt: "hello".to_owned(),
            backend: BackendId::from("direct-model"),
            model: "gpt-4o-mini".to_owned(),
            temperature: None,
            max_tokens: None,
            domain: "general".to_owned(),
            intent: "chat".to_owned(),
            route: Route::Generation,
            priority,
        }
    }

    fn router(strategy: CostStrategy) -> CostAwareRouter {
        CostAwareRouter::new(
            store(),
            RoutingConfig {
                strategy,
                ..RoutingConfig::default()
            },
        )
    }

    #[test]
    fn aggressive_picks_cheapest() {
        let router = router(CostStrategy::AggressiveCostReduction);
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &candidates(), &BackendId::from("direct-model"), 12)
            .unwrap();
        assert_eq!(decision.selected_backend, BackendId::from("tool-router"));
        assert!((decision.estimated_cost - 0.002).abs() < 1e-9);
        assert!((decision.cost_savings - 0.008).abs() < 1e-9);
    }

    #[test]
    fn emergency_overrides_every_strategy() {
        for strategy in [
            CostStrategy::AggressiveCostReduction,
            CostStrategy::BalancedCostPerformance,
            CostStrategy::DynamicCostRouting,
            CostStrategy::PerformanceFirst,
        ] {
            let router = router(strategy);
            for priority in [Priority::Emergency, Priority::Critical] {
                let decision = router
                    .decide_at_hour(&request(priority), &candidates(), &BackendId::from("tool-router"), 12)
                    .unwrap();
                assert_eq!(
                    decision.selected_backend,
                    BackendId::from("direct-model"),
                    "strategy {strategy:?} must yield the fastest backend for {priority}"
                );
                assert_eq!(decision.reason, DecisionReason::EmergencyOverride);
            }
        }
    }

    #[test]
    fn balanced_prefers_cheap_when_speeds_close() {
        let router = router(CostStrategy::BalancedCostPerformance);
        let mut close = candidates();
        close[1].expected_latency_ms = 410.0;
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &close, &BackendId::from("direct-model"), 12)
            .unwrap();
        assert_eq!(decision.selected_backend, BackendId::from("tool-router"));
    }

    #[test]
    fn balanced_respects_autopilot_weight() {
        let router = router(CostStrategy::BalancedCostPerformance);
        let mut weighted = candidates();
        // Heavily down-weighted cheap backend loses the blend
        weighted[1].weight = 0.1;
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &weighted, &BackendId::from("direct-model"), 12)
            .unwrap();
        assert_eq!(decision.selected_backend, BackendId::from("direct-model"));
    }

    #[test]
    fn dynamic_is_aggressive_off_peak_only() {
        let router = router(CostStrategy::DynamicCostRouting);
        let req = request(Priority::Normal);
        let base = BackendId::from("direct-model");

        // Off-peak (23h): cheapest wins
        let decision = router.decide_at_hour(&req, &candidates(), &base, 23).unwrap();
        assert_eq!(decision.reason, DecisionReason::CheapestEligible);

        // On-peak (12h): balanced blend
        let decision = router.decide_at_hour(&req, &candidates(), &base, 12).unwrap();
        assert_eq!(decision.reason, DecisionReason::BalancedBlend);
    }

    #[test]
    fn performance_first_uses_cost_as_tiebreaker() {
        let router = router(CostStrategy::PerformanceFirst);
        let mut tied = candidates();
        tied[1].expected_latency_ms = 400.0;
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &tied, &BackendId::from("direct-model"), 12)
            .unwrap();
        // Equal latency, cheaper backend wins the tie
        assert_eq!(decision.selected_backend, BackendId::from("tool-router"));
        assert_eq!(decision.reason, DecisionReason::FastestPreferred);
    }

    #[test]
    fn savings_floored_at_zero() {
        let router = router(CostStrategy::PerformanceFirst);
        let mut fast_expensive = candidates();
        fast_expensive[0].expected_latency_ms = 100.0;
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &fast_expensive, &BackendId::from("tool-router"), 12)
            .unwrap();
        assert_eq!(decision.selected_backend, BackendId::from("direct-model"));
        assert!(decision.cost_savings.abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_backends_default_to_zero_cost() {
        let router = router(CostStrategy::AggressiveCostReduction);
        let unknown = vec![BackendCandidate {
            backend: BackendId::from("unprofiled"),
            kind: BackendKind::DirectModel,
            expected_latency_ms: 500.0,
            weight: 1.0,
        }];
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &unknown, &BackendId::from("unprofiled"), 12)
            .unwrap();
        assert!(decision.estimated_cost.abs() < f64::EPSILON);
        assert!(decision.cost_efficiency_score.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_candidate_set_errors() {
        let router = router(CostStrategy::BalancedCostPerformance);
        let result = router.decide_at_hour(&request(Priority::Normal), &[], &BackendId::from("x"), 12);
        assert!(matches!(result, Err(CostRoutingError::NoCandidates)));
    }

    #[test]
    fn hourly_multiplier_shifts_the_choice() {
        let router = router(CostStrategy::AggressiveCostReduction);
        let req = request(Priority::Normal);
        let base = BackendId::from("direct-model");

        // At hour 2 the direct model is discounted to 0.001, under the router's 0.002
        let decision = router.decide_at_hour(&req, &candidates(), &base, 2).unwrap();
        assert_eq!(decision.selected_backend, BackendId::from("direct-model"));
    }

    #[test]
    fn metrics_accumulate() {
        let router = router(CostStrategy::AggressiveCostReduction);
        let req = request(Priority::Normal);
        let base = BackendId::from("direct-model");
        router.decide_at_hour(&req, &candidates(), &base, 12).unwrap();
        router
            .decide_at_hour(&request(Priority::Emergency), &candidates(), &base, 12)
            .unwrap();

        let metrics = router.metrics();
        assert_eq!(metrics.decisions, 2);
        assert_eq!(metrics.emergency_overrides, 1);
        assert!(metrics.total_savings > 0.0);
        assert_eq!(metrics.by_strategy.get("aggressive-cost-reduction"), Some(&2));
    }

    #[test]
    fn alternatives_exclude_the_chosen_backend() {
        let router = router(CostStrategy::AggressiveCostReduction);
        let decision = router
            .decide_at_hour(&request(Priority::Normal), &candidates(), &BackendId::from("direct-model"), 12)
            .unwrap();
        assert_eq!(decision.alternative_costs.len(), 1);
        assert_eq!(decision.alternative_costs[0].0, BackendId::from("direct-model"));
    }
}
