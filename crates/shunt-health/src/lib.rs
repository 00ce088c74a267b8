//! Backend health aggregation and routing-efficiency analysis
//!
//! Merges health-probe results, sliding-window latency percentiles,
//! and routing-outcome history into a single 0-100 score plus
//! prioritized recommendation lists. Probe failures are converted
//! into unhealthy snapshots at the boundary and never re-thrown.

#![allow(clippy::must_use_candidate)]

mod recommend;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use shunt_config::{HealthConfig, SloConfig};
use shunt_core::{BackendId, BreakerState, HealthProbe, Route};
use shunt_metrics::PercentileEstimator;
use tokio_util::sync::CancellationToken;

pub use recommend::Recommendations;

/// Point-in-time health of one backend
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Backend probed
    pub backend: BackendId,
    /// Whether the backend is serving
    pub healthy: bool,
    /// Probe round-trip latency in milliseconds
    pub latency_ms: f64,
    /// Consecutive probe failures
    pub consecutive_failures: u32,
    /// Circuit-breaker state
    pub breaker: BreakerState,
}

/// Overall health classification thresholds: >= 70 healthy, 40-69
/// degraded, below 40 critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HealthClass {
    Healthy,
    Degraded,
    Critical,
}

/// Scored overall health
#[derive(Debug, Clone, Copy)]
pub struct OverallHealth {
    /// 0-100 score
    pub score: u32,
    /// Classification of the score
    pub classification: HealthClass,
}

/// Full aggregated status
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Scored overall health
    pub overall: OverallHealth,
    /// Per-backend snapshots, probe order
    pub per_backend: Vec<HealthSnapshot>,
    /// Fraction of recorded decisions that matched the optimal choice
    pub routing_efficiency: f64,
    /// Prioritized recommendation lists
    pub recommendations: Recommendations,
}

/// One recorded routing decision outcome
#[derive(Debug, Clone)]
struct RoutingOutcome {
    intended: BackendId,
    actual: BackendId,
    #[allow(dead_code)]
    latency_delta_ms: f64,
    #[allow(dead_code)]
    reason: String,
    #[allow(dead_code)]
    at: Instant,
}

/// Per-backend request accounting fed by the performance entry point
#[derive(Debug, Default)]
struct BackendStats {
    requests: u64,
    failures: u64,
}

/// Rolling cost observations for the anomaly rule
#[derive(Debug, Default)]
struct CostTrack {
    total: f64,
    count: u64,
    recent: VecDeque<f64>,
}

/// Recent-cost window size for anomaly detection
const RECENT_COST_WINDOW: usize = 50;

/// Merges probes, percentiles, and outcome history into one status
pub struct HealthAggregator {
    probes: Mutex<Vec<(BackendId, Arc<dyn HealthProbe>)>>,
    outcomes: Mutex<VecDeque<RoutingOutcome>>,
    stats: DashMap<BackendId, BackendStats>,
    costs: DashMap<BackendId, CostTrack>,
    config: RwLock<HealthConfig>,
    slo: RwLock<SloConfig>,
    loop_token: Mutex<Option<CancellationToken>>,
}

impl HealthAggregator {
    /// Create an aggregator from configuration
    pub fn new(config: HealthConfig, slo: SloConfig) -> Self {
        Self {
            probes: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            stats: DashMap::new(),
            costs: DashMap::new(),
            config: RwLock::new(config),
            slo: RwLock::new(slo),
            loop_token: Mutex::new(None),
        }
    }

    /// Replace the live configuration
    pub fn update_config(&self, config: HealthConfig, slo: SloConfig) {
        *self.config.write().unwrap_or_else(std::sync::PoisonError::into_inner) = config;
        *self.slo.write().unwrap_or_else(std::sync::PoisonError::into_inner) = slo;
    }

    /// Register a health probe for a backend
    pub fn register_probe(&self, backend: impl Into<BackendId>, probe: Arc<dyn HealthProbe>) {
        self.lock_probes().push((backend.into(), probe));
    }

    /// Record the outcome of a routing decision
    pub fn record_decision(&self, intended: BackendId, actual: BackendId, latency_delta_ms: f64, reason: &str) {
        let window = self.config_read().outcome_window;
        let mut outcomes = self.lock_outcomes();
        if outcomes.len() >= window {
            outcomes.pop_front();
        }
        outcomes.push_back(RoutingOutcome {
            intended,
            actual,
            latency_delta_ms,
            reason: reason.to_owned(),
            at: Instant::now(),
        });
    }

    /// Record the performance of a completed request
    pub fn record_performance(&self, backend: &BackendId, latency_ms: f64, success: bool, route: Route) {
        let mut stats = self.stats.entry(backend.clone()).or_default();
        stats.requests += 1;
        if !success {
            stats.failures += 1;
        }
        drop(stats);
        tracing::debug!(
            backend = %backend,
            route = %route,
            latency_ms,
            success,
            "request performance recorded"
        );
    }

    /// Record an observed request cost for the anomaly baseline
    pub fn record_cost(&self, backend: &BackendId, cost: f64) {
        let mut track = self.costs.entry(backend.clone()).or_default();
        track.total += cost;
        track.count += 1;
        if track.recent.len() >= RECENT_COST_WINDOW {
            track.recent.pop_front();
        }
        track.recent.push_back(cost);
    }

    /// Fraction of recorded decisions where the intended backend
    /// actually served; 0.0 with no history
    pub fn analyze_routing_efficiency(&self) -> f64 {
        let outcomes = self.lock_outcomes();
        if outcomes.is_empty() {
            return 0.0;
        }
        let optimal = outcomes.iter().filter(|o| o.intended == o.actual).count();
        #[allow(clippy::cast_precision_loss)]
        let efficiency = optimal as f64 / outcomes.len() as f64;
        efficiency
    }

    /// Probe every registered backend, probe order
    ///
    /// A failed probe yields an unhealthy snapshot with an open breaker
    /// rather than an error.
    pub async fn probe_backends(&self) -> Vec<HealthSnapshot> {
        let probes: Vec<(BackendId, Arc<dyn HealthProbe>)> = self.lock_probes().clone();

        let mut snapshots = Vec::with_capacity(probes.len());
        for (backend, probe) in probes {
            let snapshot = match probe.health_check(&backend).await {
                Ok(report) => HealthSnapshot {
                    backend: backend.clone(),
                    healthy: report.healthy,
                    latency_ms: report.latency_ms,
                    consecutive_failures: report.consecutive_failures,
                    breaker: report.breaker,
                },
                Err(e) => {
                    tracing::warn!(backend = %backend, error = %e, "health probe failed");
                    HealthSnapshot {
                        backend: backend.clone(),
                        healthy: false,
                        latency_ms: 0.0,
                        consecutive_failures: 0,
                        breaker: BreakerState::Open,
                    }
                }
            };
            snapshots.push(snapshot);
        }
        snapshots
    }

    /// Probe every registered backend and aggregate the full status
    pub async fn status(&self, estimator: &PercentileEstimator) -> HealthStatus {
        let per_backend = self.probe_backends().await;

        let config = self.config_read().clone();
        let slo = self.slo.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();

        let overall = Self::score(&config, &per_backend);
        let routing_efficiency = self.analyze_routing_efficiency();
        let recommendations = self.recommend(&config, &slo, &per_backend, estimator);

        HealthStatus {
            overall,
            per_backend,
            routing_efficiency,
            recommendations,
        }
    }

    /// Start the background analysis loop; no-op if already running
    pub fn start(self: &Arc<Self>, estimator: Arc<PercentileEstimator>) {
        let mut slot = self.loop_token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let aggregator = Arc::clone(self);
        let interval = std::time::Duration::from_secs(aggregator.config_read().analysis_interval_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let status = aggregator.status(&estimator).await;
                        tracing::info!(
                            score = status.overall.score,
                            classification = %status.overall.classification,
                            efficiency = status.routing_efficiency,
                            "periodic health analysis"
                        );
                    }
                }
            }
            tracing::debug!("health analysis loop stopped");
        });
    }

    /// Stop the background analysis loop; no-op if not running
    pub fn stop(&self) {
        let mut slot = self.loop_token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(token) = slot.take() {
            token.cancel();
        }
    }

    fn score(config: &HealthConfig, snapshots: &[HealthSnapshot]) -> OverallHealth {
        let mut score = 100_u32;
        for snapshot in snapshots {
            if !snapshot.healthy {
                score = score.saturating_sub(config.unhealthy_penalty);
            }
            if snapshot.breaker == BreakerState::Open {
                score = score.saturating_sub(config.breaker_open_penalty);
            }
        }
        let classification = if score >= 70 {
            HealthClass::Healthy
        } else if score >= 40 {
            HealthClass::Degraded
        } else {
            HealthClass::Critical
        };
        OverallHealth { score, classification }
    }

    fn success_rate(&self, backend: &BackendId) -> Option<f64> {
        let stats = self.stats.get(backend)?;
        if stats.requests == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = 1.0 - stats.failures as f64 / stats.requests as f64;
        Some(rate)
    }

    fn cost_anomaly(&self, backend: &BackendId, ratio: f64) -> Option<(f64, f64)> {
        let track = self.costs.get(backend)?;
        if track.count == 0 || track.recent.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let baseline = track.total / track.count as f64;
        #[allow(clippy::cast_precision_loss)]
        let current = track.recent.iter().sum::<f64>() / track.recent.len() as f64;
        (baseline > 0.0 && current > baseline * ratio).then_some((current, baseline))
    }

    fn traffic_shares(&self) -> Vec<(BackendId, f64)> {
        let total: u64 = self.stats.iter().map(|s| s.requests).sum();
        if total == 0 {
            return Vec::new();
        }
        self.stats
            .iter()
            .map(|entry| {
                #[allow(clippy::cast_precision_loss)]
                let share = entry.requests as f64 / total as f64;
                (entry.key().clone(), share)
            })
            .collect()
    }

    fn fallback_share(&self) -> f64 {
        let outcomes = self.lock_outcomes();
        if outcomes.is_empty() {
            return 0.0;
        }
        let fallbacks = outcomes.iter().filter(|o| o.intended != o.actual).count();
        #[allow(clippy::cast_precision_loss)]
        let share = fallbacks as f64 / outcomes.len() as f64;
        share
    }

    fn lock_probes(&self) -> std::sync::MutexGuard<'_, Vec<(BackendId, Arc<dyn HealthProbe>)>> {
        self.probes.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, VecDeque<RoutingOutcome>> {
        self.outcomes.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn config_read(&self) -> std::sync::RwLockReadGuard<'_, HealthConfig> {
        self.config.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shunt_config::MetricsConfig;
    use shunt_core::{ProbeError, ProbeReport};
    use shunt_metrics::BucketKey;

    struct FixedProbe {
        report: ProbeReport,
    }

    #[async_trait::async_trait]
    impl HealthProbe for FixedProbe {
        async fn health_check(&self, _backend: &BackendId) -> Result<ProbeReport, ProbeError> {
            Ok(self.report.clone())
        }
    }

    struct FailingProbe;

    #[async_trait::async_trait]
    impl HealthProbe for FailingProbe {
        async fn health_check(&self, _backend: &BackendId) -> Result<ProbeReport, ProbeError> {
            Err(ProbeError::Unreachable("connection refused".to_owned()))
        }
    }

    fn healthy_report() -> ProbeReport {
        ProbeReport {
            healthy: true,
            latency_ms: 40.0,
            consecutive_failures: 0,
            breaker: BreakerState::Closed,
        }
    }

    fn unhealthy_report() -> ProbeReport {
        ProbeReport {
            healthy: false,
            latency_ms: 0.0,
            consecutive_failures: 4,
            breaker: BreakerState::Open,
        }
    }

    fn aggregator() -> HealthAggregator {
        HealthAggregator::new(HealthConfig::default(), SloConfig::default())
    }

    fn estimator() -> PercentileEstimator {
        PercentileEstimator::new(&MetricsConfig::default())
    }

    #[tokio::test]
    async fn all_healthy_scores_hundred() {
        let agg = aggregator();
        agg.register_probe("direct-model", Arc::new(FixedProbe { report: healthy_report() }));
        agg.register_probe("tool-router", Arc::new(FixedProbe { report: healthy_report() }));

        let status = agg.status(&estimator()).await;
        assert_eq!(status.overall.score, 100);
        assert_eq!(status.overall.classification, HealthClass::Healthy);
        assert!(status.recommendations.immediate.is_empty());
    }

    #[tokio::test]
    async fn unhealthy_backend_lowers_score_and_names_it() {
        let agg = aggregator();
        agg.register_probe("direct-model", Arc::new(FixedProbe { report: healthy_report() }));
        agg.register_probe("tool-router", Arc::new(FixedProbe { report: unhealthy_report() }));

        let status = agg.status(&estimator()).await;
        assert!(status.overall.score < 100);
        assert!(
            status
                .recommendations
                .immediate
                .iter()
                .any(|r| r.contains("tool-router")),
            "immediate recommendations must name the unhealthy backend: {:?}",
            status.recommendations.immediate
        );
    }

    #[tokio::test]
    async fn failed_probe_counts_as_unhealthy() {
        let agg = aggregator();
        agg.register_probe("direct-model", Arc::new(FailingProbe));

        let status = agg.status(&estimator()).await;
        assert!(!status.per_backend[0].healthy);
        assert_eq!(status.per_backend[0].breaker, BreakerState::Open);
        // Unhealthy plus open breaker: 100 - 25 - 15
        assert_eq!(status.overall.score, 60);
        assert_eq!(status.overall.classification, HealthClass::Degraded);
    }

    #[tokio::test]
    async fn score_classification_bounds() {
        let agg = aggregator();
        for name in ["a", "b", "c"] {
            agg.register_probe(name, Arc::new(FixedProbe { report: unhealthy_report() }));
        }

        let status = agg.status(&estimator()).await;
        // 3 x (25 + 15) = 120 of penalties, saturating at zero
        assert_eq!(status.overall.score, 0);
        assert_eq!(status.overall.classification, HealthClass::Critical);
    }

    #[test]
    fn efficiency_zero_without_history() {
        let agg = aggregator();
        assert!(agg.analyze_routing_efficiency().abs() < f64::EPSILON);
    }

    #[test]
    fn efficiency_counts_matching_decisions() {
        let agg = aggregator();
        let a = BackendId::from("a");
        let b = BackendId::from("b");
        for _ in 0..3 {
            agg.record_decision(a.clone(), a.clone(), 0.0, "optimal");
        }
        agg.record_decision(a.clone(), b.clone(), 120.0, "fallback: a breaker open");

        assert!((agg.analyze_routing_efficiency() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn outcome_window_is_bounded() {
        let agg = HealthAggregator::new(
            HealthConfig {
                outcome_window: 5,
                ..HealthConfig::default()
            },
            SloConfig::default(),
        );
        let a = BackendId::from("a");
        let b = BackendId::from("b");
        // 5 fallbacks pushed out by 5 optimal decisions
        for _ in 0..5 {
            agg.record_decision(a.clone(), b.clone(), 50.0, "fallback");
        }
        for _ in 0..5 {
            agg.record_decision(a.clone(), a.clone(), 0.0, "optimal");
        }
        assert!((agg.analyze_routing_efficiency() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn success_rate_rule_fires() {
        let agg = aggregator();
        agg.register_probe("direct-model", Arc::new(FixedProbe { report: healthy_report() }));
        let backend = BackendId::from("direct-model");
        for i in 0..10 {
            agg.record_performance(&backend, 100.0, i < 8, Route::Generation);
        }

        let status = agg.status(&estimator()).await;
        assert!(
            status
                .recommendations
                .immediate
                .iter()
                .any(|r| r.contains("success rate"))
        );
    }

    #[tokio::test]
    async fn latency_rule_fires_on_slo_breach() {
        let agg = aggregator();
        agg.register_probe("direct-model", Arc::new(FixedProbe { report: healthy_report() }));
        let est = estimator();
        let key = BucketKey::new(Route::Generation, "direct-model", "chat");
        for _ in 0..20 {
            est.record(&key, 4000.0);
        }

        let status = agg.status(&est).await;
        assert!(
            status
                .recommendations
                .optimization
                .iter()
                .any(|r| r.contains("p95"))
        );
    }

    #[tokio::test]
    async fn cost_anomaly_rule_fires() {
        let agg = aggregator();
        agg.register_probe("direct-model", Arc::new(FixedProbe { report: healthy_report() }));
        let backend = BackendId::from("direct-model");
        // Long cheap baseline, then an expensive recent window
        for _ in 0..200 {
            agg.record_cost(&backend, 0.001);
        }
        for _ in 0..50 {
            agg.record_cost(&backend, 0.050);
        }

        let status = agg.status(&estimator()).await;
        assert!(
            status
                .recommendations
                .optimization
                .iter()
                .any(|r| r.contains("cost"))
        );
    }

    #[tokio::test]
    async fn imbalance_and_fallback_rules_fire_together() {
        let agg = aggregator();
        agg.register_probe("hot", Arc::new(FixedProbe { report: healthy_report() }));
        agg.register_probe("cold", Arc::new(FixedProbe { report: healthy_report() }));

        let hot = BackendId::from("hot");
        let cold = BackendId::from("cold");
        for _ in 0..95 {
            agg.record_performance(&hot, 100.0, true, Route::Generation);
        }
        for _ in 0..5 {
            agg.record_performance(&cold, 100.0, true, Route::Generation);
        }
        // Every decision fell back: both rules must fire independently
        for _ in 0..10 {
            agg.record_decision(cold.clone(), hot.clone(), 80.0, "fallback");
        }

        let status = agg.status(&estimator()).await;
        assert!(status.recommendations.optimization.iter().any(|r| r.contains("traffic")));
        assert!(status.recommendations.maintenance.iter().any(|r| r.contains("fallback")));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let agg = Arc::new(aggregator());
        let est = Arc::new(estimator());

        agg.start(Arc::clone(&est));
        agg.start(Arc::clone(&est));
        agg.stop();
        agg.stop();
        agg.start(est);
        agg.stop();
    }
}
