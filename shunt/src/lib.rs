//! Shunt: adaptive routing and reliability control plane
//!
//! Wires the percentile estimator, response cache, cost-aware router,
//! autopilot, and health aggregator into one injectable [`ControlPlane`]
//! instance. The host process constructs it once at startup and passes
//! it by reference to every consumer; nothing here is a global.
//!
//! Request flow: [`ControlPlane::lookup`] for the cache fast path,
//! [`ControlPlane::decide`] on a miss, then [`ControlPlane::record_outcome`]
//! once the (external) backend invocation completes. Background monitors
//! close the loop without a request in flight.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod telemetry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use shunt_autopilot::Autopilot;
use shunt_cache::ResponseCache;
use shunt_cost::CostAwareRouter;
use shunt_health::HealthAggregator;
use shunt_metrics::{BucketKey, PercentileEstimator};
use tokio_util::sync::CancellationToken;

pub use shunt_autopilot::{MitigationAction, MitigationRecord, MitigationTrigger, WeightSnapshot};
pub use shunt_cache::CacheMetrics;
pub use shunt_config::{CacheConfig, Config, ConfigUpdate, CostStrategy, RoutingConfig, SloConfig};
pub use shunt_core::{
    BackendClient, BackendId, BackendKind, BreakerState, FLAG_CONTINUOUS_MONITORING, FLAG_COST_OPTIMIZATION,
    FeatureFlags, HealthProbe, InputError, Invocation, InvokeError, Priority, ProbeError, ProbeReport, Route,
    RouteRequest, RouteResponse, StaticFlags,
};
pub use shunt_cost::{
    BackendCandidate, CostDecision, CostProfileStore, CostRoutingError, DecisionReason, OptimizationMetrics,
    RouteCostProfile,
};
pub use shunt_health::{HealthClass, HealthSnapshot, HealthStatus, Recommendations};
pub use telemetry::init_tracing;

/// Routing decision returned to the caller
///
/// `cost` is `None` when the optimizer did not run: the
/// cost-optimization flag is off, or no cost profiles are seeded. In
/// both cases the base router's structural choice passes through
/// untouched.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// Backend to invoke
    pub backend: BackendId,
    /// Cost-aware decision detail, when the optimizer ran
    pub cost: Option<CostDecision>,
}

/// The control plane: one instance per process, injected everywhere
pub struct ControlPlane {
    estimator: Arc<PercentileEstimator>,
    cache: Arc<ResponseCache>,
    cost_store: Arc<CostProfileStore>,
    cost_router: CostAwareRouter,
    autopilot: Arc<Autopilot>,
    health: Arc<HealthAggregator>,
    flags: Arc<dyn FeatureFlags>,
    config: RwLock<Config>,
    sweep_token: Mutex<Option<CancellationToken>>,
}

impl ControlPlane {
    /// Build every component from one configuration
    pub fn new(config: Config, flags: Arc<dyn FeatureFlags>) -> Self {
        let estimator = Arc::new(PercentileEstimator::new(&config.metrics));
        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let cost_store = Arc::new(CostProfileStore::new());
        let cost_router = CostAwareRouter::new(Arc::clone(&cost_store), config.routing.clone());
        let autopilot = Arc::new(Autopilot::new(config.autopilot.clone(), config.slo.clone()));
        let health = Arc::new(HealthAggregator::new(config.health.clone(), config.slo.clone()));

        Self {
            estimator,
            cache,
            cost_store,
            cost_router,
            autopilot,
            health,
            flags,
            config: RwLock::new(config),
            sweep_token: Mutex::new(None),
        }
    }

    /// Register a health probe for a backend
    pub fn register_probe(&self, backend: impl Into<BackendId>, probe: Arc<dyn HealthProbe>) {
        self.health.register_probe(backend, probe);
    }

    /// Seed or replace the cost profiles the optimizer scores against
    pub fn seed_cost_profiles(&self, profiles: impl IntoIterator<Item = RouteCostProfile>) {
        self.cost_store.seed(profiles);
    }

    /// Cache fast path for a request
    ///
    /// Accepts bounded staleness when the autopilot's stale-serving
    /// mitigation is in effect for the requested (backend, route).
    /// Each call counts exactly one cache hit or miss.
    pub fn lookup(&self, request: &RouteRequest) -> Result<Option<RouteResponse>, InputError> {
        request.validate()?;
        let max_stale = self.autopilot.stale_cache_ttl(&request.backend, request.route);
        Ok(self.cache.get_with_stale(request, max_stale))
    }

    /// Decide which backend should serve a request
    ///
    /// Candidates are the profiled backends, filtered by live probe
    /// health and breaker state, carrying observed p50 latency and the
    /// current autopilot weight. An empty profile store is a
    /// configuration gap, not a failure: the base choice passes through
    /// so routing proceeds on incomplete data. Computes into locals
    /// only; an abandoned call never partially updates weights or
    /// counters.
    pub async fn decide(&self, request: &RouteRequest) -> Result<RouteDecision, InputError> {
        request.validate()?;

        if !self.flags.is_enabled(FLAG_COST_OPTIMIZATION) {
            tracing::debug!(backend = %request.backend, "cost optimization off, base choice passes through");
            return Ok(RouteDecision {
                backend: request.backend.clone(),
                cost: None,
            });
        }

        let candidates = self.candidates(request.route).await;
        match self.cost_router.decide(request, &candidates, &request.backend) {
            Ok(decision) => Ok(RouteDecision {
                backend: decision.selected_backend.clone(),
                cost: Some(decision),
            }),
            Err(CostRoutingError::NoCandidates) => {
                tracing::warn!(backend = %request.backend, "no cost profiles seeded, base choice passes through");
                Ok(RouteDecision {
                    backend: request.backend.clone(),
                    cost: None,
                })
            }
        }
    }

    /// Record the result of a backend invocation
    ///
    /// Feeds the estimator, the health stats, and, for successes only,
    /// the cache and the observed-cost baselines.
    pub fn record_outcome(&self, request: &RouteRequest, response: &RouteResponse) {
        let key = BucketKey::new(request.route, response.backend.clone(), request.intent.clone());
        self.estimator.record(&key, response.latency_ms);
        self.health
            .record_performance(&response.backend, response.latency_ms, response.success, request.route);
        if response.success {
            self.cache.set(request, response);
            self.health.record_cost(&response.backend, response.cost);
            self.cost_store.record_observed_cost(&response.backend, response.cost);
        }
    }

    /// Record which backend a decision intended versus which one served
    pub fn record_routing_decision(&self, intended: BackendId, actual: BackendId, latency_delta_ms: f64, reason: &str) {
        self.health.record_decision(intended, actual, latency_delta_ms, reason);
    }

    /// Record a completed request's performance for a backend
    pub fn record_request_performance(&self, backend: &BackendId, latency_ms: f64, success: bool, route: Route) {
        self.health.record_performance(backend, latency_ms, success, route);
    }

    /// Forward an external alert or breaker-open signal to the autopilot
    pub fn record_external_trigger(&self, trigger: MitigationTrigger, backend: &BackendId, route: Route) {
        self.autopilot.record_external_trigger(trigger, backend, route);
    }

    /// Run one autopilot drift check immediately
    pub fn check_drift(&self) {
        self.autopilot.check_drift(&self.estimator);
    }

    /// Probe and aggregate the full health status
    pub async fn health_status(&self) -> HealthStatus {
        self.health.status(&self.estimator).await
    }

    /// Current prioritized recommendation lists
    pub async fn optimization_recommendations(&self) -> Recommendations {
        self.health_status().await.recommendations
    }

    /// Cumulative cost-optimization accounting
    pub fn cost_optimization_metrics(&self) -> OptimizationMetrics {
        self.cost_router.metrics()
    }

    /// All seeded cost profiles, sorted by backend
    pub fn route_cost_profiles(&self) -> Vec<RouteCostProfile> {
        self.cost_store.profiles()
    }

    /// Cache hit/miss accounting
    pub fn cache_metrics(&self) -> CacheMetrics {
        self.cache.metrics()
    }

    /// Current autopilot weight for a (backend, route) pair
    pub fn backend_weight(&self, backend: &BackendId, route: Route) -> f64 {
        self.autopilot.weight(backend, route)
    }

    /// Every adjusted autopilot weight
    pub fn backend_weights(&self) -> Vec<WeightSnapshot> {
        self.autopilot.weights()
    }

    /// Retained autopilot mitigation records, newest last
    pub fn mitigation_records(&self) -> Vec<MitigationRecord> {
        self.autopilot.mitigation_records()
    }

    /// Merge a partial configuration update into every component
    ///
    /// Unspecified fields retain their prior values; no restart needed.
    pub fn update_configuration(&self, update: ConfigUpdate) {
        let merged = {
            let mut config = self.config.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            config.apply(update);
            config.clone()
        };

        self.autopilot.update_config(merged.autopilot.clone(), merged.slo.clone());
        self.health.update_config(merged.health.clone(), merged.slo.clone());
        self.cost_router.update_config(merged.routing.clone());
        self.cache.update_config(merged.cache.clone());
        tracing::info!("live configuration update applied");
    }

    /// Start the background monitors; gated on the monitoring flag
    ///
    /// Drives the autopilot drift loop, the health analysis loop, and a
    /// sweep loop for stale latency samples, expired cache entries, and
    /// cost-profile recomputation. Idempotent.
    pub fn start_monitors(&self) {
        if !self.flags.is_enabled(FLAG_CONTINUOUS_MONITORING) {
            tracing::debug!("continuous monitoring disabled by flag");
            return;
        }

        self.autopilot.start(Arc::clone(&self.estimator));
        self.health.start(Arc::clone(&self.estimator));

        let mut slot = self.sweep_token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let interval = Duration::from_secs(
            self.config
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .metrics
                .cleanup_interval_seconds,
        );
        let estimator = Arc::clone(&self.estimator);
        let cache = Arc::clone(&self.cache);
        let cost_store = Arc::clone(&self.cost_store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        estimator.sweep();
                        cache.purge_expired();
                        cost_store.recompute();
                    }
                }
            }
            tracing::debug!("sweep loop stopped");
        });
        tracing::info!("background monitors started");
    }

    /// Stop the background monitors; no-op if not running
    pub fn stop_monitors(&self) {
        self.autopilot.stop();
        self.health.stop();
        let mut slot = self.sweep_token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(token) = slot.take() {
            token.cancel();
        }
    }

    /// Profiled backends eligible right now, with live signals attached
    ///
    /// Unprobed backends stay eligible (health unknown is not a veto).
    /// If probes rule out every profiled backend the full set is used
    /// instead, since a degraded decision still beats none.
    async fn candidates(&self, route: Route) -> Vec<BackendCandidate> {
        let snapshots: HashMap<BackendId, HealthSnapshot> = self
            .health
            .probe_backends()
            .await
            .into_iter()
            .map(|s| (s.backend.clone(), s))
            .collect();

        let mut eligible = Vec::new();
        let mut all = Vec::new();
        for profile in self.cost_store.profiles() {
            let snapshot = snapshots.get(&profile.backend);
            let serving = snapshot.is_none_or(|s| s.healthy && s.breaker != BreakerState::Open);

            let observed = self.estimator.route_backend_percentiles(route, &profile.backend);
            let expected_latency_ms = if observed.count > 0 {
                observed.p50
            } else {
                snapshot.map_or(0.0, |s| s.latency_ms)
            };

            let candidate = BackendCandidate {
                backend: profile.backend.clone(),
                kind: profile.kind,
                expected_latency_ms,
                weight: self.autopilot.weight(&profile.backend, route),
            };
            all.push(candidate.clone());
            if serving {
                eligible.push(candidate);
            }
        }

        if eligible.is_empty() && !all.is_empty() {
            tracing::warn!(route = %route, "every profiled backend failed its probe, scoring the full set");
            return all;
        }
        eligible
    }
}
