//! Autopilot weight controller
//!
//! Watches sliding-window p95 latency per (backend, route) pair and
//! shifts routing weight away from drifting backends, escalating
//! through context shortening, tool disabling, and stale-cache serving
//! once the weight floor is reached. Recovery is gradual and bounded
//! at 1.0.

#![allow(clippy::must_use_candidate)]

pub mod mitigation;

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use shunt_config::{AutopilotConfig, SloConfig};
use shunt_core::{BackendId, Route};
use shunt_metrics::PercentileEstimator;
use tokio_util::sync::CancellationToken;

pub use mitigation::{MitigationAction, MitigationRecord, MitigationTrigger};

/// Mitigation log retention window
const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Weight map key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeightKey {
    /// Backend the weight applies to
    pub backend: BackendId,
    /// Route the weight applies to
    pub route: Route,
}

/// Current weight and adjustment bookkeeping for one key
#[derive(Debug, Clone)]
struct WeightState {
    weight: f64,
    last_adjustment: Option<Instant>,
    reason: String,
}

impl Default for WeightState {
    fn default() -> Self {
        Self {
            weight: 1.0,
            last_adjustment: None,
            reason: String::new(),
        }
    }
}

/// Read-only view of one backend weight
#[derive(Debug, Clone)]
pub struct WeightSnapshot {
    /// Backend the weight applies to
    pub backend: BackendId,
    /// Route the weight applies to
    pub route: Route,
    /// Current weight in [min_weight, 1.0]
    pub weight: f64,
    /// Human-readable reason for the last adjustment
    pub reason: String,
}

/// Adaptive weight controller with a mitigation escalation ladder
pub struct Autopilot {
    weights: DashMap<WeightKey, WeightState>,
    mitigations: Mutex<Vec<MitigationRecord>>,
    config: RwLock<AutopilotConfig>,
    slo: RwLock<SloConfig>,
    loop_token: Mutex<Option<CancellationToken>>,
}

impl Autopilot {
    /// Create an autopilot from configuration
    pub fn new(config: AutopilotConfig, slo: SloConfig) -> Self {
        Self {
            weights: DashMap::new(),
            mitigations: Mutex::new(Vec::new()),
            config: RwLock::new(config),
            slo: RwLock::new(slo),
            loop_token: Mutex::new(None),
        }
    }

    /// Replace the live configuration
    pub fn update_config(&self, config: AutopilotConfig, slo: SloConfig) {
        *self.config.write().unwrap_or_else(std::sync::PoisonError::into_inner) = config;
        *self.slo.write().unwrap_or_else(std::sync::PoisonError::into_inner) = slo;
    }

    /// Current weight for a (backend, route) pair; 1.0 when untracked
    pub fn weight(&self, backend: &BackendId, route: Route) -> f64 {
        self.weights
            .get(&WeightKey {
                backend: backend.clone(),
                route,
            })
            .map_or(1.0, |state| state.weight)
    }

    /// Snapshot of every adjusted weight
    pub fn weights(&self) -> Vec<WeightSnapshot> {
        self.weights
            .iter()
            .map(|entry| WeightSnapshot {
                backend: entry.key().backend.clone(),
                route: entry.key().route,
                weight: entry.value().weight,
                reason: entry.value().reason.clone(),
            })
            .collect()
    }

    /// Run one drift check over every tracked (backend, route) pair
    ///
    /// Pairs with fewer than `min_samples` live samples are skipped as
    /// insufficient evidence.
    pub fn check_drift(&self, estimator: &PercentileEstimator) {
        let config = self.config.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        let slo = self.slo.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();

        for (backend, route) in estimator.tracked_pairs() {
            let snap = estimator.route_backend_percentiles(route, &backend);
            if snap.count < config.min_samples {
                continue;
            }

            let threshold = slo.threshold_for(route);
            if snap.p95 > threshold {
                self.handle_drift(&config, &backend, route, snap.p95, threshold);
            } else {
                self.handle_recovery(&config, &backend, route, snap.p95);
            }
        }

        self.prune_mitigations();
    }

    /// Apply an externally signalled trigger (alert or breaker open)
    ///
    /// Reduces weight the same way a drift detection would, under the
    /// same debounce.
    pub fn record_external_trigger(&self, trigger: MitigationTrigger, backend: &BackendId, route: Route) {
        let config = self.config.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        self.reduce_weight(&config, backend, route, trigger, format!("external trigger: {trigger}"));
        // Retention must also hold for hosts that never run the drift loop
        self.prune_mitigations();
    }

    /// Context-shortening ratio in effect for a pair; 1.0 when none
    pub fn context_shortening_ratio(&self, backend: &BackendId, route: Route) -> f64 {
        let max_age = self.recovery_delay();
        self.lock_mitigations()
            .iter()
            .filter(|r| r.applies(backend, route, max_age))
            .filter_map(|r| match r.action {
                MitigationAction::ContextShortening { ratio } => Some(ratio),
                _ => None,
            })
            .fold(1.0, f64::min)
    }

    /// Whether non-essential tool calls should be skipped for a pair
    pub fn should_disable_tools(&self, backend: &BackendId, route: Route) -> bool {
        let max_age = self.recovery_delay();
        self.lock_mitigations()
            .iter()
            .any(|r| r.applies(backend, route, max_age) && r.action == MitigationAction::ToolDisable)
    }

    /// Stale-serving TTL in effect for a pair, if any
    pub fn stale_cache_ttl(&self, backend: &BackendId, route: Route) -> Option<Duration> {
        let max_age = self.recovery_delay();
        self.lock_mitigations()
            .iter()
            .filter(|r| r.applies(backend, route, max_age))
            .find_map(|r| match r.action {
                MitigationAction::StaleCacheEnable { ttl } => Some(ttl),
                _ => None,
            })
    }

    /// All retained mitigation records, newest last
    pub fn mitigation_records(&self) -> Vec<MitigationRecord> {
        self.lock_mitigations().clone()
    }

    /// Start the background drift loop; no-op if already running
    pub fn start(self: &Arc<Self>, estimator: Arc<PercentileEstimator>) {
        let mut slot = self.loop_token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let autopilot = Arc::clone(self);
        let interval = Duration::from_secs(
            autopilot
                .config
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .drift_interval_seconds,
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => autopilot.check_drift(&estimator),
                }
            }
            tracing::debug!("autopilot drift loop stopped");
        });
    }

    /// Stop the background drift loop; no-op if not running
    pub fn stop(&self) {
        let mut slot = self.loop_token.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(token) = slot.take() {
            token.cancel();
        }
    }

    fn handle_drift(&self, config: &AutopilotConfig, backend: &BackendId, route: Route, p95: f64, threshold: f64) {
        tracing::warn!(
            backend = %backend,
            route = %route,
            p95_ms = p95,
            threshold_ms = threshold,
            "p95 latency drift detected"
        );
        self.reduce_weight(
            config,
            backend,
            route,
            MitigationTrigger::P95Drift,
            format!("p95 {p95:.0}ms over {threshold:.0}ms objective"),
        );
    }

    fn reduce_weight(
        &self,
        config: &AutopilotConfig,
        backend: &BackendId,
        route: Route,
        trigger: MitigationTrigger,
        reason: String,
    ) {
        let key = WeightKey {
            backend: backend.clone(),
            route,
        };
        let debounce = Duration::from_secs(config.drift_debounce_seconds);
        let mut state = self.weights.entry(key).or_default();

        if state.last_adjustment.is_some_and(|at| at.elapsed() < debounce) {
            return;
        }

        let at_floor = state.weight <= config.min_weight + f64::EPSILON;
        if at_floor {
            state.last_adjustment = Some(Instant::now());
            drop(state);
            self.escalate(config, backend, route, trigger);
            return;
        }

        let before = state.weight;
        let after = (before * config.reduction_factor).max(config.min_weight);
        state.weight = after;
        state.last_adjustment = Some(Instant::now());
        state.reason = reason;
        drop(state);

        tracing::info!(
            backend = %backend,
            route = %route,
            before,
            after,
            trigger = %trigger,
            "routing weight reduced"
        );
        self.push_record(MitigationRecord {
            trigger,
            action: MitigationAction::WeightChange { before, after },
            backend: backend.clone(),
            route,
            at: Instant::now(),
        });
    }

    /// At the weight floor there is nothing left to shed, so degrade
    /// the work itself
    fn escalate(&self, config: &AutopilotConfig, backend: &BackendId, route: Route, trigger: MitigationTrigger) {
        tracing::warn!(
            backend = %backend,
            route = %route,
            trigger = %trigger,
            "weight at floor, escalating mitigations"
        );

        let now = Instant::now();
        self.push_record(MitigationRecord {
            trigger,
            action: MitigationAction::ContextShortening {
                ratio: config.context_shortening_ratio,
            },
            backend: backend.clone(),
            route,
            at: now,
        });
        self.push_record(MitigationRecord {
            trigger,
            action: MitigationAction::ToolDisable,
            backend: backend.clone(),
            route,
            at: now,
        });

        // Stale serving only makes sense where a cache sits in the path
        if matches!(route, Route::Retrieval | Route::Cached) {
            self.push_record(MitigationRecord {
                trigger,
                action: MitigationAction::StaleCacheEnable {
                    ttl: Duration::from_secs(config.stale_cache_ttl_seconds),
                },
                backend: backend.clone(),
                route,
                at: now,
            });
        }
    }

    fn handle_recovery(&self, config: &AutopilotConfig, backend: &BackendId, route: Route, p95: f64) {
        let key = WeightKey {
            backend: backend.clone(),
            route,
        };
        let Some(mut state) = self.weights.get_mut(&key) else {
            return;
        };
        if state.weight >= 1.0 {
            return;
        }

        let delay = Duration::from_secs(config.recovery_delay_seconds);
        if state.last_adjustment.is_some_and(|at| at.elapsed() < delay) {
            return;
        }

        let before = state.weight;
        let after = (before * config.recovery_multiplier).min(1.0);
        state.weight = after;
        state.last_adjustment = Some(Instant::now());
        state.reason = format!("p95 {p95:.0}ms back under objective");
        drop(state);

        tracing::info!(
            backend = %backend,
            route = %route,
            before,
            after,
            "routing weight recovering"
        );
    }

    fn push_record(&self, record: MitigationRecord) {
        self.lock_mitigations().push(record);
    }

    fn prune_mitigations(&self) {
        self.lock_mitigations().retain(|r| r.at.elapsed() < RETENTION);
    }

    fn recovery_delay(&self) -> Duration {
        Duration::from_secs(
            self.config
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .recovery_delay_seconds,
        )
    }

    fn lock_mitigations(&self) -> std::sync::MutexGuard<'_, Vec<MitigationRecord>> {
        self.mitigations.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
