//! Mitigation action records
//!
//! Append-only event log of autopilot interventions, pruned to a
//! 24-hour retention window. The router and cache read recent records
//! to decide whether to shorten context, skip optional tools, or serve
//! stale cache entries.

use std::time::{Duration, Instant};

use shunt_core::{BackendId, Route};

/// What prompted an autopilot action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MitigationTrigger {
    /// Sustained p95 SLO violation detected by the drift check
    P95Drift,
    /// External alert forwarded into the autopilot
    Alert,
    /// Circuit breaker opened for the backend
    Breaker,
}

impl std::fmt::Display for MitigationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::P95Drift => "p95_drift",
            Self::Alert => "alert",
            Self::Breaker => "breaker",
        })
    }
}

/// The corrective action taken
#[derive(Debug, Clone, PartialEq)]
pub enum MitigationAction {
    /// Routing weight adjusted
    WeightChange {
        /// Weight before the adjustment
        before: f64,
        /// Weight after the adjustment
        after: f64,
    },
    /// Context shortening enabled at the given ratio (< 1.0)
    ContextShortening {
        /// Fraction of the original context to keep
        ratio: f64,
    },
    /// Non-essential tool calls disabled
    ToolDisable,
    /// Stale-while-revalidate serving enabled for a bounded TTL
    StaleCacheEnable {
        /// How far past expiry entries may be served
        ttl: Duration,
    },
}

/// One autopilot action event
#[derive(Debug, Clone)]
pub struct MitigationRecord {
    /// What prompted the action
    pub trigger: MitigationTrigger,
    /// The action taken
    pub action: MitigationAction,
    /// Affected backend
    pub backend: BackendId,
    /// Affected route
    pub route: Route,
    /// When the action was taken
    pub at: Instant,
}

impl MitigationRecord {
    /// Whether this record applies to a (backend, route) pair and is
    /// newer than the given age
    pub fn applies(&self, backend: &BackendId, route: Route, max_age: Duration) -> bool {
        self.backend == *backend && self.route == route && self.at.elapsed() < max_age
    }
}
