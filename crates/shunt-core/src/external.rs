//! Interfaces implemented by external collaborators
//!
//! The control plane never invokes a backend or probes health itself;
//! it consumes these traits and only sees the resulting
//! success/failure/latency triples.

use std::collections::HashSet;

use crate::{
    BackendId, BreakerState,
    error::{InvokeError, ProbeError},
    request::RouteRequest,
};

/// Result of a successful backend invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Generated content
    pub content: String,
    /// Observed latency in milliseconds
    pub latency_ms: f64,
    /// Actual cost charged for the request
    pub cost: f64,
}

/// Invocation client for one backend kind
#[async_trait::async_trait]
pub trait BackendClient: Send + Sync {
    /// Invoke the backend for a request
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError`] on backend or transport failure; the
    /// caller records it as a failed sample, never re-throws it to
    /// unrelated requests.
    async fn invoke(&self, request: &RouteRequest) -> Result<Invocation, InvokeError>;
}

/// Snapshot returned by a backend health probe
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Whether the backend is currently serving
    pub healthy: bool,
    /// Probe round-trip latency in milliseconds
    pub latency_ms: f64,
    /// Consecutive failed probes observed by the prober
    pub consecutive_failures: u32,
    /// Circuit-breaker state for the backend
    pub breaker: BreakerState,
}

/// External health probe for a backend
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the backend's health
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the probe itself fails; the
    /// aggregator treats that as an unhealthy report.
    async fn health_check(&self, backend: &BackendId) -> Result<ProbeReport, ProbeError>;
}

/// Process-wide feature flag reader
pub trait FeatureFlags: Send + Sync {
    /// Whether a named flag is enabled
    fn is_enabled(&self, flag: &str) -> bool;
}

/// Flag gating the cost-aware routing layer
pub const FLAG_COST_OPTIMIZATION: &str = "cost-optimization";

/// Flag gating the background drift/analysis loops
pub const FLAG_CONTINUOUS_MONITORING: &str = "continuous-monitoring";

/// Fixed in-memory flag set, for hosts without a flag service
#[derive(Debug, Default)]
pub struct StaticFlags {
    enabled: HashSet<String>,
}

impl StaticFlags {
    /// Build a flag set with the given flags enabled
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: flags.into_iter().map(Into::into).collect(),
        }
    }

    /// Flag set with every control-plane flag enabled
    pub fn all_enabled() -> Self {
        Self::new([FLAG_COST_OPTIMIZATION, FLAG_CONTINUOUS_MONITORING])
    }
}

impl FeatureFlags for StaticFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_flags_lookup() {
        let flags = StaticFlags::new([FLAG_COST_OPTIMIZATION]);
        assert!(flags.is_enabled(FLAG_COST_OPTIMIZATION));
        assert!(!flags.is_enabled(FLAG_CONTINUOUS_MONITORING));
        assert!(!flags.is_enabled("unknown-flag"));
    }

    #[test]
    fn all_enabled_covers_both() {
        let flags = StaticFlags::all_enabled();
        assert!(flags.is_enabled(FLAG_COST_OPTIMIZATION));
        assert!(flags.is_enabled(FLAG_CONTINUOUS_MONITORING));
    }
}
