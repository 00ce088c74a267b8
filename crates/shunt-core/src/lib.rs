//! Shared domain types for the Shunt routing control plane
//!
//! Routes, backend identity, typed request/response shapes, and the
//! traits implemented by external collaborators (invocation clients,
//! health probes, feature flags).

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod external;
pub mod request;

use serde::{Deserialize, Serialize};

pub use error::{InputError, InvokeError, ProbeError};
pub use external::{
    BackendClient, FLAG_CONTINUOUS_MONITORING, FLAG_COST_OPTIMIZATION, FeatureFlags, HealthProbe, Invocation,
    ProbeReport, StaticFlags,
};
pub use request::{Priority, RouteRequest, RouteResponse};

/// Logical request category with its own latency objective
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Route {
    /// Plain generation against a model endpoint
    Generation,
    /// Retrieval-augmented generation
    Retrieval,
    /// Served from (or destined for) the response cache
    Cached,
}

/// Identifier for a concrete AI-serving path
///
/// Compared structurally everywhere; the string form is for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(pub String);

impl BackendId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for BackendId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The kind of serving path behind a backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BackendKind {
    /// Managed low-level model endpoint, invoked directly
    DirectModel,
    /// Intermediary layer that routes through tool calls
    ToolRouter,
}

/// Circuit-breaker state reported by health probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BreakerState {
    /// Healthy, requests allowed
    Closed,
    /// Tripped, requests suppressed until cooldown
    Open,
    /// Cooldown expired, probing recovery
    HalfOpen,
}
