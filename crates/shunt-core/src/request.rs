//! Typed request and response shapes
//!
//! Closed structs validated at the boundary, replacing dynamic
//! payload inspection in routing logic.

use serde::{Deserialize, Serialize};

use crate::{BackendId, Route, error::InputError};

/// Request priority; emergency and critical bypass cost optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Priority {
    Normal,
    High,
    Emergency,
    Critical,
}

impl Priority {
    /// Whether this priority forces the fastest path regardless of cost
    pub const fn bypasses_cost_optimization(self) -> bool {
        matches!(self, Self::Emergency | Self::Critical)
    }
}

/// An inbound generation request as seen by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Raw prompt text
    pub prompt: String,
    /// Preferred backend (the base router's structural choice)
    pub backend: BackendId,
    /// Model identifier
    pub model: String,
    /// Sampling temperature, if set
    pub temperature: Option<f64>,
    /// Output token cap, if set
    pub max_tokens: Option<u32>,
    /// Application domain (drives cache TTL overrides)
    pub domain: String,
    /// Intent tag for latency bucketing
    pub intent: String,
    /// Logical route
    pub route: Route,
    /// Request priority
    pub priority: Priority,
}

impl RouteRequest {
    /// Check that the fields routing depends on are present
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] naming the first missing field. No state
    /// is mutated on rejection.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.prompt.trim().is_empty() {
            return Err(InputError::MissingField { field: "prompt" });
        }
        if self.backend.as_str().is_empty() {
            return Err(InputError::MissingField { field: "backend" });
        }
        if self.model.is_empty() {
            return Err(InputError::MissingField { field: "model" });
        }
        Ok(())
    }
}

/// A completed response flowing back through the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Generated content (empty on failure)
    pub content: String,
    /// Backend that served (or failed) the request
    pub backend: BackendId,
    /// Model that produced the response
    pub model: String,
    /// Observed latency in milliseconds
    pub latency_ms: f64,
    /// Actual cost of the invocation
    pub cost: f64,
    /// Whether the invocation succeeded
    pub success: bool,
    /// Whether this response was served from cache
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RouteRequest {
        RouteRequest {
            prompt: "summarize this".to_owned(),
            backend: BackendId::from("direct-model"),
            model: "gpt-4o-mini".to_owned(),
            temperature: Some(0.0),
            max_tokens: Some(256),
            domain: "general".to_owned(),
            intent: "summarize".to_owned(),
            route: Route::Generation,
            priority: Priority::Normal,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn blank_prompt_rejected() {
        let mut req = request();
        req.prompt = "   ".to_owned();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, InputError::MissingField { field: "prompt" }));
    }

    #[test]
    fn empty_backend_rejected() {
        let mut req = request();
        req.backend = BackendId(String::new());
        assert!(req.validate().is_err());
    }

    #[test]
    fn emergency_bypasses_cost() {
        assert!(Priority::Emergency.bypasses_cost_optimization());
        assert!(Priority::Critical.bypasses_cost_optimization());
        assert!(!Priority::Normal.bypasses_cost_optimization());
        assert!(!Priority::High.bypasses_cost_optimization());
    }
}
