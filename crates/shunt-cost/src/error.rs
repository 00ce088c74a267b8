//! Cost-routing error types

use thiserror::Error;

/// Errors that can occur during cost-aware routing
#[derive(Debug, Error)]
pub enum CostRoutingError {
    /// The structurally eligible backend set was empty
    #[error("no eligible backend candidates for routing")]
    NoCandidates,
}
