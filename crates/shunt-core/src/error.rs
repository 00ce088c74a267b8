//! Error taxonomy shared across the control plane
//!
//! Only [`InputError`] propagates to the immediate caller; upstream
//! failures are converted into health and percentile signals at the
//! boundary where they occur.

use thiserror::Error;

/// Malformed request, rejected before any state is touched
#[derive(Debug, Error)]
pub enum InputError {
    /// A field routing depends on is missing or empty
    #[error("missing required routing field: {field}")]
    MissingField { field: &'static str },
}

/// A backend invocation failed
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The backend returned an error response
    #[error("backend error: {0}")]
    Backend(String),
    /// The invocation client timed out or lost the connection
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A health probe failed to complete
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe could not reach the backend
    #[error("probe unreachable: {0}")]
    Unreachable(String),
    /// The probe returned an unusable payload
    #[error("probe malformed: {0}")]
    Malformed(String),
}
