//! Cost-aware routing for the Shunt control plane
//!
//! Per-backend cost profiles with time-of-day multipliers, plus a
//! router that scores structurally eligible backends under four
//! configurable strategies. Emergency-priority requests bypass cost
//! optimization unconditionally.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod profile;
pub mod router;

pub use error::CostRoutingError;
pub use profile::{CostProfileStore, RouteCostProfile};
pub use router::{BackendCandidate, CostAwareRouter, CostDecision, DecisionReason, OptimizationMetrics};
