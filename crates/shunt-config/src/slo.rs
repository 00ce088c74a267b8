use serde::Deserialize;
use shunt_core::Route;

/// Per-route p95 latency objectives in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SloConfig {
    /// Objective for the generation route
    #[serde(default = "default_generation_p95_ms")]
    pub generation_p95_ms: f64,
    /// Objective for the retrieval-augmented route
    #[serde(default = "default_fast_route_p95_ms")]
    pub retrieval_p95_ms: f64,
    /// Objective for the cached route
    #[serde(default = "default_fast_route_p95_ms")]
    pub cached_p95_ms: f64,
}

impl SloConfig {
    /// The p95 objective for a route
    pub const fn threshold_for(&self, route: Route) -> f64 {
        match route {
            Route::Generation => self.generation_p95_ms,
            Route::Retrieval => self.retrieval_p95_ms,
            Route::Cached => self.cached_p95_ms,
        }
    }
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            generation_p95_ms: default_generation_p95_ms(),
            retrieval_p95_ms: default_fast_route_p95_ms(),
            cached_p95_ms: default_fast_route_p95_ms(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_generation_p95_ms() -> f64 {
    1500.0
}

#[allow(clippy::missing_const_for_fn)]
fn default_fast_route_p95_ms() -> f64 {
    300.0
}
