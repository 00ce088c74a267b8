//! Sliding-window latency percentile estimation
//!
//! Records per-request latencies into (route, backend, intent) buckets
//! and answers p50/p95/p99 queries over a bounded time window using the
//! nearest-rank method. In-memory only; nothing persists.

#![allow(clippy::must_use_candidate)]

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use shunt_config::MetricsConfig;
use shunt_core::{BackendId, Route};

/// Latency bucket identity; compared structurally, never by string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Logical route
    pub route: Route,
    /// Serving backend
    pub backend: BackendId,
    /// Caller-supplied intent tag
    pub intent: String,
}

impl BucketKey {
    /// Convenience constructor
    pub fn new(route: Route, backend: impl Into<BackendId>, intent: impl Into<String>) -> Self {
        Self {
            route,
            backend: backend.into(),
            intent: intent.into(),
        }
    }
}

impl std::fmt::Display for BucketKey {
    // Log representation only; lookups always use the struct
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.route, self.backend, self.intent)
    }
}

/// A single timestamped latency observation
#[derive(Debug, Clone, Copy)]
struct Sample {
    latency_ms: f64,
    at: Instant,
}

/// Percentile query result for one bucket or (backend, route) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSnapshot {
    /// 50th percentile (median) in milliseconds
    pub p50: f64,
    /// 95th percentile in milliseconds
    pub p95: f64,
    /// 99th percentile in milliseconds
    pub p99: f64,
    /// Samples inside the live window
    pub count: usize,
    /// Start of the queried window; `None` when the window is empty
    pub window_start: Option<Instant>,
    /// End of the queried window; `None` when the window is empty
    pub window_end: Option<Instant>,
}

impl PercentileSnapshot {
    const fn empty() -> Self {
        Self {
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            count: 0,
            window_start: None,
            window_end: None,
        }
    }
}

/// Bucketed sliding-window percentile estimator
///
/// `record` is O(1) amortized; queries filter to the live window,
/// sort, and index by nearest rank. Concurrent writers to the same
/// bucket interleave without a defined total order, so results are
/// approximate under load by design.
pub struct PercentileEstimator {
    buckets: DashMap<BucketKey, VecDeque<Sample>>,
    window: Duration,
    max_samples: usize,
}

impl PercentileEstimator {
    /// Create an estimator from configuration
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            window: Duration::from_secs(config.window_seconds),
            max_samples: config.max_samples_per_bucket,
        }
    }

    /// Record a latency sample for a bucket
    pub fn record(&self, key: &BucketKey, latency_ms: f64) {
        self.record_at(key, latency_ms, Instant::now());
    }

    fn record_at(&self, key: &BucketKey, latency_ms: f64, at: Instant) {
        let mut bucket = self.buckets.entry(key.clone()).or_default();

        // Opportunistic purge: samples are appended in time order, so
        // expired entries cluster at the front
        let cutoff = at.checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            while bucket.front().is_some_and(|s| s.at < cutoff) {
                bucket.pop_front();
            }
        }

        if bucket.len() >= self.max_samples {
            bucket.pop_front();
        }
        bucket.push_back(Sample { latency_ms, at });
    }

    /// Percentiles for one exact bucket
    ///
    /// Returns an all-zero snapshot with `count == 0` when the bucket
    /// is missing or holds no live samples; never errors.
    pub fn percentiles(&self, key: &BucketKey) -> PercentileSnapshot {
        let Some(bucket) = self.buckets.get(key) else {
            return PercentileSnapshot::empty();
        };
        let live = self.live_latencies(&bucket);
        drop(bucket);
        Self::snapshot_from(live, self.window)
    }

    /// Percentiles merged across all intents for one (backend, route) pair
    ///
    /// This is the view the autopilot drift check consumes.
    pub fn route_backend_percentiles(&self, route: Route, backend: &BackendId) -> PercentileSnapshot {
        let mut live = Vec::new();
        for entry in &self.buckets {
            if entry.key().route == route && entry.key().backend == *backend {
                live.extend(self.live_latencies(entry.value()));
            }
        }
        Self::snapshot_from(live, self.window)
    }

    /// Distinct (backend, route) pairs currently holding samples
    pub fn tracked_pairs(&self) -> Vec<(BackendId, Route)> {
        let mut pairs: Vec<(BackendId, Route)> = self
            .buckets
            .iter()
            .map(|entry| (entry.key().backend.clone(), entry.key().route))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    /// Remove stale samples and drop empty buckets
    ///
    /// Driven periodically by the monitor loop; writes also purge
    /// opportunistically, so this only bounds idle buckets.
    pub fn sweep(&self) {
        let cutoff = Instant::now().checked_sub(self.window);
        let Some(cutoff) = cutoff else { return };

        self.buckets.retain(|key, bucket| {
            while bucket.front().is_some_and(|s| s.at < cutoff) {
                bucket.pop_front();
            }
            if bucket.is_empty() {
                tracing::debug!(bucket = %key, "dropping empty latency bucket");
                false
            } else {
                true
            }
        });
    }

    /// Number of buckets currently tracked
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn live_latencies(&self, bucket: &VecDeque<Sample>) -> Vec<f64> {
        let cutoff = Instant::now().checked_sub(self.window);
        bucket
            .iter()
            .filter(|s| cutoff.is_none_or(|c| s.at >= c))
            .map(|s| s.latency_ms)
            .collect()
    }

    fn snapshot_from(mut live: Vec<f64>, window: Duration) -> PercentileSnapshot {
        if live.is_empty() {
            return PercentileSnapshot::empty();
        }
        live.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let now = Instant::now();
        PercentileSnapshot {
            p50: nearest_rank(&live, 0.50),
            p95: nearest_rank(&live, 0.95),
            p99: nearest_rank(&live, 0.99),
            count: live.len(),
            window_start: now.checked_sub(window),
            window_end: Some(now),
        }
    }
}

/// Nearest-rank percentile: index `ceil(n * q) - 1` into sorted values
fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = (n as f64 * q).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}
