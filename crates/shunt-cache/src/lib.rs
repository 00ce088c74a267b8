//! Fingerprinted in-memory response cache
//!
//! Maps a SHA-256 fingerprint of the semantic request fields
//! (normalized prompt + backend + model + temperature + max tokens +
//! domain) to a previously computed response. Entries expire by
//! per-domain TTL and evict oldest-first at capacity. Only successful
//! responses are ever stored, and a stored entry is never mutated in
//! place.

#![allow(clippy::must_use_candidate)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use shunt_config::CacheConfig;
use shunt_core::{RouteRequest, RouteResponse};

/// Deterministic cache key over the semantically relevant request fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form hashed into the fingerprint
#[derive(Serialize)]
struct CanonicalRequest<'a> {
    prompt: String,
    backend: &'a str,
    model: &'a str,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    domain: &'a str,
}

/// Compute the fingerprint for a request
///
/// Semantically identical requests (same normalized prompt, backend,
/// model, temperature, max tokens, and domain) always hash to the same
/// key regardless of object identity.
pub fn fingerprint(request: &RouteRequest) -> Fingerprint {
    let canonical = CanonicalRequest {
        prompt: normalize_prompt(&request.prompt),
        backend: request.backend.as_str(),
        model: &request.model,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        domain: &request.domain,
    };
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    let hash = Sha256::digest(json.as_bytes());
    Fingerprint(format!("{hash:x}"))
}

/// Trim, collapse whitespace runs, and lowercase a prompt
fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// A stored response with its insertion metadata
#[derive(Debug, Clone)]
struct CacheEntry {
    response: RouteResponse,
    inserted_at: Instant,
    originating_cost: f64,
    domain: String,
}

/// Hit/miss accounting snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheMetrics {
    /// Total hits since start
    pub hits: u64,
    /// Total misses since start
    pub misses: u64,
    /// `hits / (hits + misses)`, 0.0 before any lookup
    pub hit_rate: f64,
    /// Live entry count
    pub entries: usize,
}

/// In-memory TTL response cache with hit-rate accounting
pub struct ResponseCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    config: RwLock<CacheConfig>,
}

impl ResponseCache {
    /// Create a cache from configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            config: RwLock::new(config),
        }
    }

    /// Replace the live configuration
    pub fn update_config(&self, config: CacheConfig) {
        *self.config.write().unwrap_or_else(std::sync::PoisonError::into_inner) = config;
    }

    /// Look up a cached response for a request
    ///
    /// Returns a copy flagged `cached = true` on hit. A disabled cache
    /// always misses, regardless of prior stores.
    pub fn get(&self, request: &RouteRequest) -> Option<RouteResponse> {
        self.get_with_stale(request, None)
    }

    /// Look up an entry that has expired by at most `max_stale`
    ///
    /// Used when the autopilot has enabled stale-while-revalidate
    /// serving for a route. Fresh entries also qualify.
    pub fn stale_get(&self, request: &RouteRequest, max_stale: Duration) -> Option<RouteResponse> {
        self.get_with_stale(request, Some(max_stale))
    }

    /// Look up a response, optionally accepting bounded staleness
    ///
    /// Every call counts exactly one hit or one miss, so the hit rate
    /// reflects lookups rather than internal probes.
    pub fn get_with_stale(&self, request: &RouteRequest, max_stale: Option<Duration>) -> Option<RouteResponse> {
        let (enabled, ttl) = {
            let config = self.config_read();
            (config.enabled, self.ttl_for(&config, &request.domain))
        };
        if !enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let allowed = max_stale.map_or(ttl, |stale| ttl + stale);
        let key = fingerprint(request);
        let entries = self.lock_entries();
        let hit = entries
            .get(&key)
            .filter(|entry| entry.inserted_at.elapsed() <= allowed)
            .map(|entry| entry.response.clone());
        drop(entries);

        if let Some(mut response) = hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint = %key, stale = max_stale.is_some(), "cache hit");
            response.cached = true;
            Some(response)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint = %key, "cache miss");
            None
        }
    }

    /// Store a successful response for a request
    ///
    /// No-op for failed responses and when the cache is disabled. An
    /// existing live entry is kept as-is (entries are immutable until
    /// expiry or eviction); at capacity the oldest entry is evicted.
    pub fn set(&self, request: &RouteRequest, response: &RouteResponse) {
        if !response.success {
            return;
        }
        let (enabled, capacity, ttl) = {
            let config = self.config_read();
            (config.enabled, config.capacity, self.ttl_for(&config, &request.domain))
        };
        if !enabled || capacity == 0 {
            return;
        }

        let key = fingerprint(request);
        let mut entries = self.lock_entries();

        if let Some(existing) = entries.get(&key) {
            if existing.inserted_at.elapsed() <= ttl {
                return;
            }
            entries.remove(&key);
        }

        if entries.len() >= capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(fingerprint = %oldest, "evicting oldest cache entry");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response: response.clone(),
                inserted_at: Instant::now(),
                originating_cost: response.cost,
                domain: request.domain.clone(),
            },
        );
    }

    /// Pre-populate the cache with synthetic request/response pairs
    pub fn warm_up(&self, pairs: &[(RouteRequest, RouteResponse)]) {
        for (request, response) in pairs {
            self.set(request, response);
        }
        tracing::info!(count = pairs.len(), "cache warm-up complete");
    }

    /// Drop entries past their domain TTL
    pub fn purge_expired(&self) {
        let config = self.config_read();
        let mut entries = self.lock_entries();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl_for(&config, &entry.domain));
    }

    /// Sum of originating costs of live entries (cost avoided on hits)
    pub fn stored_cost(&self) -> f64 {
        self.lock_entries().values().map(|e| e.originating_cost).sum()
    }

    /// Current hit/miss accounting
    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        CacheMetrics {
            hits,
            misses,
            hit_rate,
            entries: self.lock_entries().len(),
        }
    }

    /// Whether the observed hit rate meets the configured target
    pub fn is_performance_target(&self) -> bool {
        self.metrics().hit_rate >= self.config_read().hit_rate_target
    }

    fn ttl_for(&self, config: &CacheConfig, domain: &str) -> Duration {
        let seconds = config
            .domain_ttl_seconds
            .get(domain)
            .copied()
            .unwrap_or(config.default_ttl_seconds);
        Duration::from_secs(seconds)
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn config_read(&self) -> std::sync::RwLockReadGuard<'_, CacheConfig> {
        self.config.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shunt_core::{BackendId, Priority, Route};

    fn request(prompt: &str) -> RouteRequest {
        RouteRequest {
            prompt: prompt.to_owned(),
            backend: BackendId::from("direct-model"),
            model: "gpt-4o-mini".to_owned(),
            temperature: Some(0.0),
            max_tokens: Some(128),
            domain: "general".to_owned(),
            intent: "chat".to_owned(),
            route: Route::Generation,
            priority: Priority::Normal,
        }
    }

    fn response(content: &str, success: bool) -> RouteResponse {
        RouteResponse {
            content: content.to_owned(),
            backend: BackendId::from("direct-model"),
            model: "gpt-4o-mini".to_owned(),
            latency_ms: 120.0,
            cost: 0.002,
            success,
            cached: false,
        }
    }

    #[test]
    fn fingerprint_ignores_object_identity() {
        let a = request("What is Rust?");
        let b = request("What is Rust?");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_normalizes_whitespace_and_case() {
        let a = request("  What   is\tRust? ");
        let b = request("what is rust?");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_per_semantic_field() {
        let base = request("hello");

        let mut other = request("hello");
        other.model = "gpt-4o".to_owned();
        assert_ne!(fingerprint(&base), fingerprint(&other));

        let mut other = request("hello");
        other.backend = BackendId::from("tool-router");
        assert_ne!(fingerprint(&base), fingerprint(&other));

        let mut other = request("hello");
        other.temperature = Some(0.7);
        assert_ne!(fingerprint(&base), fingerprint(&other));

        let mut other = request("hello");
        other.max_tokens = Some(999);
        assert_ne!(fingerprint(&base), fingerprint(&other));

        let mut other = request("hello");
        other.domain = "support".to_owned();
        assert_ne!(fingerprint(&base), fingerprint(&other));
    }

    #[test]
    fn round_trip_hit_with_distinct_object() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set(&request("hello"), &response("hi there", true));

        let hit = cache.get(&request("hello")).unwrap();
        assert!(hit.cached);
        assert_eq!(hit.content, "hi there");
    }

    #[test]
    fn repeated_get_is_idempotent() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set(&request("hello"), &response("hi there", true));

        let first = cache.get(&request("hello")).unwrap();
        let second = cache.get(&request("hello")).unwrap();
        assert_eq!(first, second);
        assert!(first.cached && second.cached);
    }

    #[test]
    fn failed_responses_never_cached() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set(&request("hello"), &response("boom", false));
        assert!(cache.get(&request("hello")).is_none());
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = ResponseCache::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        cache.set(&request("hello"), &response("hi", true));
        assert!(cache.get(&request("hello")).is_none());
        assert!(cache.get(&request("hello")).is_none());
    }

    #[test]
    fn hit_rate_accounting() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set(&request("hello"), &response("hi", true));

        for _ in 0..10 {
            assert!(cache.get(&request("hello")).is_some());
        }
        assert!(cache.get(&request("other")).is_none());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 10);
        assert_eq!(metrics.misses, 1);
        assert!(metrics.hit_rate > 0.8);
        assert!(cache.is_performance_target());
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = ResponseCache::new(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        cache.set(&request("first"), &response("1", true));
        std::thread::sleep(Duration::from_millis(5));
        cache.set(&request("second"), &response("2", true));
        std::thread::sleep(Duration::from_millis(5));
        cache.set(&request("third"), &response("3", true));

        assert!(cache.get(&request("first")).is_none());
        assert!(cache.get(&request("second")).is_some());
        assert!(cache.get(&request("third")).is_some());
    }

    #[test]
    fn domain_ttl_override_applies() {
        let cache = ResponseCache::new(CacheConfig {
            domain_ttl_seconds: [("support".to_owned(), 0)].into_iter().collect(),
            ..CacheConfig::default()
        });

        let mut req = request("ticket status");
        req.domain = "support".to_owned();
        cache.set(&req, &response("resolved", true));

        std::thread::sleep(Duration::from_millis(5));
        // Zero-second TTL for the support domain: already invisible
        assert!(cache.get(&req).is_none());
        // The general domain still uses the long default TTL
        cache.set(&request("hello"), &response("hi", true));
        assert!(cache.get(&request("hello")).is_some());
    }

    #[test]
    fn stale_get_serves_recently_expired() {
        let cache = ResponseCache::new(CacheConfig {
            domain_ttl_seconds: [("support".to_owned(), 0)].into_iter().collect(),
            ..CacheConfig::default()
        });

        let mut req = request("ticket status");
        req.domain = "support".to_owned();
        cache.set(&req, &response("resolved", true));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get(&req).is_none());
        let stale = cache.stale_get(&req, Duration::from_secs(60)).unwrap();
        assert!(stale.cached);
        assert_eq!(stale.content, "resolved");
        // Outside the stale bound the entry stays invisible
        assert!(cache.stale_get(&req, Duration::ZERO).is_none());
    }

    #[test]
    fn stale_lookup_counts_exactly_once() {
        let cache = ResponseCache::new(CacheConfig {
            default_ttl_seconds: 0,
            ..CacheConfig::default()
        });
        cache.set(&request("hello"), &response("hi", true));
        std::thread::sleep(Duration::from_millis(5));

        // One stale hit and one stale miss: one counter tick each
        assert!(cache.get_with_stale(&request("hello"), Some(Duration::from_secs(60))).is_some());
        assert!(cache.get_with_stale(&request("other"), Some(Duration::from_secs(60))).is_none());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn live_entries_are_not_overwritten() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set(&request("hello"), &response("first", true));
        cache.set(&request("hello"), &response("second", true));

        let hit = cache.get(&request("hello")).unwrap();
        assert_eq!(hit.content, "first");
    }

    #[test]
    fn warm_up_prepopulates() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.warm_up(&[
            (request("a"), response("ra", true)),
            (request("b"), response("rb", true)),
        ]);
        assert!(cache.get(&request("a")).is_some());
        assert!(cache.get(&request("b")).is_some());
        assert_eq!(cache.metrics().entries, 2);
    }

    #[test]
    fn purge_expired_drops_dead_entries() {
        let cache = ResponseCache::new(CacheConfig {
            default_ttl_seconds: 0,
            ..CacheConfig::default()
        });
        cache.set(&request("hello"), &response("hi", true));
        std::thread::sleep(Duration::from_millis(5));

        cache.purge_expired();
        assert_eq!(cache.metrics().entries, 0);
    }
}
