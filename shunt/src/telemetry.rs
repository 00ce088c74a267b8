//! Tracing initialization for host processes
//!
//! The control plane only emits `tracing` events; the host decides how
//! they are collected. This helper covers the common case.

use tracing_subscriber::EnvFilter;

/// Install a formatted stdout subscriber honoring `RUST_LOG`
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().ok();
}
