//! Shared application state injected into every handler.

use std::sync::Arc;

use entitydb_engine::Repository;
use entitydb_metrics::{MetricsCollector, MetricsQueue};
use entitydb_rbac::SessionStore;

use crate::config::ApiConfig;

/// Everything a handler needs: the repository, the session map, the
/// metrics collector and its producer-facing queue, and API config.
/// Cheaply `Clone`, so it can be handed to `axum::Router::with_state`
/// directly.
#[derive(Clone)]
pub struct AppState {
    /// The single store every handler reads and writes through.
    pub repo: Arc<Repository>,
    /// Session lifecycle (mint, lookup, refresh, invalidate).
    pub sessions: Arc<SessionStore>,
    /// Counters/gauges/histograms and their Prometheus rendering.
    pub metrics: Arc<MetricsCollector>,
    /// Producer handle request handlers push metric events through,
    /// rather than calling `metrics` directly, so a slow write never
    /// blocks the request path.
    pub metrics_queue: MetricsQueue,
    /// API-level settings (bind address, body limits, session TTL).
    pub config: ApiConfig,
}
