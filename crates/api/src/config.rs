//! API-level configuration (spec §6): the bits of `[http]` the engine and
//! rbac/metrics crates don't already own.

use serde::{Deserialize, Serialize};

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_max_request_body_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_session_ttl_secs() -> i64 {
    3600
}
fn default_metrics_queue_capacity() -> usize {
    1000
}
fn default_metrics_prune_interval_secs() -> u64 {
    300
}

/// HTTP-facing configuration, the `[http]` table of the top-level
/// `entitydb.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address the HTTP listener binds.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Request bodies over this size are rejected with 413 before they
    /// reach a handler (`tower_http::limit::RequestBodyLimitLayer`).
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    /// Session lifetime, seconds, from mint or refresh.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,
    /// Whether a successful authenticated read also refreshes the caller's
    /// session expiry (spec §4.9 "active -> refreshed on read").
    #[serde(default)]
    pub session_refresh_on_read: bool,
    /// Bound on the async metrics queue (spec §4.7).
    #[serde(default = "default_metrics_queue_capacity")]
    pub metrics_queue_capacity: usize,
    /// How often the background consumer sweeps metric retention,
    /// independent of queue activity (spec §12.4 decision).
    #[serde(default = "default_metrics_prune_interval_secs")]
    pub metrics_prune_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            bind_address: default_bind_address(),
            max_request_body_bytes: default_max_request_body_bytes(),
            session_ttl_secs: default_session_ttl_secs(),
            session_refresh_on_read: false,
            metrics_queue_capacity: default_metrics_queue_capacity(),
            metrics_prune_interval_secs: default_metrics_prune_interval_secs(),
        }
    }
}
