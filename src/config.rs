//! Top-level configuration (spec §6): the `entitydb.toml` that wires
//! storage, HTTP and metrics defaults together. Mirrors the teacher's
//! layered `[storage]`/`[http]` tables with an eager validation pass.

use entitydb_api::ApiConfig;
use entitydb_core::Error;
use entitydb_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_metrics_retention_count() -> usize {
    100
}
fn default_metrics_retention_period_secs() -> i64 {
    7 * 24 * 60 * 60
}
fn default_log_filter() -> String {
    "info,entitydb=debug".to_string()
}

/// Default retention applied to a metric entity when its own
/// `retention:count`/`retention:period:` tags are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Default max observation/value tags kept per metric.
    #[serde(default = "default_metrics_retention_count")]
    pub retention_count: usize,
    /// Default max age, seconds, for a metric's value/observation tags.
    #[serde(default = "default_metrics_retention_period_secs")]
    pub retention_period_secs: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            retention_count: default_metrics_retention_count(),
            retention_period_secs: default_metrics_retention_period_secs(),
        }
    }
}

/// The full `entitydb.toml`: `[storage]`, `[http]`, `[metrics]`, plus the
/// `tracing_subscriber::EnvFilter` directive to fall back to when `RUST_LOG`
/// is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// EBF/WAL paths, chunking thresholds, durability mode.
    #[serde(default)]
    pub storage: EngineConfig,
    /// Bind address, body limits, session TTL, metrics queue sizing.
    #[serde(default)]
    pub http: ApiConfig,
    /// Default metric retention, overridable per-metric via its own tags.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is
    /// unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: EngineConfig::default(),
            http: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults for any missing table or
    /// field, then validate eagerly (spec §6: "fail at startup, not on
    /// first use").
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| Error::InvalidInput(format!("invalid config: {e}")))?;
        config.storage.durability_mode()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    /// entirely (first boot with no config file present).
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Config::default())
        }
    }
}
