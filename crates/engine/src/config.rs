//! Engine configuration
//!
//! Mirrors the teacher's `strata.toml`-backed `StrataConfig`: defaults
//! baked in, overridable from a config file, with an eager validation step
//! at load time rather than failing lazily the first time a bad value is
//! used.

use entitydb_core::Error;
use entitydb_durability::wal::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_chunk_threshold_bytes() -> usize {
    1024 * 1024
}
fn default_chunk_size_bytes() -> usize {
    1024 * 1024
}
fn default_wal_warn_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_wal_critical_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_reassemble_concurrency() -> usize {
    entitydb_storage::chunking::DEFAULT_REASSEMBLE_CONCURRENCY
}
fn default_durability() -> String {
    "batched".to_string()
}

/// Engine-level configuration: storage paths, chunking thresholds, WAL
/// backpressure thresholds and the durability/fsync policy. Deserialized as
/// the `[storage]` table of the top-level `entitydb.toml` (see the root
/// `Config` in the `entitydb` binary crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding `data.ebf` and `wal.log`.
    pub data_path: PathBuf,
    /// Content over this size is split into chunk children (spec §4.5).
    #[serde(default = "default_chunk_threshold_bytes")]
    pub chunk_threshold_bytes: usize,
    /// Size of each chunk child's content.
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,
    /// WAL size at which a `wal_warning` gauge is published.
    #[serde(default = "default_wal_warn_bytes")]
    pub wal_warn_bytes: u64,
    /// WAL size at which a `wal_critical` gauge is published.
    #[serde(default = "default_wal_critical_bytes")]
    pub wal_critical_bytes: u64,
    /// Bound on concurrent chunk fetches during reassembly.
    #[serde(default = "default_reassemble_concurrency")]
    pub reassemble_concurrency: usize,
    /// `"strict"`, `"batched"`, or `"async"` (see `DurabilityMode`).
    #[serde(default = "default_durability")]
    pub durability: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_path: PathBuf::from("./data"),
            chunk_threshold_bytes: default_chunk_threshold_bytes(),
            chunk_size_bytes: default_chunk_size_bytes(),
            wal_warn_bytes: default_wal_warn_bytes(),
            wal_critical_bytes: default_wal_critical_bytes(),
            reassemble_concurrency: default_reassemble_concurrency(),
            durability: default_durability(),
        }
    }
}

impl EngineConfig {
    /// EBF file path under `data_path`.
    pub fn ebf_path(&self) -> PathBuf {
        self.data_path.join("data.ebf")
    }

    /// WAL file path under `data_path`.
    pub fn wal_path(&self) -> PathBuf {
        self.data_path.join("wal.log")
    }

    /// Parse `durability` into a [`DurabilityMode`].
    pub fn durability_mode(&self) -> Result<DurabilityMode, Error> {
        match self.durability.as_str() {
            "strict" => Ok(DurabilityMode::Strict),
            "batched" => Ok(DurabilityMode::default()),
            "async" => Ok(DurabilityMode::Async { interval_ms: 100 }),
            other => Err(Error::InvalidInput(format!(
                "invalid durability mode '{other}', expected strict|batched|async"
            ))),
        }
    }

    /// Load from a TOML file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| Error::InvalidInput(format!("invalid engine config: {e}")))?;
        config.durability_mode()?;
        Ok(config)
    }
}
