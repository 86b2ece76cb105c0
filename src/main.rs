//! EntityDB: a single-node, tagged, temporal, content-addressed entity
//! store with RBAC sessions and a metrics subsystem, exposed over HTTP
//! (spec §1, §6).

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use entitydb_api::{build_router, AppState};
use entitydb_core::{EntityId, Tag, Timestamp};
use entitydb_engine::Repository;
use entitydb_metrics::{queue, MetricsCollector, MetricsQueue};
use entitydb_rbac::SessionStore;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("ENTITYDB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("entitydb.toml"));
    let config = Config::load_or_default(&config_path).context("loading entitydb.toml")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .init();

    std::fs::create_dir_all(&config.storage.data_path).context("creating data directory")?;
    let repo = Arc::new(Repository::open(config.storage.clone()).context("opening repository")?);
    tracing::info!(entities = repo.entity_count(), "repository opened");

    seed_on_first_boot(&repo).context("seeding first-boot data")?;

    let sessions = Arc::new(SessionStore::new(config.http.session_ttl_secs));
    let metrics = Arc::new(MetricsCollector::new(
        repo.clone(),
        config.metrics.retention_count,
        config.metrics.retention_period_secs,
    ));
    let (metrics_queue, metrics_rx) = MetricsQueue::new(config.http.metrics_queue_capacity);

    let consumer_metrics = metrics.clone();
    let prune_interval = Duration::from_secs(config.http.metrics_prune_interval_secs);
    tokio::spawn(async move {
        queue::run(consumer_metrics, metrics_rx, prune_interval).await;
    });

    let state = AppState {
        repo: repo.clone(),
        sessions,
        metrics,
        metrics_queue,
        config: config.http.clone(),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.http.bind_address)
        .await
        .with_context(|| format!("binding {}", config.http.bind_address))?;
    tracing::info!(address = %config.http.bind_address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("shutdown signal received, repository flushed on drop");
    Ok(())
}

/// Waits for SIGINT (Ctrl-C) or, on Unix, SIGTERM, so in-flight writes can
/// complete and the WAL/EBF are left in a clean state before the process
/// exits (spec §6 "graceful shutdown").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// On an empty store, create the built-in admin user (spec §11: `admin`
/// user with `rbac:role:admin`, password `admin`) so the first login
/// scenario works without an operator pre-seeding anything.
fn seed_on_first_boot(repo: &Repository) -> Result<(), entitydb_core::Error> {
    if !repo.list_by_tag("type:user", false)?.is_empty() {
        return Ok(());
    }

    tracing::warn!("no users found, seeding default admin account (username=admin, password=admin)");
    let now = Timestamp::now();
    let password_hash = entitydb_rbac::hash_password(ADMIN_PASSWORD)?;
    repo.create_with_id(
        EntityId::from("user:admin"),
        vec![
            Tag::new(now, "type:user")?,
            Tag::new(now, "dataset:system")?,
            Tag::new(now, &format!("username:{ADMIN_USERNAME}"))?,
            Tag::new(now, &format!("password_hash:{password_hash}"))?,
            Tag::new(now, "rbac:role:admin")?,
        ],
        Vec::new(),
    )?;
    Ok(())
}
