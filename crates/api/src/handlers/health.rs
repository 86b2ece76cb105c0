//! `GET /health` (spec §11): entity count, WAL size, durability mode and
//! the `IntegrityMetrics` (spec §4.8) health score, reindexed and verified
//! live against the EBF on every call.

use axum::extract::State;
use axum::Json;

use crate::dto::HealthResponse;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let config = state.repo.config();
    let wal_size = state.repo.wal_size_bytes();
    let metrics = state.repo.integrity_metrics().map_err(ApiError::from)?;
    let health_score = metrics.health_score();

    let status = if wal_size >= config.wal_critical_bytes || !metrics.index_healthy || metrics.corrupted_count > 0 {
        "unhealthy"
    } else if wal_size >= config.wal_warn_bytes || metrics.orphan_count > 0 {
        "degraded"
    } else {
        "healthy"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        entity_count: metrics.total_entities,
        wal_size_bytes: wal_size,
        durability_mode: config.durability.clone(),
        last_checkpoint_lsn: metrics.last_checkpoint_lsn,
        index_healthy: metrics.index_healthy,
        orphan_count: metrics.orphan_count,
        health_score,
    }))
}
