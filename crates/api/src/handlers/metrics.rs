//! `/metrics` and `/api/v1/metrics/history` (spec §4.6, §6).

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::dto::{MetricsHistoryQuery, MetricsHistoryResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /metrics`: Prometheus text exposition, unauthenticated like any
/// scrape endpoint.
pub async fn scrape(State(state): State<AppState>) -> Result<Response, ApiError> {
    let text = entitydb_metrics::render_prometheus(state.metrics.repo()).map_err(ApiError::from)?;
    Ok(([("content-type", "text/plain; version=0.0.4")], text).into_response())
}

/// `GET /api/v1/metrics/history`: a counter's rate, or a histogram's
/// percentile, over a lookback window.
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<MetricsHistoryQuery>,
) -> Result<Json<MetricsHistoryResponse>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:metrics:read")?;
    let window_secs = (params.hours * 3600.0) as i64;
    let value = if let Some(p) = params.percentile {
        state.metrics.percentile(&params.metric_name, p, window_secs).map_err(ApiError::from)?
    } else {
        state.metrics.counter_rate(&params.metric_name, window_secs).map_err(ApiError::from)?
    };
    Ok(Json(MetricsHistoryResponse {
        name: params.metric_name,
        value,
    }))
}
