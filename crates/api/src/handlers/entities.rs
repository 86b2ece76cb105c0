//! `/api/v1/entities*` handlers (spec §6, §4.3, §4.5).
//!
//! Reads take their target id as a query parameter (`?id=…`) rather than a
//! path segment, matching the wire format spec §6 specifies literally.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use entitydb_core::{Entity, EntityId, Error, Timestamp};
use entitydb_metrics::{MetricEvent, MetricKind};

use crate::dto::{
    AsOfQuery, ChangeEventDto, CreateEntityRequest, DiffQuery, DiffResponse, EntityResponse, HistoryQuery,
    ListQuery, StreamQuery,
};
use crate::error::ApiError;
use crate::state::AppState;

fn parse_rfc3339(s: &str) -> Result<Timestamp, ApiError> {
    Timestamp::parse_rfc3339(s)
        .ok_or_else(|| ApiError::from(Error::InvalidInput(format!("'{s}' is not a valid RFC 3339 timestamp"))))
}

/// Push a request-count observation through the async producer path (spec
/// §4.7 C8) rather than writing straight to the collector, so a slow
/// metrics write never blocks the response.
fn count_request(state: &AppState, operation: &str) {
    state.metrics_queue.send(MetricEvent {
        name: format!("http_{operation}_total"),
        kind: MetricKind::Counter,
        value: 1.0,
        unit: "count".into(),
        description: format!("requests handled by {operation}"),
    });
}

/// `POST /api/v1/entities`: create, chunking automatically when content
/// exceeds `chunk_threshold_bytes` (spec §4.5).
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateEntityRequest>,
) -> Result<Json<EntityResponse>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:create")?;
    let (tags, content, content_type) = req.into_parts().map_err(ApiError::from)?;

    let entity = if content.len() > state.repo.config().chunk_threshold_bytes {
        state
            .repo
            .create_chunked(tags, content, content_type.as_deref())
            .map_err(ApiError::from)?
    } else {
        state.repo.create(tags, content).map_err(ApiError::from)?
    };
    count_request(&state, "entity_create");
    Ok(Json(entity.into()))
}

/// `GET /api/v1/entities`: fetch-by-id when `id` is present, otherwise a
/// tag query (spec §4.3 `GetByID` / `ListByTags`).
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<EntityResponse>>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:read")?;
    count_request(&state, "entity_query");
    let include_deleted = params.include_deleted.unwrap_or(false);

    if let Some(id) = &params.id {
        let entity = state.repo.get_by_id(&EntityId::from(id.as_str()), include_deleted).map_err(ApiError::from)?;
        return Ok(Json(vec![entity.into()]));
    }

    let tags: Vec<String> = params
        .tags
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let mut entities: Vec<Entity> = if tags.is_empty() {
        state.repo.list(include_deleted).map_err(ApiError::from)?
    } else {
        state
            .repo
            .list_by_tags(&tags, params.match_all(), include_deleted)
            .map_err(ApiError::from)?
    };
    if let Some(offset) = params.offset {
        entities = entities.into_iter().skip(offset).collect();
    }
    if let Some(limit) = params.limit {
        entities.truncate(limit);
    }
    Ok(Json(entities.into_iter().map(EntityResponse::from).collect()))
}

/// `GET /api/v1/entities/as-of` (spec §4.3 `GetEntityAsOf`).
pub async fn as_of(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AsOfQuery>,
) -> Result<Json<EntityResponse>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:read")?;
    let at = parse_rfc3339(&params.as_of)?;
    let entity = state
        .repo
        .entity_as_of(&EntityId::from(params.id.as_str()), at)
        .map_err(ApiError::from)?;
    Ok(Json(entity.into()))
}

/// `GET /api/v1/entities/history` (spec §4.3 `GetEntityHistory`).
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<ChangeEventDto>>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:read")?;
    let events = state
        .repo
        .entity_history(&EntityId::from(params.id.as_str()), params.limit)
        .map_err(ApiError::from)?;
    Ok(Json(
        events
            .into_iter()
            .map(|e| ChangeEventDto {
                timestamp: e.timestamp.to_rfc3339(),
                bare_tag: e.bare_tag,
            })
            .collect(),
    ))
}

/// `GET /api/v1/entities/diff` (spec §4.3 `GetEntityDiff`).
pub async fn diff(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DiffQuery>,
) -> Result<Json<DiffResponse>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:read")?;
    let t1 = parse_rfc3339(&params.t1)?;
    let t2 = parse_rfc3339(&params.t2)?;
    let diff = state
        .repo
        .entity_diff(&EntityId::from(params.id.as_str()), t1, t2)
        .map_err(ApiError::from)?;
    Ok(Json(diff.into()))
}

/// `GET /api/v1/entities/stream`: reassembled content, raw bytes (spec
/// §4.5 "Reassemble"/"Stream").
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:read")?;
    let id = EntityId::from(params.id.as_str());
    let entity = state.repo.get_by_id(&id, false).map_err(ApiError::from)?;
    let bytes = if entitydb_engine::chunked::is_chunked(&entity) {
        state.repo.reassemble_chunked(&id).await.map_err(ApiError::from)?
    } else {
        entity.content
    };
    Ok(([("content-type", "application/octet-stream")], bytes).into_response())
}

/// `PATCH /api/v1/entities/{id}`: append-only tag update (additive beyond
/// spec §6's literal table, exercising `Update` over HTTP).
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Path(id): axum::extract::Path<String>,
    Json(req): Json<crate::dto::UpdateEntityRequest>,
) -> Result<Json<EntityResponse>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:update")?;
    let tags = req.into_tags().map_err(ApiError::from)?;
    let entity = state
        .repo
        .update(&EntityId::from(id.as_str()), tags)
        .map_err(ApiError::from)?;
    count_request(&state, "entity_update");
    Ok(Json(entity.into()))
}

/// `DELETE /api/v1/entities/{id}`: soft-delete (spec §12.1 decision).
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Json<EntityResponse>, ApiError> {
    crate::auth::require_permission(&state, &headers, "rbac:perm:entity:delete")?;
    let entity = state.repo.delete(&EntityId::from(id.as_str())).map_err(ApiError::from)?;
    count_request(&state, "entity_delete");
    Ok(Json(entity.into()))
}
