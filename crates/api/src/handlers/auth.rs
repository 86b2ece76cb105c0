//! `/auth/*` handlers (spec §6, §4.4).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use entitydb_core::{Entity, Error};
use entitydb_metrics::{MetricEvent, MetricKind};
use entitydb_rbac::{audit, verify_password};

use crate::dto::{LoginRequest, SessionResponse, WhoAmIResponse};
use crate::error::ApiError;
use crate::state::AppState;

fn bare_value(entity: &Entity, prefix: &str) -> Option<String> {
    entity
        .bare_view()
        .into_iter()
        .find_map(|t| t.0.strip_prefix(prefix).map(|s| s.to_string()))
}

fn find_user_by_username(state: &AppState, username: &str) -> Result<Entity, ApiError> {
    state
        .repo
        .list_by_tag("type:user", false)
        .map_err(ApiError::from)?
        .into_iter()
        .find(|e| bare_value(e, "username:").as_deref() == Some(username))
        .ok_or_else(|| ApiError::from(Error::Unauthorized("invalid username or password".into())))
}

fn user_roles(entity: &Entity) -> Vec<String> {
    entity
        .bare_view()
        .into_iter()
        .map(|t| t.0)
        .filter(|bare| bare.starts_with("rbac:"))
        .collect()
}

/// `POST /auth/login`: verify the password hash and mint a session.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user = find_user_by_username(&state, &req.username);
    let verified = match &user {
        Ok(entity) => {
            let hash = bare_value(entity, "password_hash:").unwrap_or_default();
            verify_password(&req.password, &hash).unwrap_or(false)
        }
        Err(_) => false,
    };

    let _ = audit::record_auth_event(&state.repo, &req.username, verified);
    let user = user?;
    if !verified {
        return Err(Error::Unauthorized("invalid username or password".into()).into());
    }

    let session = state
        .sessions
        .create_session(&state.repo, &user.id, &req.username, user_roles(&user))
        .map_err(ApiError::from)?;
    state.metrics_queue.send(MetricEvent {
        name: "http_auth_login_total".into(),
        kind: MetricKind::Counter,
        value: 1.0,
        unit: "count".into(),
        description: "successful logins".into(),
    });
    Ok(Json(session.into()))
}

/// `POST /auth/logout`: drop the caller's session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<(), ApiError> {
    let session = crate::auth::authenticate(&state, &headers)?;
    state
        .sessions
        .invalidate(&state.repo, &session.token)
        .map_err(ApiError::from)
}

/// `GET /auth/whoami`: report the caller's own session.
pub async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<WhoAmIResponse>, ApiError> {
    let session = crate::auth::authenticate(&state, &headers)?;
    Ok(Json(session.into()))
}

