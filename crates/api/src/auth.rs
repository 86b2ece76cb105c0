//! Bearer-token authentication and permission checks (spec §4.4, §6).
//!
//! Handlers call [`require_permission`] as their first line rather than
//! going through an axum middleware layer: the spec describes `RequirePermission`
//! as a call a handler makes, not a route-level concern, and every
//! permission check also needs the caller's session for scoping and audit
//! logging — cheaper to fetch once per handler than thread through a
//! middleware extension.

use axum::http::HeaderMap;
use entitydb_core::Error;
use entitydb_rbac::{audit, has_permission, Session};

use crate::error::ApiError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("missing Authorization header".into()))?;
    raw.strip_prefix(BEARER_PREFIX)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::from(Error::Unauthorized("Authorization header is not a bearer token".into())))
}

/// Resolve the caller's session from its bearer token, refreshing its
/// expiry on read if the deployment enables that (spec §4.9).
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Session, ApiError> {
    let token = bearer_token(headers)?;
    let session = state.sessions.get_session(token).map_err(ApiError::from)?;
    if state.config.session_refresh_on_read {
        return state
            .sessions
            .refresh_session(&state.repo, token)
            .map_err(ApiError::from);
    }
    Ok(session)
}

/// Authenticate, then require `required` among the session's cached roles,
/// recording a `permission_check` audit event either way (spec §4.4
/// `RequirePermission`).
pub fn require_permission(state: &AppState, headers: &HeaderMap, required: &str) -> Result<Session, ApiError> {
    let session = authenticate(state, headers)?;
    let granted = has_permission(&session.roles, required);
    let _ = audit::record_permission_check(&state.repo, &session.user_id, required, granted);
    if !granted {
        let _ = audit::record_security_event(
            &state.repo,
            &format!("permission denied: user {} lacks {required}", session.user_id),
        );
        return Err(Error::Forbidden(format!("Insufficient permissions: {required} required")).into());
    }
    Ok(session)
}
