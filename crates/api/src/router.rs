//! Assembles the full [`axum::Router`] (spec §6): route table, request
//! body size limit, tracing, and the Swagger UI mount.

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{auth, entities, health, metrics};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the router: `/health`, `/metrics`, `/api/v1/auth/*`,
/// `/api/v1/entities*` (query-param routing, matching spec §6's wire
/// format literally) and `/api/v1/metrics/history`, plus Swagger UI at
/// `/api/v1/docs`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_request_body_bytes;

    let api_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/whoami", get(auth::whoami))
        .route("/entities", get(entities::query).post(entities::create))
        .route("/entities/:id", patch(entities::update).delete(entities::delete))
        .route("/entities/as-of", get(entities::as_of))
        .route("/entities/history", get(entities::history))
        .route("/entities/diff", get(entities::diff))
        .route("/entities/stream", get(entities::stream))
        .route("/metrics/history", get(metrics::history));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::scrape))
        .nest("/api/v1", api_routes)
        .merge(SwaggerUi::new("/api/v1/docs").url("/api/v1/openapi.json", ApiDoc::openapi()))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
