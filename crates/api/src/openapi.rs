//! Swagger/OpenAPI document (spec §6 "Swagger UI at `/api/v1/docs`").
//!
//! Covers the request/response shapes; route-level docs are intentionally
//! light since the router itself (see [`crate::router`]) is the
//! authoritative list of paths.

use utoipa::OpenApi;

use crate::dto::{
    CreateEntityRequest, EntityResponse, HealthResponse, LoginRequest, MetricsHistoryResponse, SessionResponse,
    UpdateEntityRequest, UserInfo, WhoAmIResponse,
};

/// The generated OpenAPI document, served as JSON at `/api/v1/openapi.json`
/// and rendered by Swagger UI at `/api/v1/docs`.
#[derive(OpenApi)]
#[openapi(
    info(title = "EntityDB API", version = "1.0.0", description = "Tagged, temporal, content-addressed entity store"),
    components(schemas(
        LoginRequest,
        SessionResponse,
        UserInfo,
        WhoAmIResponse,
        CreateEntityRequest,
        UpdateEntityRequest,
        EntityResponse,
        HealthResponse,
        MetricsHistoryResponse,
    ))
)]
pub struct ApiDoc;
