//! Request/response bodies for the HTTP surface (spec §6).
//!
//! Entity content travels as base64 over JSON; tags travel as their
//! canonical `"timestamp|bare"` strings on the wire and get re-parsed with
//! [`entitydb_core::Tag::parse`] on the way in.

use entitydb_core::{Entity, Tag};
use entitydb_engine::EntityDiff;
use entitydb_rbac::Session;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `POST /auth/login` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Matches the `username:` tag on a `type:user` entity.
    pub username: String,
    /// Verified against that entity's `password_hash:` tag.
    pub password: String,
}

/// Bare role names (`rbac:role:<name>` tags with the prefix stripped) the
/// caller's session carries. Excludes `rbac:perm:*` permission tags — those
/// stay internal to [`entitydb_rbac::has_permission`] and are never echoed
/// over the wire.
fn bare_role_names(roles: &[String]) -> Vec<String> {
    roles
        .iter()
        .filter_map(|r| r.strip_prefix("rbac:role:"))
        .map(|s| s.to_string())
        .collect()
}

/// The `user` object nested in auth responses (spec §6: `user:{…,roles}`).
#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfo {
    /// The user's id.
    pub user_id: String,
    /// Cached username.
    pub username: String,
    /// Bare role names, e.g. `"admin"`.
    pub roles: Vec<String>,
}

/// `POST /auth/login` response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// Absolute expiry, RFC 3339.
    pub expires_at: String,
    /// The user id the token authenticates.
    pub user_id: String,
    /// The authenticated user, spec §6 `user:{…,roles}`.
    pub user: UserInfo,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        SessionResponse {
            token: s.token,
            expires_at: s.expires_at.to_rfc3339(),
            user_id: s.user_id.to_string(),
            user: UserInfo {
                user_id: s.user_id.to_string(),
                username: s.username.clone(),
                roles: bare_role_names(&s.roles),
            },
        }
    }
}

/// `GET /auth/whoami` response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct WhoAmIResponse {
    /// The authenticated user's id.
    pub user_id: String,
    /// Cached username.
    pub username: String,
    /// Bare role names, e.g. `"admin"`.
    pub roles: Vec<String>,
    /// This session's expiry, RFC 3339.
    pub expires_at: String,
}

impl From<Session> for WhoAmIResponse {
    fn from(s: Session) -> Self {
        WhoAmIResponse {
            user_id: s.user_id.to_string(),
            username: s.username.clone(),
            roles: bare_role_names(&s.roles),
            expires_at: s.expires_at.to_rfc3339(),
        }
    }
}

/// `POST /api/v1/entities` request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEntityRequest {
    /// Bare tags (no timestamp; the server stamps `Timestamp::now()` on
    /// each at write time).
    pub tags: Vec<String>,
    /// Base64-encoded content. Absent or empty means no content.
    #[serde(default)]
    pub content_base64: Option<String>,
    /// MIME type recorded on a chunked entity's `content:type:` tag.
    #[serde(default)]
    pub content_type: Option<String>,
}

/// `PATCH /api/v1/entities/{id}` request body: append-only tag update.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEntityRequest {
    /// Bare tags to append, stamped with `Timestamp::now()`.
    pub tags: Vec<String>,
}

/// An entity as the wire sees it: tags rendered as canonical
/// `"timestamp|bare"` strings, content as base64.
#[derive(Debug, Serialize, ToSchema)]
pub struct EntityResponse {
    /// Entity id.
    pub id: String,
    /// Full tag list, canonical form, append order.
    pub tags: Vec<String>,
    /// Base64-encoded content.
    pub content_base64: String,
    /// Creation time, RFC 3339.
    pub created_at: String,
    /// Last mutation time, RFC 3339.
    pub updated_at: String,
    /// Whether this entity carries `status:deleted`.
    pub deleted: bool,
}

impl From<Entity> for EntityResponse {
    fn from(e: Entity) -> Self {
        use base64::Engine;
        EntityResponse {
            id: e.id.to_string(),
            tags: e.tags.iter().map(|t| t.as_str().to_string()).collect(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(&e.content),
            created_at: e.created_at.to_rfc3339(),
            updated_at: e.updated_at.to_rfc3339(),
            deleted: e.is_deleted(),
        }
    }
}

/// Query parameters for `GET /api/v1/entities` (spec §6: fetch-by-id when
/// `id` is present, otherwise a tag query).
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Fetch exactly this entity rather than running a tag query.
    #[serde(default)]
    pub id: Option<String>,
    /// Comma-separated bare tags to filter on.
    #[serde(default)]
    pub tags: Option<String>,
    /// `"all"` (intersection, default) or `"any"` (union).
    #[serde(default)]
    pub r#match: Option<String>,
    /// Include soft-deleted entities.
    #[serde(default)]
    pub include_deleted: Option<bool>,
    /// Cap the number of results returned.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Skip this many results before applying `limit`.
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListQuery {
    /// `match=all|any` as the boolean `list_by_tags` expects; defaults to
    /// `all`.
    pub fn match_all(&self) -> bool {
        self.r#match.as_deref() != Some("any")
    }
}

/// Query parameters for `GET /api/v1/entities/as-of`.
#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    /// Entity id to snapshot.
    pub id: String,
    /// RFC 3339 instant to snapshot at.
    pub as_of: String,
}

/// Query parameters for `GET /api/v1/entities/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Entity id whose change stream to return.
    pub id: String,
    /// Most recent N tag assertions to return.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// Query parameters for `GET /api/v1/entities/diff`.
#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    /// Entity id to diff.
    pub id: String,
    /// RFC 3339 instant of the "before" snapshot.
    pub t1: String,
    /// RFC 3339 instant of the "after" snapshot.
    pub t2: String,
}

/// Query parameters for `GET /api/v1/entities/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Entity id to stream content for.
    pub id: String,
}

/// `GET /api/v1/entities/{id}/diff` response body.
#[derive(Debug, Serialize)]
pub struct DiffResponse {
    /// Snapshot as of `t1`.
    pub before: EntityResponse,
    /// Snapshot as of `t2`.
    pub after: EntityResponse,
}

impl From<EntityDiff> for DiffResponse {
    fn from(d: EntityDiff) -> Self {
        DiffResponse {
            before: d.before.into(),
            after: d.after.into(),
        }
    }
}

/// One entry of `GET /api/v1/entities/{id}/history`.
#[derive(Debug, Serialize)]
pub struct ChangeEventDto {
    /// When this tag was asserted, RFC 3339.
    pub timestamp: String,
    /// The bare tag asserted.
    pub bare_tag: String,
}

/// Query parameters for `GET /api/v1/metrics/history` (spec §6).
#[derive(Debug, Deserialize)]
pub struct MetricsHistoryQuery {
    /// Metric name (the `name:` tag value).
    pub metric_name: String,
    /// Lookback window for a rate/percentile computation.
    #[serde(default = "default_hours")]
    pub hours: f64,
    /// Cap the number of raw observations echoed back.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
    /// Percentile to compute for a histogram metric, e.g. `0.95`.
    #[serde(default)]
    pub percentile: Option<f64>,
}

fn default_hours() -> f64 {
    1.0
}

/// `GET /api/v1/metrics/history` response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsHistoryResponse {
    /// Echoes the queried metric name.
    pub name: String,
    /// Counter rate or histogram percentile over the requested window, if
    /// the metric had any observations in it.
    pub value: Option<f64>,
}

/// `GET /health` response body (spec §11, §4.8 `IntegrityMetrics`).
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `"healthy"`, `"degraded"`, or `"unhealthy"`.
    pub status: String,
    /// Total indexed entities, chunk children included.
    pub entity_count: usize,
    /// Current WAL size in bytes.
    pub wal_size_bytes: u64,
    /// The configured durability mode (`strict`/`batched`/`async`).
    pub durability_mode: String,
    /// LSN of the last completed checkpoint.
    pub last_checkpoint_lsn: u64,
    /// Whether the secondary indices currently verify against the EBF.
    pub index_healthy: bool,
    /// Entity ids present in the EBF but absent from the index.
    pub orphan_count: usize,
    /// `IntegrityMetrics::health_score()`: 0-100.
    pub health_score: u8,
}

fn tags_to_parsed(raw: &[String]) -> Result<Vec<Tag>, entitydb_core::Error> {
    raw.iter()
        .map(|bare| {
            entitydb_core::entity::validate_bare_tag(bare)?;
            Tag::new(entitydb_core::Timestamp::now(), bare)
        })
        .collect()
}

impl CreateEntityRequest {
    /// Parse `tags` into stamped [`Tag`]s and decode `content_base64`.
    pub fn into_parts(self) -> Result<(Vec<Tag>, Vec<u8>, Option<String>), entitydb_core::Error> {
        use base64::Engine;
        let tags = tags_to_parsed(&self.tags)?;
        let content = match self.content_base64 {
            Some(b64) if !b64.is_empty() => base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| entitydb_core::Error::InvalidInput(format!("invalid base64 content: {e}")))?,
            _ => Vec::new(),
        };
        Ok((tags, content, self.content_type))
    }
}

impl UpdateEntityRequest {
    /// Parse `tags` into stamped [`Tag`]s.
    pub fn into_tags(self) -> Result<Vec<Tag>, entitydb_core::Error> {
        tags_to_parsed(&self.tags)
    }
}
