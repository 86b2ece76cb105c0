//! HTTP surface for EntityDB (spec §6): routing, JSON codecs, the auth
//! middleware chain, and Swagger. Handlers are plumbing over
//! `entitydb-engine`, `entitydb-rbac` and `entitydb-metrics` — the spec
//! calls this out explicitly as a thin collaborator over the core.

#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod state;

pub use config::ApiConfig;
pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
