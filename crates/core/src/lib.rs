//! Core types for EntityDB
//!
//! This crate defines the foundational data model shared by every other
//! crate in the workspace:
//! - [`Entity`]: the stored unit — id, temporal tags, content, timestamps.
//! - [`Tag`] / temporal tag encoding (`<unix-nanos>|<bare-tag>`).
//! - [`Namespace`]: the well-known tag namespace prefixes (`type:`, `dataset:`, ...).
//! - [`Error`]: the error hierarchy used across storage, engine, rbac and api.
//!
//! Nothing in this crate touches disk or holds a mutex; it is pure data plus
//! parsing/validation, so every other crate can depend on it without pulling
//! in I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod namespace;
pub mod tag;
pub mod timestamp;

pub use entity::{Entity, EntityId};
pub use error::{Error, ErrorKind, Result};
pub use namespace::Namespace;
pub use tag::{BareTag, Tag};
pub use timestamp::Timestamp;
