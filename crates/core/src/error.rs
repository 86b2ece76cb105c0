//! Error types shared across the EntityDB workspace
//!
//! Every crate boundary wraps lower-level failures into this single
//! [`Error`] type so the HTTP layer (`entitydb-api`) can map a failure to a
//! status code without knowing which crate produced it. [`ErrorKind`]
//! mirrors the error kinds enumerated in the design spec: each maps to
//! exactly one HTTP status.

use std::io;
use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used to pick an HTTP status code and a recovery
/// strategy. Kept separate from [`Error`]'s variants so new variants can be
/// added without widening the match the HTTP layer has to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requested id is not present in the index.
    NotFound,
    /// Missing or invalid session token.
    Unauthorized,
    /// Authenticated but not permitted.
    Forbidden,
    /// Malformed request: bad JSON, unknown field, invalid tag.
    InvalidInput,
    /// Duplicate id/name, or an operation that conflicts with current state.
    Conflict,
    /// Checksum mismatch or record decode failure.
    Corrupted,
    /// A suspension budget (cancellation token) was exceeded.
    Timeout,
    /// Anything else.
    Internal,
}

/// Unified error type for the EntityDB workspace.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity, chunk or session not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated caller lacks the required permission.
    #[error("{0}")]
    Forbidden(String),

    /// Malformed tag, id, or request payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate id on create, or a conflicting state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Checksum mismatch or corrupt record encountered during a scan.
    #[error("corrupted: {0}")]
    Corrupted(String),

    /// A cancellation token's suspension budget was exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Anything that doesn't fit the categories above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for HTTP status mapping and logging policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Corrupted(_) => ErrorKind::Corrupted,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Attach contextual fields (id, offset, ...) to a lower-level error
    /// without losing the original message. Mirrors the teacher's habit of
    /// wrapping storage errors with the id/offset that produced them.
    pub fn context(self, ctx: impl std::fmt::Display) -> Error {
        match self.kind() {
            ErrorKind::NotFound => Error::NotFound(format!("{ctx}: {self}")),
            ErrorKind::Corrupted => Error::Corrupted(format!("{ctx}: {self}")),
            _ => Error::Internal(format!("{ctx}: {self}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_variant() {
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::Forbidden("x".into()).kind(), ErrorKind::Forbidden);
        assert_eq!(
            Error::Io(io::Error::new(io::ErrorKind::Other, "x")).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn context_preserves_message() {
        let err = Error::NotFound("abc".into()).context("GetByID");
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("GetByID"));
    }
}
