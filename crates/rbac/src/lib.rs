//! Session lifecycle and permission evaluation (spec §4.4)
//!
//! Users, sessions, and audit events are all ordinary [`entitydb_engine`]
//! entities with tag conventions layered on top; this crate adds no new
//! storage, only the tag shapes and the in-memory session map that makes
//! token lookup fast (spec §5: "the session map uses its own reader/writer
//! latch").

#![warn(missing_docs)]

pub mod audit;
pub mod password;
pub mod permissions;
pub mod session;

pub use password::{hash_password, verify_password};
pub use permissions::has_permission;
pub use session::{Session, SessionStore};
