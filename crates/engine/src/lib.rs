//! Repository / query layer
//!
//! Wires [`entitydb_storage`] (EBF + indices + chunking),
//! [`entitydb_durability`] (WAL + recovery) and [`entitydb_concurrency`]
//! (the writer latch + LSN allocator) into the single [`Repository`] facade
//! the HTTP layer drives: CRUD, tag queries, and the temporal queries
//! (`AsOf`, `History`, `Diff`, `RecentChanges`) from spec §4.4.

#![warn(missing_docs)]

pub mod chunked;
pub mod config;
pub mod repository;
pub mod state;
pub mod temporal;

pub use config::EngineConfig;
pub use repository::Repository;
pub use temporal::EntityDiff;
