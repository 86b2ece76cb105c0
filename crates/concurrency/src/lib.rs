//! Single-writer/multi-reader coordination
//!
//! Spec §5: "reads take a shared latch on indexes; writes take an exclusive
//! latch across index update + EBF append + WAL intent." [`WriterLatch`]
//! wraps whatever state a crate needs that discipline over (engine state
//! bundling the EBF handle, indices and WAL) in a single `RwLock`, so a read
//! path and a write path can never observe or produce a half-updated view.
//!
//! [`LsnAllocator`] hands out the monotonic log sequence numbers every WAL
//! intent carries, mirroring the teacher's `TransactionManager`'s
//! `AtomicU64` version counter — EntityDB has no cross-entity transactions,
//! so there is exactly one counter, not one per branch.

#![warn(missing_docs)]

mod latch;
mod lsn;

pub use latch::WriterLatch;
pub use lsn::LsnAllocator;
