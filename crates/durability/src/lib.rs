//! Write-ahead log and crash recovery
//!
//! Every mutation is written here as an *intent* before the EBF (see
//! `entitydb-storage`) is touched. On restart, [`recovery::replay`] walks
//! any intents the EBF has not yet absorbed and re-applies them, then
//! truncates the log (spec §4.1, §4.9's WAL entry state machine:
//! `pending -> applied -> truncated`).

#![warn(missing_docs)]

pub mod framing;
pub mod intent;
pub mod recovery;
pub mod wal;

pub use intent::{Intent, IntentBody};
pub use wal::Wal;
