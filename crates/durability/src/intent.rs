//! WAL intent types
//!
//! Every mutating repository operation (`Create`, `Update`, `AddTag`,
//! `Delete`) reduces to one [`Intent::Write`]: "append these new temporal
//! tags (and optionally replace the content) onto `id`, creating the
//! entity if it doesn't exist yet." `Delete` is a `Write` that appends a
//! single `status:deleted` tag (spec §9's soft-delete decision).
//!
//! Each intent carries a monotonic `lsn` and the caller-visible
//! `logical_id` (the entity id) so recovery can decide idempotently
//! whether an intent has already been absorbed into the EBF: if the EBF's
//! highest applied LSN for `logical_id` is `>= lsn`, the intent is skipped.

use entitydb_core::{EntityId, Tag};
use serde::{Deserialize, Serialize};

/// A WAL intent: a mutation that must be durable before EBF is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Monotonically increasing log sequence number, strictly ordered
    /// across the whole WAL regardless of which entity it targets.
    pub lsn: u64,
    /// The operation this intent represents.
    pub body: IntentBody,
}

/// The payload of a WAL intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentBody {
    /// Append `new_tags` (and optionally replace `content`) onto `id`,
    /// creating the entity record if this is the first write for `id`.
    Write {
        /// Target entity id.
        id: EntityId,
        /// Temporal tags to append, in order.
        new_tags: Vec<Tag>,
        /// New content payload, if this write replaces content.
        content: Option<Vec<u8>>,
    },
    /// Marks a checkpoint boundary: all intents with `lsn <=
    /// last_applied_lsn` have been flushed to EBF and fsynced. Written
    /// immediately before the WAL is truncated.
    Checkpoint {
        /// Highest LSN guaranteed to be durable in the EBF at this point.
        last_applied_lsn: u64,
    },
    /// Replace `id`'s entire tag list (and optionally its content) rather
    /// than appending, used by retention pruning (spec §4.6) where old
    /// value/observation tags must actually disappear rather than merely
    /// be shadowed in the bare view.
    Replace {
        /// Target entity id.
        id: EntityId,
        /// The complete tag list the entity should have after this intent.
        tags: Vec<Tag>,
        /// New content payload, if this replace also changes content.
        content: Option<Vec<u8>>,
    },
}

impl IntentBody {
    /// The entity id this intent targets, if any (`Checkpoint` has none).
    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            IntentBody::Write { id, .. } => Some(id),
            IntentBody::Replace { id, .. } => Some(id),
            IntentBody::Checkpoint { .. } => None,
        }
    }
}
