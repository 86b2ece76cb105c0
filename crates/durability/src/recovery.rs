//! Crash recovery: replay outstanding WAL intents on startup
//!
//! Spec §4.9's WAL entry state machine is `pending -> applied -> truncated`.
//! On a clean shutdown the WAL is already empty (every intent reached
//! `truncated` via a checkpoint). On a crash, [`replay`] re-applies every
//! intent whose `lsn` is greater than the highest LSN the storage layer has
//! already absorbed, using `highest_applied_lsn` as the idempotency check so
//! a replay is safe to run twice.

use crate::intent::{Intent, IntentBody};
use crate::wal::Wal;
use entitydb_core::Error;

/// One intent that recovery decided still needs to be applied, in LSN
/// order. `entitydb-storage` consumes this list and applies each `Write`
/// via its normal append path.
pub struct RecoveryPlan {
    /// Outstanding writes (`Write` and `Replace` intents) to re-apply,
    /// oldest first.
    pub pending_writes: Vec<Intent>,
    /// Highest LSN seen in the WAL, whether or not it needed replay.
    pub highest_wal_lsn: u64,
}

/// Scan `wal` and decide which intents still need to be applied to reach
/// `highest_applied_lsn` (the EBF's own record of the last LSN it durably
/// absorbed, typically tracked per checkpoint). Checkpoint intents are
/// consumed to update the watermark, not replayed themselves.
pub fn plan_recovery(wal: &Wal, highest_applied_lsn: u64) -> Result<RecoveryPlan, Error> {
    let entries = wal.read_all()?;
    let mut watermark = highest_applied_lsn;
    let mut pending_writes = Vec::new();
    let mut highest_wal_lsn = highest_applied_lsn;

    for intent in entries {
        highest_wal_lsn = highest_wal_lsn.max(intent.lsn);
        match &intent.body {
            IntentBody::Checkpoint { last_applied_lsn } => {
                watermark = watermark.max(*last_applied_lsn);
            }
            IntentBody::Write { .. } | IntentBody::Replace { .. } => {
                if intent.lsn > watermark {
                    pending_writes.push(intent);
                }
            }
        }
    }

    Ok(RecoveryPlan {
        pending_writes,
        highest_wal_lsn,
    })
}

/// After every pending write has been durably applied to the EBF, call this
/// to append a final checkpoint intent and truncate the WAL, completing the
/// `applied -> truncated` transition.
pub fn checkpoint_and_truncate(wal: &mut Wal, last_applied_lsn: u64) -> Result<(), Error> {
    wal.append(&Intent {
        lsn: last_applied_lsn,
        body: IntentBody::Checkpoint { last_applied_lsn },
    })?;
    wal.fsync()?;
    wal.truncate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::DurabilityMode;
    use entitydb_core::EntityId;
    use tempfile::TempDir;

    fn write_intent(lsn: u64) -> Intent {
        Intent {
            lsn,
            body: IntentBody::Write {
                id: EntityId::from("e1"),
                new_tags: vec![],
                content: None,
            },
        }
    }

    #[test]
    fn replays_only_intents_past_the_watermark() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path().join("wal"), DurabilityMode::Strict).unwrap();
        wal.append(&write_intent(1)).unwrap();
        wal.append(&write_intent(2)).unwrap();
        wal.append(&write_intent(3)).unwrap();

        let plan = plan_recovery(&wal, 1).unwrap();
        assert_eq!(plan.pending_writes.len(), 2);
        assert_eq!(plan.pending_writes[0].lsn, 2);
        assert_eq!(plan.pending_writes[1].lsn, 3);
        assert_eq!(plan.highest_wal_lsn, 3);
    }

    #[test]
    fn checkpoint_intent_raises_the_watermark() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path().join("wal"), DurabilityMode::Strict).unwrap();
        wal.append(&write_intent(1)).unwrap();
        wal.append(&Intent {
            lsn: 2,
            body: IntentBody::Checkpoint {
                last_applied_lsn: 1,
            },
        })
        .unwrap();
        wal.append(&write_intent(3)).unwrap();

        let plan = plan_recovery(&wal, 0).unwrap();
        assert_eq!(plan.pending_writes.len(), 1);
        assert_eq!(plan.pending_writes[0].lsn, 3);
    }

    #[test]
    fn checkpoint_and_truncate_empties_the_wal() {
        let dir = TempDir::new().unwrap();
        let mut wal = Wal::open(dir.path().join("wal"), DurabilityMode::Strict).unwrap();
        wal.append(&write_intent(1)).unwrap();
        checkpoint_and_truncate(&mut wal, 1).unwrap();
        assert_eq!(wal.size(), 0);
    }
}
