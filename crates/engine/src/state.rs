//! Engine state: the EBF handle, indices and WAL behind one writer latch
//!
//! [`open`] performs the boot sequence spec §4.9 implies: open the EBF,
//! reindex it, open the WAL, replay any intents the EBF hasn't absorbed yet,
//! then checkpoint and truncate so a fresh crash has nothing to replay.

use entitydb_concurrency::LsnAllocator;
use entitydb_core::{Entity, EntityId, Error};
use entitydb_durability::recovery::{checkpoint_and_truncate, plan_recovery};
use entitydb_durability::{Intent, IntentBody, Wal};
use entitydb_storage::index::Indices;
use entitydb_storage::recovery::reindex;
use entitydb_storage::EbfFile;

use crate::config::EngineConfig;

/// Everything a write touches inside the writer latch: the append-only
/// file, the secondary indices, and the WAL.
pub struct EngineState {
    /// The entity binary file.
    pub ebf: EbfFile,
    /// Secondary indices, kept consistent with `ebf` under the write latch.
    pub indices: Indices,
    /// Write-ahead log.
    pub wal: Wal,
    /// LSN of the last completed checkpoint, surfaced via `/health` (spec
    /// §4.8 `IntegrityMetrics::last_checkpoint_lsn`).
    pub last_checkpoint_lsn: u64,
}

/// Open (or create) the store at `config.data_path`, replaying any
/// outstanding WAL intents before handing back ready-to-use state.
pub fn open(config: &EngineConfig) -> Result<(EngineState, LsnAllocator), Error> {
    std::fs::create_dir_all(&config.data_path)?;
    let mut ebf = EbfFile::open(config.ebf_path())?;
    let mut indices = reindex(&ebf)?;
    let mut wal = Wal::open(config.wal_path(), config.durability_mode()?)?;

    // A global watermark of 0 makes `plan_recovery` hand back every intent
    // still in the WAL; per-entity idempotency is then enforced below by
    // comparing each intent's lsn against that id's latest absorbed lsn in
    // `ById`, so a crash between an EBF append and the matching WAL
    // truncate never double-applies a write on restart.
    let plan = plan_recovery(&wal, 0)?;
    let mut replayed = false;
    for intent in &plan.pending_writes {
        match &intent.body {
            IntentBody::Write { id, new_tags, content } => {
                if indices.by_id.get_lsn(id).is_some_and(|absorbed| absorbed >= intent.lsn) {
                    continue;
                }
                apply_write(&mut ebf, &mut indices, id, intent.lsn, new_tags, content.clone())?;
                replayed = true;
            }
            IntentBody::Replace { id, tags, content } => {
                if indices.by_id.get_lsn(id).is_some_and(|absorbed| absorbed >= intent.lsn) {
                    continue;
                }
                apply_replace(&mut ebf, &mut indices, id, intent.lsn, tags.clone(), content.clone())?;
                replayed = true;
            }
            IntentBody::Checkpoint { .. } => {}
        }
    }
    if replayed {
        checkpoint_and_truncate(&mut wal, plan.highest_wal_lsn)?;
    }

    let lsn_alloc = LsnAllocator::starting_after(plan.highest_wal_lsn);
    let last_checkpoint_lsn = plan.highest_wal_lsn;
    Ok((
        EngineState {
            ebf,
            indices,
            wal,
            last_checkpoint_lsn,
        },
        lsn_alloc,
    ))
}

/// Apply a single `Write` intent: read the current entity (if any), append
/// `new_tags` and optionally replace `content`, append the new full record
/// to the EBF, and update the indices. Shared by normal writes and
/// recovery replay.
pub fn apply_write(
    ebf: &mut EbfFile,
    indices: &mut Indices,
    id: &EntityId,
    lsn: u64,
    new_tags: &[entitydb_core::Tag],
    content: Option<Vec<u8>>,
) -> Result<Entity, Error> {
    let mut entity = match indices.by_id.get(id) {
        Some(offset) => ebf.read_at(offset)?,
        None => Entity {
            id: id.clone(),
            tags: Vec::new(),
            content: Vec::new(),
            created_at: new_tags
                .first()
                .map(|t| t.timestamp())
                .unwrap_or_else(entitydb_core::Timestamp::now),
            updated_at: new_tags
                .first()
                .map(|t| t.timestamp())
                .unwrap_or_else(entitydb_core::Timestamp::now),
        },
    };

    let old_bare: Vec<String> = entity.bare_view().into_iter().map(|t| t.0).collect();

    for tag in new_tags {
        entity.tags.push(tag.clone());
        entity.updated_at = tag.timestamp();
    }
    if let Some(bytes) = content {
        entity.content = bytes;
    }

    let offset = ebf.append(&entity, lsn)?;
    indices.by_id.set(id.clone(), offset, lsn);
    let new_bare: Vec<String> = entity.bare_view().into_iter().map(|t| t.0).collect();
    indices.reindex_entity(id, &old_bare, &new_bare);

    Ok(entity)
}

/// Apply a single `Replace` intent: overwrite `id`'s entire tag list (and
/// optionally its content) rather than appending. Used by retention
/// pruning, where old value/observation tags must actually disappear.
pub fn apply_replace(
    ebf: &mut EbfFile,
    indices: &mut Indices,
    id: &EntityId,
    lsn: u64,
    tags: Vec<entitydb_core::Tag>,
    content: Option<Vec<u8>>,
) -> Result<Entity, Error> {
    let existing = match indices.by_id.get(id) {
        Some(offset) => Some(ebf.read_at(offset)?),
        None => None,
    };
    let old_bare: Vec<String> = existing
        .as_ref()
        .map(|e| e.bare_view().into_iter().map(|t| t.0).collect())
        .unwrap_or_default();
    let created_at = existing
        .as_ref()
        .map(|e| e.created_at)
        .unwrap_or_else(entitydb_core::Timestamp::now);
    let updated_at = tags
        .last()
        .map(|t| t.timestamp())
        .unwrap_or(created_at);
    let content = content.or_else(|| existing.map(|e| e.content));

    let entity = Entity {
        id: id.clone(),
        tags,
        content: content.unwrap_or_default(),
        created_at,
        updated_at,
    };

    let offset = ebf.append(&entity, lsn)?;
    indices.by_id.set(id.clone(), offset, lsn);
    let new_bare: Vec<String> = entity.bare_view().into_iter().map(|t| t.0).collect();
    indices.reindex_entity(id, &old_bare, &new_bare);

    Ok(entity)
}

/// Build (but do not apply) the `Replace` intent for a full tag-list
/// overwrite, for the writer to append to the WAL before calling
/// [`apply_replace`].
pub fn replace_intent(lsn: u64, id: EntityId, tags: Vec<entitydb_core::Tag>, content: Option<Vec<u8>>) -> Intent {
    Intent {
        lsn,
        body: IntentBody::Replace { id, tags, content },
    }
}

/// Build (but do not apply) the `Write` intent for a mutation, for the
/// writer to append to the WAL before calling [`apply_write`].
pub fn write_intent(
    lsn: u64,
    id: EntityId,
    new_tags: Vec<entitydb_core::Tag>,
    content: Option<Vec<u8>>,
) -> Intent {
    Intent {
        lsn,
        body: IntentBody::Write {
            id,
            new_tags,
            content,
        },
    }
}
