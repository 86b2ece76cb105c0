//! The `Repository` facade (spec §4.3): CRUD, tag queries, soft-delete.
//!
//! Every mutating call goes through [`Repository::write`]: allocate an LSN,
//! append a WAL intent, then apply it to the EBF + indices, all under the
//! single write latch (spec §5's "WAL write -> EBF append -> index update"
//! ordering). Reads take the shared read latch.

use entitydb_concurrency::{LsnAllocator, WriterLatch};
use entitydb_core::{Entity, EntityId, Error, Tag, Timestamp};
use entitydb_durability::recovery::checkpoint_and_truncate;

use crate::config::EngineConfig;
use crate::state::{self, replace_intent, write_intent, EngineState};

/// Wires storage, durability and concurrency into the single facade the
/// HTTP layer drives.
pub struct Repository {
    state: WriterLatch<EngineState>,
    lsn_alloc: LsnAllocator,
    config: EngineConfig,
}

impl Repository {
    /// Open (or create) the store described by `config`, replaying any
    /// outstanding WAL intents.
    pub fn open(config: EngineConfig) -> Result<Self, Error> {
        let (state, lsn_alloc) = state::open(&config)?;
        Ok(Repository {
            state: WriterLatch::new(state),
            lsn_alloc,
            config,
        })
    }

    fn write(
        &self,
        id: EntityId,
        new_tags: Vec<Tag>,
        content: Option<Vec<u8>>,
    ) -> Result<Entity, Error> {
        let lsn = self.lsn_alloc.next();
        let intent = write_intent(lsn, id.clone(), new_tags.clone(), content.clone());

        let mut guard = self.state.write();
        guard.wal.append(&intent)?;
        let entity = state::apply_write(&mut guard.ebf, &mut guard.indices, &id, lsn, &new_tags, content)?;

        if guard.wal.size() >= self.config.wal_critical_bytes {
            checkpoint_and_truncate(&mut guard.wal, lsn)?;
            guard.last_checkpoint_lsn = lsn;
        }
        Ok(entity)
    }

    /// Create a new entity with a freshly generated id. Fails `Conflict`
    /// only through [`Repository::create_with_id`]; a generated id can
    /// never collide in practice.
    pub fn create(&self, tags: Vec<Tag>, content: Vec<u8>) -> Result<Entity, Error> {
        self.write(EntityId::generate(), tags, Some(content))
    }

    /// Create a new entity under a caller-supplied id. Fails
    /// [`Error::Conflict`] if the id is already present.
    pub fn create_with_id(
        &self,
        id: EntityId,
        tags: Vec<Tag>,
        content: Vec<u8>,
    ) -> Result<Entity, Error> {
        {
            let guard = self.state.read();
            if guard.indices.by_id.get(&id).is_some() {
                return Err(Error::Conflict(format!("entity {id} already exists")));
            }
        }
        self.write(id, tags, Some(content))
    }

    /// Append `new_tags` to an existing entity (spec §4.3 `Update`).
    pub fn update(&self, id: &EntityId, new_tags: Vec<Tag>) -> Result<Entity, Error> {
        self.ensure_exists(id)?;
        self.write(id.clone(), new_tags, None)
    }

    /// Convenience: append a single bare tag stamped with the current time
    /// (spec §4.3 `AddTag`).
    pub fn add_tag(&self, id: &EntityId, bare: &str) -> Result<Entity, Error> {
        entitydb_core::entity::validate_bare_tag(bare)?;
        self.ensure_exists(id)?;
        let tag = Tag::new(Timestamp::now(), bare)?;
        self.write(id.clone(), vec![tag], None)
    }

    /// Soft-delete (spec §12.1 decision): append `status:deleted` rather
    /// than removing the record, so history and `include_deleted` reads
    /// still see it.
    pub fn delete(&self, id: &EntityId) -> Result<Entity, Error> {
        self.ensure_exists(id)?;
        let tag = Tag::new(Timestamp::now(), "status:deleted")?;
        self.write(id.clone(), vec![tag], None)
    }

    /// Overwrite `id`'s entire tag list (spec §4.6 retention pruning): unlike
    /// every other mutation this does not append, it replaces, so pruned
    /// value/observation tags actually disappear rather than being merely
    /// shadowed in the bare view. `id` must already exist.
    pub fn replace_tags(&self, id: &EntityId, tags: Vec<Tag>) -> Result<Entity, Error> {
        self.ensure_exists(id)?;
        let lsn = self.lsn_alloc.next();
        let intent = replace_intent(lsn, id.clone(), tags.clone(), None);

        let mut guard = self.state.write();
        guard.wal.append(&intent)?;
        let entity = state::apply_replace(&mut guard.ebf, &mut guard.indices, id, lsn, tags, None)?;

        if guard.wal.size() >= self.config.wal_critical_bytes {
            checkpoint_and_truncate(&mut guard.wal, lsn)?;
            guard.last_checkpoint_lsn = lsn;
        }
        Ok(entity)
    }

    fn ensure_exists(&self, id: &EntityId) -> Result<(), Error> {
        let guard = self.state.read();
        if guard.indices.by_id.get(id).is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Fetch the latest record for `id`. 404s on a soft-deleted entity
    /// unless `include_deleted`.
    pub fn get_by_id(&self, id: &EntityId, include_deleted: bool) -> Result<Entity, Error> {
        let guard = self.state.read();
        let offset = guard
            .indices
            .by_id
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let entity = guard.ebf.read_at(offset)?;
        if entity.is_deleted() && !include_deleted {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(entity)
    }

    /// Every non-chunk-child entity, excluding soft-deleted ones unless
    /// `include_deleted` (spec §9 "chunked content identity").
    pub fn list(&self, include_deleted: bool) -> Result<Vec<Entity>, Error> {
        let guard = self.state.read();
        let mut out = Vec::new();
        for id in guard.indices.by_id.ids() {
            if id.is_chunk_child() {
                continue;
            }
            let offset = guard.indices.by_id.get(id).expect("id came from by_id.ids()");
            let entity = guard.ebf.read_at(offset)?;
            if entity.is_deleted() && !include_deleted {
                continue;
            }
            out.push(entity);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Entities currently carrying exactly bare tag `tag`.
    pub fn list_by_tag(&self, tag: &str, include_deleted: bool) -> Result<Vec<Entity>, Error> {
        self.list_by_tags(std::slice::from_ref(&tag.to_string()), true, include_deleted)
    }

    /// Entities matching `tags`: intersection if `match_all`, union
    /// otherwise (spec §4.3 `ListByTags`).
    pub fn list_by_tags(
        &self,
        tags: &[String],
        match_all: bool,
        include_deleted: bool,
    ) -> Result<Vec<Entity>, Error> {
        let guard = self.state.read();
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut sets: Vec<&std::collections::HashSet<EntityId>> = Vec::new();
        for tag in tags {
            match guard.indices.by_tag.get(tag) {
                Some(ids) => sets.push(ids),
                None if match_all => return Ok(Vec::new()),
                None => {}
            }
        }

        let mut ids: Vec<EntityId> = if match_all {
            let Some((first, rest)) = sets.split_first() else {
                return Ok(Vec::new());
            };
            first
                .iter()
                .filter(|id| rest.iter().all(|set| set.contains(*id)))
                .cloned()
                .collect()
        } else {
            let mut union = std::collections::HashSet::new();
            for set in sets {
                union.extend(set.iter().cloned());
            }
            union.into_iter().collect()
        };
        ids.sort();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if id.is_chunk_child() {
                continue;
            }
            let offset = guard
                .indices
                .by_id
                .get(&id)
                .expect("id came from by_tag index");
            let entity = guard.ebf.read_at(offset)?;
            if entity.is_deleted() && !include_deleted {
                continue;
            }
            out.push(entity);
        }
        Ok(out)
    }

    /// Config this repository was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read the latest record for `id` regardless of deletion/chunk-child
    /// status, for internal use by the chunking layer.
    pub(crate) fn read_raw(&self, id: &EntityId) -> Result<Entity, Error> {
        let guard = self.state.read();
        let offset = guard
            .indices
            .by_id
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        guard.ebf.read_at(offset)
    }

    /// Current WAL size in bytes, for `/health`.
    pub fn wal_size_bytes(&self) -> u64 {
        self.state.read().wal.size()
    }

    /// Number of distinct entities currently indexed, for `/health`.
    pub fn entity_count(&self) -> usize {
        self.state.read().indices.by_id.len()
    }

    /// Snapshot spec §4.8's `IntegrityMetrics` for `/health`: index health,
    /// orphan count, checksum coverage over chunked entities, WAL size and
    /// the last checkpoint LSN, all read under the shared read latch.
    ///
    /// `operation_success_rate` has no rolling counter anywhere in this
    /// codebase to source it from, so it is reported as `1.0` — a
    /// documented simplification (see DESIGN.md). `corrupted_count` is a
    /// 0/1 flag rather than an exact count: [`entitydb_storage::EbfFile::scan`]
    /// aborts at the first malformed record instead of skipping and
    /// tallying them, so a full linear rescan here can only tell "clean" from
    /// "at least one corrupt record", not the exact number.
    pub fn integrity_metrics(&self) -> Result<entitydb_storage::recovery::IntegrityMetrics, Error> {
        use entitydb_storage::recovery::{find_orphaned_entries, reindex, verify_index_health};

        let guard = self.state.read();
        let total_entities = guard.indices.by_id.len();
        let index_healthy = verify_index_health(&guard.ebf, &guard.indices).is_ok();
        let orphan_count = find_orphaned_entries(&guard.ebf, &guard.indices)?.len();
        let corrupted_count = usize::from(reindex(&guard.ebf).is_err());

        let mut chunked_total = 0usize;
        let mut chunked_with_checksum = 0usize;
        for id in guard.indices.by_id.ids() {
            let Some(offset) = guard.indices.by_id.get(id) else { continue };
            let Ok(entity) = guard.ebf.read_at(offset) else { continue };
            if !crate::chunked::is_chunked(&entity) {
                continue;
            }
            chunked_total += 1;
            if entity.bare_view().iter().any(|t| t.0.starts_with("content:checksum:sha256:")) {
                chunked_with_checksum += 1;
            }
        }
        let checksum_coverage = if chunked_total == 0 {
            1.0
        } else {
            chunked_with_checksum as f64 / chunked_total as f64
        };

        Ok(entitydb_storage::recovery::IntegrityMetrics {
            total_entities,
            corrupted_count,
            orphan_count,
            checksum_coverage,
            operation_success_rate: 1.0,
            index_healthy,
            wal_size_bytes: guard.wal.size(),
            last_checkpoint_lsn: guard.last_checkpoint_lsn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> Repository {
        let dir = TempDir::new().unwrap().into_path();
        let config = EngineConfig {
            data_path: dir,
            ..EngineConfig::default()
        };
        Repository::open(config).unwrap()
    }

    fn tag(bare: &str) -> Tag {
        Tag::new(Timestamp::now(), bare).unwrap()
    }

    #[test]
    fn create_then_get_round_trips() {
        let repo = repo();
        let entity = repo
            .create(vec![tag("type:task"), tag("dataset:system")], b"hi".to_vec())
            .unwrap();
        let fetched = repo.get_by_id(&entity.id, false).unwrap();
        assert_eq!(fetched.content, b"hi");
    }

    #[test]
    fn create_with_id_rejects_duplicate() {
        let repo = repo();
        let id = EntityId::from("fixed");
        repo.create_with_id(id.clone(), vec![tag("type:task")], vec![])
            .unwrap();
        let err = repo
            .create_with_id(id, vec![tag("type:task")], vec![])
            .unwrap_err();
        assert_eq!(err.kind(), entitydb_core::ErrorKind::Conflict);
    }

    #[test]
    fn update_appends_tags_without_losing_earlier_ones() {
        let repo = repo();
        let entity = repo.create(vec![tag("priority:low")], vec![]).unwrap();
        repo.update(&entity.id, vec![tag("priority:high")]).unwrap();
        let fetched = repo.get_by_id(&entity.id, false).unwrap();
        assert_eq!(fetched.tags.len(), 2);
        assert!(fetched.has_current_tag("priority:high"));
    }

    #[test]
    fn delete_is_soft_and_filtered_from_list() {
        let repo = repo();
        let entity = repo.create(vec![tag("type:task")], vec![]).unwrap();
        repo.delete(&entity.id).unwrap();

        assert!(repo.get_by_id(&entity.id, false).is_err());
        assert!(repo.get_by_id(&entity.id, true).is_ok());
        assert!(repo.list(false).unwrap().is_empty());
        assert_eq!(repo.list(true).unwrap().len(), 1);
    }

    #[test]
    fn list_by_tags_match_all_intersects() {
        let repo = repo();
        let a = repo
            .create(vec![tag("type:task"), tag("priority:high")], vec![])
            .unwrap();
        repo.create(vec![tag("type:task")], vec![]).unwrap();

        let found = repo
            .list_by_tags(
                &["type:task".to_string(), "priority:high".to_string()],
                true,
                false,
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }

    #[test]
    fn list_by_tags_match_any_unions() {
        let repo = repo();
        repo.create(vec![tag("priority:low")], vec![]).unwrap();
        repo.create(vec![tag("priority:high")], vec![]).unwrap();

        let found = repo
            .list_by_tags(
                &["priority:low".to_string(), "priority:high".to_string()],
                false,
                false,
            )
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn replace_tags_overwrites_rather_than_appends() {
        let repo = repo();
        let entity = repo
            .create(vec![tag("type:metric"), tag("value:1"), tag("value:2")], vec![])
            .unwrap();
        assert_eq!(repo.get_by_id(&entity.id, false).unwrap().tags.len(), 3);

        let pruned = repo
            .replace_tags(&entity.id, vec![tag("type:metric"), tag("value:2")])
            .unwrap();
        assert_eq!(pruned.tags.len(), 2);
        let fetched = repo.get_by_id(&entity.id, false).unwrap();
        assert_eq!(fetched.tags.len(), 2);
    }

    #[test]
    fn list_excludes_chunk_children() {
        let repo = repo();
        let parent = repo.create(vec![tag("type:document")], vec![]).unwrap();
        repo.create_with_id(parent.id.chunk_child(0), vec![tag("type:document")], vec![1, 2, 3])
            .unwrap();

        let found = repo.list(false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, parent.id);
    }

    #[test]
    fn integrity_metrics_reports_a_clean_store_as_healthy() {
        let repo = repo();
        repo.create(vec![tag("type:task")], vec![]).unwrap();

        let metrics = repo.integrity_metrics().unwrap();
        assert_eq!(metrics.total_entities, 1);
        assert!(metrics.index_healthy);
        assert_eq!(metrics.orphan_count, 0);
        assert_eq!(metrics.corrupted_count, 0);
        assert_eq!(metrics.checksum_coverage, 1.0);
        assert_eq!(metrics.health_score(), 100);
    }

    #[test]
    fn integrity_metrics_tracks_checksum_coverage_for_chunked_entities() {
        let repo = repo();
        let content: Vec<u8> = (0..20u8).collect();
        repo.create_chunked(vec![], content, None).unwrap();

        let metrics = repo.integrity_metrics().unwrap();
        assert_eq!(metrics.checksum_coverage, 1.0);
    }
}
