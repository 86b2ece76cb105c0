//! Temporal queries (spec §4.3): `AsOf`, `History`, `Diff`, `RecentChanges`.
//!
//! All four work by scanning the full temporal tag list of the already-
//! fetched entity (or entities) rather than maintaining a separate history
//! index — the tags *are* the history (spec §9 "temporal tags instead of
//! revision rows").

use entitydb_core::{Entity, EntityId, Error, Timestamp};

use crate::repository::Repository;

/// One recorded mutation: the bare tag asserted and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// When this tag was asserted.
    pub timestamp: Timestamp,
    /// The bare tag that was asserted at `timestamp`.
    pub bare_tag: String,
}

/// A before/after pair from [`Repository::entity_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDiff {
    /// Snapshot as of `t1`.
    pub before: Entity,
    /// Snapshot as of `t2`.
    pub after: Entity,
}

impl Repository {
    /// Snapshot of `id` as it stood at `at` (spec §4.3 `GetEntityAsOf`):
    /// only the latest occurrence of each bare tag with timestamp `<= at`.
    pub fn entity_as_of(&self, id: &EntityId, at: Timestamp) -> Result<Entity, Error> {
        let entity = self.read_raw(id)?;
        Ok(entity.as_of(at))
    }

    /// Every tag assertion on `id`, ascending by timestamp (ties preserve
    /// append order), most recent `limit` events (spec §4.3
    /// `GetEntityHistory`).
    pub fn entity_history(&self, id: &EntityId, limit: usize) -> Result<Vec<ChangeEvent>, Error> {
        let entity = self.read_raw(id)?;
        let mut events: Vec<ChangeEvent> = entity
            .tags
            .iter()
            .map(|t| ChangeEvent {
                timestamp: t.timestamp(),
                bare_tag: t.bare().to_string(),
            })
            .collect();
        if events.len() > limit {
            events = events.split_off(events.len() - limit);
        }
        Ok(events)
    }

    /// Before/after snapshots at `t1` and `t2` (spec §4.3 `GetEntityDiff`).
    pub fn entity_diff(
        &self,
        id: &EntityId,
        t1: Timestamp,
        t2: Timestamp,
    ) -> Result<EntityDiff, Error> {
        let entity = self.read_raw(id)?;
        Ok(EntityDiff {
            before: entity.as_of(t1),
            after: entity.as_of(t2),
        })
    }

    /// The most recent temporal tag assertions across the whole store
    /// (spec §4.3 `GetRecentChanges`), newest first.
    pub fn recent_changes(&self, limit: usize) -> Result<Vec<(EntityId, ChangeEvent)>, Error> {
        let entities = self.list(true)?;
        let mut all: Vec<(EntityId, ChangeEvent, usize)> = Vec::new();
        for entity in entities {
            for (i, tag) in entity.tags.iter().enumerate() {
                all.push((
                    entity.id.clone(),
                    ChangeEvent {
                        timestamp: tag.timestamp(),
                        bare_tag: tag.bare().to_string(),
                    },
                    i,
                ));
            }
        }
        all.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(b.2.cmp(&a.2)));
        all.truncate(limit);
        Ok(all.into_iter().map(|(id, event, _)| (id, event)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use entitydb_core::Tag;
    use tempfile::TempDir;

    fn repo() -> Repository {
        let dir = TempDir::new().unwrap().into_path();
        let config = EngineConfig {
            data_path: dir,
            ..EngineConfig::default()
        };
        Repository::open(config).unwrap()
    }

    #[test]
    fn as_of_reflects_the_value_current_at_that_time() {
        let repo = repo();
        let entity = repo
            .create(vec![Tag::new(Timestamp::from_nanos(1), "priority:low").unwrap()], vec![])
            .unwrap();
        // force distinct timestamps by writing the update tag directly
        let t2 = Timestamp::from_nanos(2);
        repo.update(&entity.id, vec![Tag::new(t2, "priority:critical").unwrap()])
            .unwrap();

        let before = repo.entity_as_of(&entity.id, Timestamp::from_nanos(1)).unwrap();
        assert_eq!(before.bare_view()[0].0, "priority:low");

        let after = repo.entity_as_of(&entity.id, t2).unwrap();
        assert_eq!(after.bare_view()[0].0, "priority:critical");
    }

    #[test]
    fn history_is_ascending_and_respects_limit() {
        let repo = repo();
        let entity = repo
            .create(vec![Tag::new(Timestamp::from_nanos(1), "type:task").unwrap()], vec![])
            .unwrap();
        repo.update(&entity.id, vec![Tag::new(Timestamp::from_nanos(2), "priority:low").unwrap()])
            .unwrap();
        repo.update(
            &entity.id,
            vec![Tag::new(Timestamp::from_nanos(3), "priority:high").unwrap()],
        )
        .unwrap();

        let history = repo.entity_history(&entity.id, 2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].bare_tag, "priority:low");
        assert_eq!(history[1].bare_tag, "priority:high");
    }

    #[test]
    fn diff_returns_distinct_before_and_after_snapshots() {
        let repo = repo();
        let entity = repo
            .create(vec![Tag::new(Timestamp::from_nanos(1), "priority:low").unwrap()], vec![])
            .unwrap();
        repo.update(
            &entity.id,
            vec![Tag::new(Timestamp::from_nanos(2), "priority:high").unwrap()],
        )
        .unwrap();

        let diff = repo
            .entity_diff(&entity.id, Timestamp::from_nanos(1), Timestamp::from_nanos(2))
            .unwrap();
        assert_eq!(diff.before.bare_view()[0].0, "priority:low");
        assert_eq!(diff.after.bare_view()[0].0, "priority:high");
    }

    #[test]
    fn recent_changes_orders_newest_first_across_entities() {
        let repo = repo();
        repo.create(vec![Tag::new(Timestamp::from_nanos(1), "type:task").unwrap()], vec![])
            .unwrap();
        repo.create(vec![Tag::new(Timestamp::from_nanos(5), "type:project").unwrap()], vec![])
            .unwrap();

        let changes = repo.recent_changes(10).unwrap();
        assert_eq!(changes[0].1.timestamp, Timestamp::from_nanos(5));
    }
}
