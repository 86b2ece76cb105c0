//! Recovery and integrity operations (spec §4.8)
//!
//! [`reindex`] rebuilds [`Indices`] from a linear EBF scan.
//! [`verify_index_health`] asserts the index reflects exactly the latest
//! record per id. [`find_orphaned_entries`] finds EBF records whose id
//! isn't reachable via `ById` at all (a sign of a stale index or an
//! aborted delete that never finished purging). [`IntegrityMetrics`]
//! derives the 0-100 health score callers surface over `/health`.

use crate::ebf::EbfFile;
use crate::index::Indices;
use entitydb_core::{Entity, EntityId, Error};
use rustc_hash::FxHashMap as HashMap;

/// Rebuild [`Indices`] from scratch by scanning `ebf` linearly. Later
/// records for the same id overwrite earlier ones, so only the latest
/// snapshot per id contributes to `ByTag`/`ByPrefix`.
pub fn reindex(ebf: &EbfFile) -> Result<Indices, Error> {
    let records = ebf.scan()?;
    let mut latest: HashMap<EntityId, (u64, u64, Entity)> = HashMap::default();
    for record in records {
        latest.insert(
            record.entity.id.clone(),
            (record.offset, record.lsn, record.entity),
        );
    }

    let mut indices = Indices::new();
    for (id, (offset, lsn, entity)) in latest {
        indices.by_id.set(id.clone(), offset, lsn);
        let current: Vec<String> = entity.bare_view().into_iter().map(|t| t.0).collect();
        indices.reindex_entity(&id, &[], &current);
    }
    Ok(indices)
}

/// Assert that for every id in `ById`, the record at that offset decodes
/// and its current bare tags are exactly the keys that map back to it in
/// `ByTag` (spec §4.8 invariant). Returns the first mismatch found.
pub fn verify_index_health(ebf: &EbfFile, indices: &Indices) -> Result<(), Error> {
    for id in indices.by_id.ids() {
        let offset = indices
            .by_id
            .get(id)
            .expect("id came from by_id.ids(), so get() cannot miss");
        let entity = ebf
            .read_at(offset)
            .map_err(|e| Error::Corrupted(format!("index health: id {id} at offset {offset}: {e}")))?;
        for tag in entity.bare_view() {
            match indices.by_tag.get(&tag.0) {
                Some(ids) if ids.contains(id) => {}
                _ => {
                    return Err(Error::Corrupted(format!(
                        "index health: tag {} does not map back to id {id} in ByTag",
                        tag.0
                    )))
                }
            }
        }
    }
    Ok(())
}

/// Records present in the EBF whose id is not present in `ById` at all —
/// the index has forgotten about them even though their bytes are still on
/// disk. Normal historical (non-latest) records for a live id are *not*
/// orphans; only ids absent from the index entirely are reported.
pub fn find_orphaned_entries(ebf: &EbfFile, indices: &Indices) -> Result<Vec<EntityId>, Error> {
    let records = ebf.scan()?;
    let mut seen = std::collections::HashSet::new();
    let mut orphans = Vec::new();
    for record in records {
        if indices.by_id.get(&record.entity.id).is_none() && seen.insert(record.entity.id.clone())
        {
            orphans.push(record.entity.id);
        }
    }
    Ok(orphans)
}

/// Aggregate integrity snapshot surfaced over `/health` (spec §4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityMetrics {
    /// Total distinct entities currently indexed.
    pub total_entities: usize,
    /// Records that failed checksum verification during the last scan.
    pub corrupted_count: usize,
    /// Entries found by [`find_orphaned_entries`].
    pub orphan_count: usize,
    /// Fraction of chunked entities carrying a `content:checksum:sha256:` tag.
    pub checksum_coverage: f64,
    /// Fraction of recent operations that completed without error.
    pub operation_success_rate: f64,
    /// Whether [`verify_index_health`] currently passes.
    pub index_healthy: bool,
    /// Current WAL size in bytes.
    pub wal_size_bytes: u64,
    /// LSN of the last completed checkpoint.
    pub last_checkpoint_lsn: u64,
}

impl IntegrityMetrics {
    /// Derive the 0-100 health score (spec §4.8): start at 100 and subtract
    /// weighted penalties for corruption, orphans, an unhealthy index,
    /// missing checksums, and low operation success.
    pub fn health_score(&self) -> u8 {
        let total = self.total_entities.max(1) as f64;
        let corruption_ratio = self.corrupted_count as f64 / total;
        let orphan_ratio = self.orphan_count as f64 / total;
        let invalid_checksum_ratio = (1.0 - self.checksum_coverage).clamp(0.0, 1.0);

        let mut score = 100.0;
        score -= corruption_ratio * 20.0;
        score -= orphan_ratio * 10.0;
        if !self.index_healthy {
            score -= 15.0;
        }
        score -= invalid_checksum_ratio * 25.0;
        score -= (1.0 - self.checksum_coverage).clamp(0.0, 1.0) * 10.0;
        if self.operation_success_rate < 0.95 {
            score -= (0.95 - self.operation_success_rate) * 100.0;
        }
        score.clamp(0.0, 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Tag, Timestamp};
    use tempfile::TempDir;

    fn entity(id: &str, bare: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            tags: vec![Tag::new(Timestamp::from_nanos(1), bare).unwrap()],
            content: vec![],
            created_at: Timestamp::from_nanos(1),
            updated_at: Timestamp::from_nanos(1),
        }
    }

    #[test]
    fn reindex_then_verify_passes_on_clean_file() {
        let dir = TempDir::new().unwrap();
        let mut ebf = EbfFile::open(dir.path().join("d.ebf")).unwrap();
        ebf.append(&entity("e1", "type:task"), 1).unwrap();
        ebf.append(&entity("e2", "type:project"), 2).unwrap();

        let indices = reindex(&ebf).unwrap();
        assert_eq!(indices.by_id.len(), 2);
        assert!(verify_index_health(&ebf, &indices).is_ok());
    }

    #[test]
    fn orphan_detection_finds_ids_absent_from_by_id() {
        let dir = TempDir::new().unwrap();
        let mut ebf = EbfFile::open(dir.path().join("d.ebf")).unwrap();
        ebf.append(&entity("e1", "type:task"), 1).unwrap();

        let empty_indices = Indices::new();
        let orphans = find_orphaned_entries(&ebf, &empty_indices).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].as_str(), "e1");
    }

    #[test]
    fn health_score_is_100_for_a_clean_store() {
        let metrics = IntegrityMetrics {
            total_entities: 10,
            corrupted_count: 0,
            orphan_count: 0,
            checksum_coverage: 1.0,
            operation_success_rate: 1.0,
            index_healthy: true,
            wal_size_bytes: 0,
            last_checkpoint_lsn: 0,
        };
        assert_eq!(metrics.health_score(), 100);
    }

    #[test]
    fn health_score_drops_with_corruption_and_unhealthy_index() {
        let metrics = IntegrityMetrics {
            total_entities: 10,
            corrupted_count: 5,
            orphan_count: 2,
            checksum_coverage: 0.5,
            operation_success_rate: 0.80,
            index_healthy: false,
            wal_size_bytes: 0,
            last_checkpoint_lsn: 0,
        };
        assert!(metrics.health_score() < 70);
    }
}
