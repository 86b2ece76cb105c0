//! Secondary indices
//!
//! Three maps, all kept in memory and rebuilt from a full [`crate::ebf::EbfFile::scan`]
//! on startup (or lazily via [`crate::recovery::reindex`]):
//!
//! - `ById`: entity id -> latest EBF offset. The only index strictly needed
//!   to serve `GetByID`; the other two exist purely to avoid a full scan for
//!   `ListByTag`/`ListByTags` and RBAC's wildcard permission lookups.
//! - `ByTag`: bare tag -> set of entity ids currently carrying it.
//! - `ByPrefix`: namespace prefix (`rbac:perm:entity:`) -> set of bare tags
//!   seen under that prefix, so a wildcard permission check doesn't have to
//!   enumerate every tag in the store.
//!
//! Modeled directly on the teacher's `RunIndex`/`TypeIndex`: a
//! `HashMap<K, HashSet<V>>` with `insert`/`remove` that prunes the entry
//! once its set goes empty, so the maps never accumulate dead keys.

use entitydb_core::EntityId;
use rustc_hash::FxHashMap as HashMap;
use std::collections::HashSet;

/// Entity id -> latest EBF offset, plus the WAL intent LSN that record
/// absorbed. The LSN is what lets recovery replay idempotently: an intent
/// whose LSN is already `<=` the entity's recorded LSN has already been
/// folded into the EBF and must be skipped.
#[derive(Debug, Default)]
pub struct ById {
    entries: HashMap<EntityId, (u64, u64)>,
}

impl ById {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or update) the latest offset and absorbed LSN for `id`.
    pub fn set(&mut self, id: EntityId, offset: u64, lsn: u64) {
        self.entries.insert(id, (offset, lsn));
    }

    /// Latest offset for `id`, if it exists.
    pub fn get(&self, id: &EntityId) -> Option<u64> {
        self.entries.get(id).map(|(offset, _)| *offset)
    }

    /// Highest WAL intent LSN already absorbed into `id`'s latest record.
    pub fn get_lsn(&self, id: &EntityId) -> Option<u64> {
        self.entries.get(id).map(|(_, lsn)| *lsn)
    }

    /// Remove `id` from the index entirely (used when purging chunk
    /// children that are never looked up directly).
    pub fn remove(&mut self, id: &EntityId) {
        self.entries.remove(id);
    }

    /// Every known id, for full scans (`List`, integrity checks).
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    /// Number of distinct entities indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bare tag -> ids currently carrying it.
#[derive(Debug, Default)]
pub struct ByTag {
    index: HashMap<String, HashSet<EntityId>>,
}

impl ByTag {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` currently carries bare tag `tag`.
    pub fn insert(&mut self, tag: String, id: EntityId) {
        self.index.entry(tag).or_default().insert(id);
    }

    /// Remove the `(tag, id)` association, pruning the tag entry if it's
    /// now empty. Called whenever a bare tag's current value changes (the
    /// old value needs to be evicted from its old key).
    pub fn remove(&mut self, tag: &str, id: &EntityId) {
        if let Some(ids) = self.index.get_mut(tag) {
            ids.remove(id);
            if ids.is_empty() {
                self.index.remove(tag);
            }
        }
    }

    /// Ids currently carrying exactly this bare tag.
    pub fn get(&self, tag: &str) -> Option<&HashSet<EntityId>> {
        self.index.get(tag)
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of distinct tags indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }
}

/// Namespace prefix -> bare tags seen under it, for wildcard matching.
#[derive(Debug, Default)]
pub struct ByPrefix {
    index: HashMap<String, HashSet<String>>,
}

impl ByPrefix {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that bare tag `tag` is reachable under each of `prefixes`
    /// (see [`entitydb_core::BareTag::prefixes`]).
    pub fn insert(&mut self, prefixes: &[String], tag: &str) {
        for prefix in prefixes {
            self.index
                .entry(prefix.clone())
                .or_default()
                .insert(tag.to_string());
        }
    }

    /// Remove `tag` from every prefix bucket it was registered under,
    /// pruning buckets that become empty.
    pub fn remove(&mut self, prefixes: &[String], tag: &str) {
        for prefix in prefixes {
            if let Some(tags) = self.index.get_mut(prefix) {
                tags.remove(tag);
                if tags.is_empty() {
                    self.index.remove(prefix);
                }
            }
        }
    }

    /// Bare tags registered directly under `prefix`.
    pub fn get(&self, prefix: &str) -> Option<&HashSet<String>> {
        self.index.get(prefix)
    }

    /// True if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// The three secondary indices, bundled so storage/engine code only has to
/// pass one value around.
#[derive(Debug, Default)]
pub struct Indices {
    /// Latest offset per entity id.
    pub by_id: ById,
    /// Ids per current bare tag.
    pub by_tag: ByTag,
    /// Bare tags per namespace prefix.
    pub by_prefix: ByPrefix,
}

impl Indices {
    /// Empty set of indices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `id`'s current bare view is `current_tags`, replacing
    /// whatever was previously indexed for `id` under `old_tags`.
    pub fn reindex_entity(
        &mut self,
        id: &EntityId,
        old_tags: &[String],
        current_tags: &[String],
    ) {
        for tag in old_tags {
            self.by_tag.remove(tag, id);
            self.by_prefix
                .remove(&entitydb_core::BareTag::from(tag.as_str()).prefixes(), tag);
        }
        for tag in current_tags {
            self.by_tag.insert(tag.clone(), id.clone());
            self.by_prefix
                .insert(&entitydb_core::BareTag::from(tag.as_str()).prefixes(), tag);
        }
    }
}
