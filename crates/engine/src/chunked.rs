//! Chunked content (spec §4.5): splitting oversize writes into child
//! entities and reassembling/streaming them back.
//!
//! Glues [`entitydb_storage::chunking`]'s pure split/reassemble algorithms
//! to the [`Repository`]: creating a parent to a content threshold carries
//! the metadata tags invariant I3 requires, and reads go through
//! [`RepositoryChunkFetcher`], which is just `Repository::read_raw` behind
//! the `ChunkFetcher` trait object the reassembly algorithm expects.

use entitydb_core::{Entity, EntityId, Error, Tag, Timestamp};
use entitydb_storage::chunking::{self, ChunkFetcher};

use crate::repository::Repository;

const TAG_CHUNKS: &str = "content:chunks:";
const TAG_CHUNK_SIZE: &str = "content:chunk-size:";
const TAG_SIZE: &str = "content:size:";
const TAG_TYPE: &str = "content:type:";
const TAG_CHECKSUM: &str = "content:checksum:sha256:";

fn bare_value(entity: &Entity, prefix: &str) -> Option<String> {
    entity
        .bare_view()
        .into_iter()
        .find_map(|t| t.0.strip_prefix(prefix).map(|s| s.to_string()))
}

/// Does `entity` carry the `content:chunks:N` marker (spec §4.5)?
pub fn is_chunked(entity: &Entity) -> bool {
    bare_value(entity, TAG_CHUNKS).is_some()
}

fn chunk_metadata(entity: &Entity) -> Result<(usize, usize, Option<String>), Error> {
    let chunk_count: usize = bare_value(entity, TAG_CHUNKS)
        .ok_or_else(|| Error::InvalidInput(format!("{} is not a chunked entity", entity.id)))?
        .parse()
        .map_err(|_| Error::Corrupted(format!("{} has a malformed content:chunks tag", entity.id)))?;
    let total_size: usize = bare_value(entity, TAG_SIZE)
        .ok_or_else(|| Error::Corrupted(format!("{} is missing content:size", entity.id)))?
        .parse()
        .map_err(|_| Error::Corrupted(format!("{} has a malformed content:size tag", entity.id)))?;
    let checksum = bare_value(entity, TAG_CHECKSUM);
    Ok((chunk_count, total_size, checksum))
}

/// Fetches a chunk child's content via a repository's own read path, for
/// `entitydb_storage::chunking::reassemble`.
struct RepositoryChunkFetcher<'a> {
    repo: &'a Repository,
}

#[async_trait::async_trait]
impl ChunkFetcher for RepositoryChunkFetcher<'_> {
    async fn fetch_chunk(&self, id: &EntityId) -> Result<Vec<u8>, Error> {
        self.repo.read_raw(id).map(|e| e.content)
    }
}

impl Repository {
    /// Create a chunked entity: split `content` per `chunk_size_bytes`,
    /// write each child, then the parent carrying the metadata tags spec
    /// §4.5 requires. The parent's own `content` is left empty.
    pub fn create_chunked(
        &self,
        mut tags: Vec<Tag>,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<Entity, Error> {
        let plan = chunking::plan_chunks(&content, self.config().chunk_size_bytes);
        let parent_id = EntityId::generate();

        for (i, chunk) in plan.chunks.iter().enumerate() {
            self.create_with_id(parent_id.chunk_child(i), Vec::new(), chunk.clone())?;
        }

        let now = Timestamp::now();
        tags.push(Tag::new(now, &format!("{TAG_CHUNKS}{}", plan.chunk_count))?);
        tags.push(Tag::new(now, &format!("{TAG_CHUNK_SIZE}{}", plan.chunk_size))?);
        tags.push(Tag::new(now, &format!("{TAG_SIZE}{}", plan.total_size))?);
        if let Some(mime) = content_type {
            tags.push(Tag::new(now, &format!("{TAG_TYPE}{mime}"))?);
        }
        tags.push(Tag::new(now, &format!("{TAG_CHECKSUM}{}", plan.checksum_sha256))?);

        self.create_with_id(parent_id, tags, Vec::new())
    }

    /// Fetch up to `reassemble_concurrency` chunks at a time, verify length
    /// and checksum, and return the full payload (spec §4.5 "Reassemble").
    pub async fn reassemble_chunked(&self, id: &EntityId) -> Result<Vec<u8>, Error> {
        let parent = self.get_by_id(id, false)?;
        let (chunk_count, total_size, checksum) = chunk_metadata(&parent)?;
        let fetcher = RepositoryChunkFetcher { repo: self };
        chunking::reassemble(
            &fetcher,
            id,
            chunk_count,
            total_size,
            checksum.as_deref(),
            self.config().reassemble_concurrency,
        )
        .await
    }

    /// Ordered chunk child ids for a streaming read (spec §4.5 "Stream");
    /// the caller fetches and writes each in turn via [`Repository::read_raw`]-
    /// equivalent access, aborting on the first failure.
    pub fn chunk_ids(&self, id: &EntityId) -> Result<Vec<EntityId>, Error> {
        let parent = self.get_by_id(id, false)?;
        let (chunk_count, _, _) = chunk_metadata(&parent)?;
        Ok(chunking::stream_chunk_ids(id, chunk_count))
    }

    /// Fetch a single chunk child's raw bytes, for the streaming read path.
    pub fn fetch_chunk(&self, id: &EntityId) -> Result<Vec<u8>, Error> {
        self.read_raw(id).map(|e| e.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use tempfile::TempDir;

    fn repo_with_chunk_size(chunk_size: usize) -> Repository {
        let dir = TempDir::new().unwrap().into_path();
        let config = EngineConfig {
            data_path: dir,
            chunk_size_bytes: chunk_size,
            ..EngineConfig::default()
        };
        Repository::open(config).unwrap()
    }

    #[tokio::test]
    async fn create_chunked_then_reassemble_round_trips() {
        let repo = repo_with_chunk_size(4);
        let content: Vec<u8> = (0..20u8).collect();
        let parent = repo
            .create_chunked(vec![], content.clone(), Some("application/octet-stream"))
            .unwrap();

        assert!(is_chunked(&parent));
        let out = repo.reassemble_chunked(&parent.id).await.unwrap();
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn chunk_ids_cover_every_child() {
        let repo = repo_with_chunk_size(4);
        let content: Vec<u8> = (0..10u8).collect();
        let parent = repo.create_chunked(vec![], content, None).unwrap();

        let ids = repo.chunk_ids(&parent.id).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], parent.id.chunk_child(0));
    }

    #[test]
    fn reassemble_metadata_rejects_a_non_chunked_entity() {
        let repo = repo_with_chunk_size(4);
        let entity = repo.create(vec![], b"small".to_vec()).unwrap();
        assert!(chunk_metadata(&repo.get_by_id(&entity.id, false).unwrap()).is_err());
    }
}
