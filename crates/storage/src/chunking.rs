//! Splitting oversize content into child entities, and reassembling it
//!
//! Spec §4.5: content over `chunk_threshold_bytes` is split into chunks of
//! `chunk_size_bytes`, stored as child entities with deterministic ids
//! (`<parent>-chunk-<i>`, invariant I3). The parent carries `content:chunks:N`,
//! `content:chunk-size:S`, `content:size:T`, `content:type:<mime>` and a
//! SHA-256 checksum tag; the parent's own `content` is left empty.

use entitydb_core::{EntityId, Error};
use futures::stream::{self, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};

/// Default bound on concurrent chunk fetches during reassembly (spec §4.5,
/// §5 "Suspension points").
pub const DEFAULT_REASSEMBLE_CONCURRENCY: usize = 4;

/// The tags and child payloads produced by splitting oversize content.
pub struct ChunkPlan {
    /// Number of chunks (`content:chunks:N`).
    pub chunk_count: usize,
    /// Size of every full chunk except possibly the last (`content:chunk-size:S`).
    pub chunk_size: usize,
    /// Total content length (`content:size:T`).
    pub total_size: usize,
    /// Hex-encoded SHA-256 of the full content (`content:checksum:sha256:<hex>`).
    pub checksum_sha256: String,
    /// The chunk payloads, in order; child `i` gets `chunks[i]`.
    pub chunks: Vec<Vec<u8>>,
}

/// Split `content` into chunks of at most `chunk_size` bytes. Panics only if
/// `chunk_size` is zero, which callers must reject at config-load time.
pub fn plan_chunks(content: &[u8], chunk_size: usize) -> ChunkPlan {
    assert!(chunk_size > 0, "chunk_size must be positive");
    let mut hasher = Sha256::new();
    hasher.update(content);
    let checksum_sha256 = hex_encode(&hasher.finalize());

    let chunks: Vec<Vec<u8>> = content.chunks(chunk_size).map(|c| c.to_vec()).collect();
    ChunkPlan {
        chunk_count: chunks.len(),
        chunk_size,
        total_size: content.len(),
        checksum_sha256,
        chunks,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").unwrap();
    }
    s
}

/// Abstraction over "fetch this child chunk's content by id", so the
/// reassemble/stream algorithms don't need to know about the engine or
/// storage layer directly.
#[async_trait::async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Fetch the raw content of chunk entity `id`.
    async fn fetch_chunk(&self, id: &EntityId) -> Result<Vec<u8>, Error>;
}

/// Fetch up to `concurrency` chunks of `parent` at a time, assemble them in
/// index order, and verify `total_size`/`expected_sha256` (spec §4.5
/// "Reassemble"). Any missing or corrupt chunk fails the whole read.
pub async fn reassemble(
    fetcher: &dyn ChunkFetcher,
    parent: &EntityId,
    chunk_count: usize,
    total_size: usize,
    expected_sha256: Option<&str>,
    concurrency: usize,
) -> Result<Vec<u8>, Error> {
    let child_ids: Vec<EntityId> = (0..chunk_count).map(|i| parent.chunk_child(i)).collect();
    let chunks: Vec<Vec<u8>> = stream::iter(child_ids.iter())
        .map(|id| fetcher.fetch_chunk(id))
        .buffered(concurrency.max(1))
        .try_collect()
        .await
        .map_err(|e| e.context(format!("reassemble {parent}")))?;

    let mut assembled = Vec::with_capacity(total_size);
    for chunk in chunks {
        assembled.extend_from_slice(&chunk);
    }

    if assembled.len() != total_size {
        return Err(Error::Corrupted(format!(
            "reassembled {parent}: expected {total_size} bytes, got {}",
            assembled.len()
        )));
    }
    if let Some(expected) = expected_sha256 {
        let mut hasher = Sha256::new();
        hasher.update(&assembled);
        let actual = hex_encode(&hasher.finalize());
        if actual != expected {
            return Err(Error::Corrupted(format!(
                "reassembled {parent}: checksum mismatch, expected {expected}, got {actual}"
            )));
        }
    }
    Ok(assembled)
}

/// Ordered chunk ids for a streaming read (spec §4.5 "Stream"): the caller
/// fetches and writes each one in turn, aborting the connection rather than
/// serving truncated bytes on any failure.
pub fn stream_chunk_ids(parent: &EntityId, chunk_count: usize) -> Vec<EntityId> {
    (0..chunk_count).map(|i| parent.chunk_child(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapFetcher(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait::async_trait]
    impl ChunkFetcher for MapFetcher {
        async fn fetch_chunk(&self, id: &EntityId) -> Result<Vec<u8>, Error> {
            self.0
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))
        }
    }

    #[test]
    fn plan_chunks_splits_evenly_and_remainder() {
        let content = vec![0u8; 10];
        let plan = plan_chunks(&content, 4);
        assert_eq!(plan.chunk_count, 3);
        assert_eq!(plan.chunks[0].len(), 4);
        assert_eq!(plan.chunks[2].len(), 2);
        assert_eq!(plan.total_size, 10);
    }

    #[tokio::test]
    async fn reassemble_round_trips_and_verifies_checksum() {
        let content: Vec<u8> = (0..20u8).collect();
        let plan = plan_chunks(&content, 6);
        let parent = EntityId::from("p1");

        let mut map = HashMap::new();
        for (i, chunk) in plan.chunks.iter().enumerate() {
            map.insert(parent.chunk_child(i).as_str().to_string(), chunk.clone());
        }
        let fetcher = MapFetcher(Mutex::new(map));

        let out = reassemble(
            &fetcher,
            &parent,
            plan.chunk_count,
            plan.total_size,
            Some(&plan.checksum_sha256),
            2,
        )
        .await
        .unwrap();
        assert_eq!(out, content);
    }

    #[tokio::test]
    async fn reassemble_fails_on_missing_chunk() {
        let fetcher = MapFetcher(Mutex::new(HashMap::new()));
        let parent = EntityId::from("p1");
        let result = reassemble(&fetcher, &parent, 2, 10, None, 4).await;
        assert!(result.is_err());
    }
}
