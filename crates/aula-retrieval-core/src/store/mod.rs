//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is everything the indexer and the query engine
//! need from a collection of embedded chunks. The in-memory implementation
//! lives in [`memory`]; the SQLite one lives in the app crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Chunk;

/// A chunk returned by a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkCandidate {
    pub source_file: String,
    pub chunk_index: usize,
    pub text: String,
    pub subject: String,
    /// Raw cosine distance to the query, `[0.0, 2.0]`.
    pub distance: f32,
}

/// A named collection of chunks with embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Upsert one chunk keyed by `(source_file, chunk_index)` |
/// | [`add_many`](VectorIndex::add_many) | Upsert a batch |
/// | [`query`](VectorIndex::query) | `k` nearest chunks, ascending by distance |
/// | [`count`](VectorIndex::count) | Number of chunks |
/// | [`subject_counts`](VectorIndex::subject_counts) | Chunks per subject |
/// | [`drop_all`](VectorIndex::drop_all) | Empty the collection |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name.
    fn collection(&self) -> &str;

    async fn add(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()>;

    /// Upsert `chunks[i]` with `embeddings[i]`. Fails without writing
    /// anything if the lengths differ.
    async fn add_many(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Up to `k` chunks nearest to `embedding`, ties broken by key.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ChunkCandidate>>;

    async fn count(&self) -> Result<usize>;

    async fn subject_counts(&self) -> Result<BTreeMap<String, usize>>;

    async fn drop_all(&self) -> Result<()>;
}

/// Order candidates ascending by distance, then by file and index, and keep
/// the first `k`.
pub fn rank_candidates(mut candidates: Vec<ChunkCandidate>, k: usize) -> Vec<ChunkCandidate> {
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.source_file.cmp(&b.source_file))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    candidates.truncate(k);
    candidates
}
