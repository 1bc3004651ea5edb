//! In-memory [`VectorIndex`] implementation for tests and embedding callers
//! that need no persistence.
//!
//! Chunks live in a `BTreeMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every stored vector.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::Chunk;

use super::{rank_candidates, ChunkCandidate, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

pub struct InMemoryIndex {
    collection: String,
    chunks: RwLock<BTreeMap<(String, usize), StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            chunks: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<(String, usize), StoredChunk>> {
        self.chunks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<(String, usize), StoredChunk>> {
        self.chunks.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        self.write().insert(
            (chunk.source_file.clone(), chunk.chunk_index),
            StoredChunk {
                chunk: chunk.clone(),
                embedding: embedding.to_vec(),
            },
        );
        Ok(())
    }

    async fn add_many(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }
        let mut stored = self.write();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            stored.insert(
                (chunk.source_file.clone(), chunk.chunk_index),
                StoredChunk {
                    chunk: chunk.clone(),
                    embedding: embedding.clone(),
                },
            );
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ChunkCandidate>> {
        let candidates = self
            .read()
            .values()
            .map(|sc| ChunkCandidate {
                source_file: sc.chunk.source_file.clone(),
                chunk_index: sc.chunk.chunk_index,
                text: sc.chunk.text.clone(),
                subject: sc.chunk.subject.clone(),
                distance: cosine_distance(embedding, &sc.embedding),
            })
            .collect();
        Ok(rank_candidates(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read().len())
    }

    async fn subject_counts(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for sc in self.read().values() {
            *counts.entry(sc.chunk.subject.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn drop_all(&self) -> Result<()> {
        self.write().clear();
        Ok(())
    }
}
