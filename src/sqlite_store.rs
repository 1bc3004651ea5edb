//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Chunks and their embeddings share one `chunks` table keyed by
//! `(collection, id)`, with vectors stored as little-endian `f32` blobs.
//! Queries are a brute-force cosine scan over the collection, which is
//! plenty for a corpus of a few hundred chunks.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use aula_retrieval_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use aula_retrieval_core::models::Chunk;
use aula_retrieval_core::store::{rank_candidates, ChunkCandidate, VectorIndex};

use crate::{db, migrate};

const UPSERT_CHUNK: &str = r#"
    INSERT INTO chunks (collection, id, source_file, chunk_index, text, subject,
                        size, total_chunks, embedding)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(collection, id) DO UPDATE SET
        source_file = excluded.source_file,
        chunk_index = excluded.chunk_index,
        text = excluded.text,
        subject = excluded.subject,
        size = excluded.size,
        total_chunks = excluded.total_chunks,
        embedding = excluded.embedding
"#;

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

impl SqliteIndex {
    /// Open (creating if needed) the database at `path` and make sure
    /// `collection` exists.
    pub async fn open(path: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        sqlx::query(UPSERT_CHUNK)
            .bind(&self.collection)
            .bind(chunk.key())
            .bind(&chunk.source_file)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(&chunk.subject)
            .bind(chunk.size as i64)
            .bind(chunk.total_chunks as i64)
            .bind(vec_to_blob(embedding))
            .execute(&self.pool)
            .await?;
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

        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            sqlx::query(UPSERT_CHUNK)
                .bind(&self.collection)
                .bind(chunk.key())
                .bind(&chunk.source_file)
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.text)
                .bind(&chunk.subject)
                .bind(chunk.size as i64)
                .bind(chunk.total_chunks as i64)
                .bind(vec_to_blob(embedding))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT source_file, chunk_index, text, subject, embedding
            FROM chunks
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let chunk_index: i64 = row.get("chunk_index");
                ChunkCandidate {
                    source_file: row.get("source_file"),
                    chunk_index: chunk_index as usize,
                    text: row.get("text"),
                    subject: row.get("subject"),
                    distance: cosine_distance(embedding, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(rank_candidates(candidates, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn subject_counts(&self) -> Result<BTreeMap<String, usize>> {
        let rows = sqlx::query(
            r#"
            SELECT subject, COUNT(*) AS n
            FROM chunks
            WHERE collection = ?
            GROUP BY subject
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let n: i64 = row.get("n");
                (row.get::<String, _>("subject"), n as usize)
            })
            .collect())
    }

    async fn drop_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(file: &str, idx: usize, subject: &str, text: &str) -> Chunk {
        Chunk {
            source_file: file.to_string(),
            chunk_index: idx,
            text: text.to_string(),
            subject: subject.to_string(),
            size: text.chars().count(),
            total_chunks: 2,
        }
    }

    #[tokio::test]
    async fn test_upsert_query_and_counts() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("vectors.sqlite"), "docs")
            .await
            .unwrap();

        index
            .add_many(
                &[
                    chunk("matematicas.txt", 0, "matematicas", "La suma"),
                    chunk("matematicas.txt", 1, "matematicas", "La resta"),
                    chunk("ingles.txt", 0, "ingles", "Colors"),
                ],
                &[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        // Re-adding the same key replaces it.
        index
            .add(&chunk("matematicas.txt", 0, "matematicas", "La suma"), &[1.0, 0.0])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 3);
        let counts = index.subject_counts().await.unwrap();
        assert_eq!(counts.get("matematicas"), Some(&2));
        assert_eq!(counts.get("ingles"), Some(&1));

        let hits = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "La suma");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].text, "La resta");
        assert!((hits[1].distance - 0.4).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_collections_are_isolated_and_persist() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.sqlite");

        let a = SqliteIndex::open(&path, "a").await.unwrap();
        let b = SqliteIndex::open(&path, "b").await.unwrap();
        a.add(&chunk("x.txt", 0, "general", "uno"), &[1.0]).await.unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 0);
        a.close().await;
        b.close().await;

        let reopened = SqliteIndex::open(&path, "a").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        reopened.drop_all().await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 0);
    }
}
