//! Core data models shared by the indexing and query paths.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Distance reported when no search was performed (empty index, small talk,
/// or a query too short to embed).
pub const SENTINEL_DISTANCE: f32 = 999.0;

/// A plain-text source document loaded for one indexing pass.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the corpus root, using `/` separators.
    pub path: String,
    pub raw_text: String,
    pub subject: String,
    /// SHA-256 of the raw bytes, lowercase hex.
    pub content_hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, Unix seconds.
    pub modified_time: i64,
}

/// A passage of a source document, the unit of embedding and retrieval.
///
/// Identity is `(source_file, chunk_index)`, see [`Chunk::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_file: String,
    pub chunk_index: usize,
    pub text: String,
    pub subject: String,
    /// Length of `text` in characters.
    pub size: usize,
    pub total_chunks: usize,
}

impl Chunk {
    /// Storage key: `"{source_file}_{chunk_index}"`.
    pub fn key(&self) -> String {
        chunk_key(&self.source_file, self.chunk_index)
    }
}

pub fn chunk_key(source_file: &str, chunk_index: usize) -> String {
    format!("{}_{}", source_file, chunk_index)
}

/// Result of a search: the context handed to the generator, the files it
/// came from, and the best adjusted distance seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub context: String,
    pub sources: Vec<String>,
    pub best_distance: f32,
}

impl SearchOutcome {
    /// The "did not search" result.
    pub fn sentinel() -> Self {
        Self::empty(SENTINEL_DISTANCE)
    }

    /// The "searched but nothing usable" result.
    pub fn empty(best_distance: f32) -> Self {
        Self {
            context: String::new(),
            sources: Vec::new(),
            best_distance,
        }
    }

    pub fn has_context(&self) -> bool {
        !self.context.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Empty,
    Active,
}

/// Aggregate counts over the live index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub per_subject: BTreeMap<String, usize>,
    pub status: IndexStatus,
}

impl IndexStats {
    pub fn from_counts(per_subject: BTreeMap<String, usize>) -> Self {
        let total_chunks = per_subject.values().sum();
        let status = if total_chunks == 0 {
            IndexStatus::Empty
        } else {
            IndexStatus::Active
        };
        Self {
            total_chunks,
            per_subject,
            status,
        }
    }
}

/// Lifecycle of a retrieval system.
///
/// `Uninitialized -> Loading -> Ready | Failed`. A reindex passes through
/// `Loading` again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum Readiness {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Uninitialized => write!(f, "uninitialized"),
            Readiness::Loading => write!(f, "loading"),
            Readiness::Ready => write!(f, "ready"),
            Readiness::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_key() {
        let chunk = Chunk {
            source_file: "matematicas.txt".to_string(),
            chunk_index: 3,
            text: "x".to_string(),
            subject: "matematicas".to_string(),
            size: 1,
            total_chunks: 4,
        };
        assert_eq!(chunk.key(), "matematicas.txt_3");
    }

    #[test]
    fn test_stats_status() {
        let empty = IndexStats::from_counts(BTreeMap::new());
        assert_eq!(empty.status, IndexStatus::Empty);
        assert_eq!(empty.total_chunks, 0);

        let mut counts = BTreeMap::new();
        counts.insert("matematicas".to_string(), 4);
        counts.insert("general".to_string(), 2);
        let active = IndexStats::from_counts(counts);
        assert_eq!(active.status, IndexStatus::Active);
        assert_eq!(active.total_chunks, 6);
    }

    #[test]
    fn test_stats_serializes_lowercase_status() {
        let stats = IndexStats::from_counts(BTreeMap::new());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["status"], "empty");
    }

    #[test]
    fn test_sentinel_outcome() {
        let outcome = SearchOutcome::sentinel();
        assert!(!outcome.has_context());
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.best_distance, SENTINEL_DISTANCE);
    }
}
