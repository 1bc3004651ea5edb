//! Corpus fingerprints and the reindex decision.
//!
//! A [`FingerprintSnapshot`] records the content hash, size, and modification
//! time of every file that made it into the index. Comparing the persisted
//! snapshot with the current corpus decides whether the collection must be
//! dropped and rebuilt. Hash and size are authoritative; modification time
//! is carried for diagnostics only, so touching a file without changing it
//! does not trigger a rebuild.
//!
//! The snapshot also records the [`IndexSettings`] the vectors were built
//! with. Stored vectors are only comparable with queries embedded by the same
//! model at the same dimensionality, and chunk boundaries depend on the
//! chunking parameters, so a change to either forces a rebuild.
//!
//! Reading and writing snapshots is the app crate's job; this module only
//! compares them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunk::ChunkParams;

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub filename: String,
    pub content_hash: String,
    pub modified_time: i64,
    pub size: u64,
}

/// Embedder and chunker settings the stored vectors were built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub model: String,
    pub dims: usize,
    pub chunk_chars: usize,
    pub overlap_chars: usize,
    pub min_section_chars: usize,
    pub boilerplate_markers: Vec<String>,
}

impl IndexSettings {
    pub fn new(model: &str, dims: usize, params: &ChunkParams) -> Self {
        Self {
            model: model.to_string(),
            dims,
            chunk_chars: params.chunk_chars,
            overlap_chars: params.overlap_chars,
            min_section_chars: params.min_section_chars,
            boilerplate_markers: params.boilerplate_markers.clone(),
        }
    }

    /// `model (dims)`, as shown in reindex reasons.
    pub fn embedder_label(&self) -> String {
        format!("{} ({} dims)", self.model, self.dims)
    }

    fn same_embedder(&self, other: &IndexSettings) -> bool {
        self.model == other.model && self.dims == other.dims
    }

    fn same_chunking(&self, other: &IndexSettings) -> bool {
        self.chunk_chars == other.chunk_chars
            && self.overlap_chars == other.overlap_chars
            && self.min_section_chars == other.min_section_chars
            && self.boilerplate_markers == other.boilerplate_markers
    }
}

/// Persisted registry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSnapshot {
    pub version: u32,
    pub collection: String,
    pub settings: IndexSettings,
    /// Chunks in the collection when the snapshot was taken.
    pub chunk_count: usize,
    pub entries: Vec<FingerprintEntry>,
}

impl FingerprintSnapshot {
    /// Build a snapshot; entries are stored sorted by filename.
    pub fn new(
        collection: &str,
        settings: IndexSettings,
        chunk_count: usize,
        mut entries: Vec<FingerprintEntry>,
    ) -> Self {
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Self {
            version: SNAPSHOT_VERSION,
            collection: collection.to_string(),
            settings,
            chunk_count,
            entries,
        }
    }
}

/// Why a reindex is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexReason {
    NoSnapshot,
    Corrupt(String),
    CollectionChanged { previous: String, current: String },
    EmbedderChanged { previous: String, current: String },
    ChunkingChanged,
    FilesAdded(Vec<String>),
    FilesRemoved(Vec<String>),
    ContentChanged(Vec<String>),
    IndexMismatch { recorded: usize, actual: usize },
    Forced,
}

impl fmt::Display for ReindexReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReindexReason::NoSnapshot => write!(f, "no fingerprint snapshot"),
            ReindexReason::Corrupt(e) => write!(f, "fingerprint snapshot unreadable: {}", e),
            ReindexReason::CollectionChanged { previous, current } => {
                write!(f, "collection changed from '{}' to '{}'", previous, current)
            }
            ReindexReason::EmbedderChanged { previous, current } => {
                write!(f, "embedding model changed from {} to {}", previous, current)
            }
            ReindexReason::ChunkingChanged => write!(f, "chunking settings changed"),
            ReindexReason::FilesAdded(files) => write!(f, "files added: {}", files.join(", ")),
            ReindexReason::FilesRemoved(files) => {
                write!(f, "files removed: {}", files.join(", "))
            }
            ReindexReason::ContentChanged(files) => {
                write!(f, "files changed: {}", files.join(", "))
            }
            ReindexReason::IndexMismatch { recorded, actual } => write!(
                f,
                "index holds {} chunks but snapshot recorded {}",
                actual, recorded
            ),
            ReindexReason::Forced => write!(f, "reindex requested"),
        }
    }
}

/// Outcome of comparing the persisted snapshot against the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexDecision {
    UpToDate,
    Required(ReindexReason),
}

impl ReindexDecision {
    pub fn is_required(&self) -> bool {
        matches!(self, ReindexDecision::Required(_))
    }
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compare the corpus' current fingerprints against the last snapshot.
///
/// `collection` is the configured collection name, `settings` the embedder
/// and chunker in use now, and `index_count` the number of chunks the live
/// index holds.
pub fn compare(
    previous: Option<&FingerprintSnapshot>,
    current: &[FingerprintEntry],
    collection: &str,
    settings: &IndexSettings,
    index_count: usize,
) -> ReindexDecision {
    let previous = match previous {
        Some(p) => p,
        None => return ReindexDecision::Required(ReindexReason::NoSnapshot),
    };

    if previous.collection != collection {
        return ReindexDecision::Required(ReindexReason::CollectionChanged {
            previous: previous.collection.clone(),
            current: collection.to_string(),
        });
    }

    if !previous.settings.same_embedder(settings) {
        return ReindexDecision::Required(ReindexReason::EmbedderChanged {
            previous: previous.settings.embedder_label(),
            current: settings.embedder_label(),
        });
    }
    if !previous.settings.same_chunking(settings) {
        return ReindexDecision::Required(ReindexReason::ChunkingChanged);
    }

    let before: BTreeMap<&str, &FingerprintEntry> = previous
        .entries
        .iter()
        .map(|e| (e.filename.as_str(), e))
        .collect();
    let now: BTreeMap<&str, &FingerprintEntry> =
        current.iter().map(|e| (e.filename.as_str(), e)).collect();

    let added: Vec<String> = now
        .keys()
        .filter(|k| !before.contains_key(*k))
        .map(|k| k.to_string())
        .collect();
    if !added.is_empty() {
        return ReindexDecision::Required(ReindexReason::FilesAdded(added));
    }

    let removed: Vec<String> = before
        .keys()
        .filter(|k| !now.contains_key(*k))
        .map(|k| k.to_string())
        .collect();
    if !removed.is_empty() {
        return ReindexDecision::Required(ReindexReason::FilesRemoved(removed));
    }

    let changed: Vec<String> = now
        .iter()
        .filter(|(name, entry)| {
            before
                .get(*name)
                .is_some_and(|old| old.content_hash != entry.content_hash || old.size != entry.size)
        })
        .map(|(name, _)| name.to_string())
        .collect();
    if !changed.is_empty() {
        return ReindexDecision::Required(ReindexReason::ContentChanged(changed));
    }

    if previous.chunk_count != index_count {
        return ReindexDecision::Required(ReindexReason::IndexMismatch {
            recorded: previous.chunk_count,
            actual: index_count,
        });
    }

    ReindexDecision::UpToDate
}
