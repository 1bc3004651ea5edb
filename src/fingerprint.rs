//! Fingerprint snapshot persistence.
//!
//! The snapshot lives next to the vector store as `fingerprints.json`.
//! Writes go to `fingerprints.json.tmp` first and are renamed into place,
//! so a crash mid-write leaves the previous snapshot intact.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use aula_retrieval_core::fingerprint::{
    compare, FingerprintEntry, FingerprintSnapshot, IndexSettings, ReindexDecision,
    ReindexReason, SNAPSHOT_VERSION,
};

use crate::corpus::{fingerprint_file, CorpusFile};

pub struct FingerprintRegistry {
    path: PathBuf,
}

impl FingerprintRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted snapshot. `Ok(None)` if there is none yet.
    pub fn load(&self) -> Result<Option<FingerprintSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let snapshot: FingerprintSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            bail!(
                "unsupported fingerprint snapshot version {} (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(Some(snapshot))
    }

    /// Fingerprint every file. Unreadable files are logged and left out.
    pub fn snapshot(&self, files: &[CorpusFile]) -> Vec<FingerprintEntry> {
        files
            .iter()
            .filter_map(|file| match fingerprint_file(file) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(file = %file.relative, error = %e, "cannot fingerprint file");
                    None
                }
            })
            .collect()
    }

    /// Decide whether the collection must be rebuilt.
    ///
    /// An unreadable or corrupt snapshot is a reason to reindex, never an
    /// error. Snapshots written by an older format count as corrupt.
    pub fn needs_reindex(
        &self,
        current: &[FingerprintEntry],
        collection: &str,
        settings: &IndexSettings,
        index_count: usize,
    ) -> ReindexDecision {
        match self.load() {
            Ok(previous) => compare(previous.as_ref(), current, collection, settings, index_count),
            Err(e) => ReindexDecision::Required(ReindexReason::Corrupt(format!("{:#}", e))),
        }
    }

    /// Atomically replace the persisted snapshot.
    pub fn persist(&self, snapshot: &FingerprintSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.tmp_path();
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
