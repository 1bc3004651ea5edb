//! Indexing pipeline orchestration.
//!
//! Coordinates a full rebuild: drop the collection → load each file →
//! chunk → classify → embed → store, then persist the fingerprint snapshot.
//! Failures are isolated per file: an unreadable file or a failed embedding
//! batch is logged, the file is left out of the snapshot, and indexing
//! continues with the next file.

use anyhow::Result;
use serde::Serialize;

use aula_retrieval_core::chunk::{build_chunks, chunk_text};
use aula_retrieval_core::embedding::Embedder;
use aula_retrieval_core::fingerprint::{FingerprintEntry, FingerprintSnapshot, IndexSettings};
use aula_retrieval_core::models::{Chunk, Document};
use aula_retrieval_core::store::VectorIndex;

use crate::config::Config;
use crate::corpus::{load_document, CorpusFile};
use crate::fingerprint::FingerprintRegistry;
use crate::system::RetrievalSystem;

/// Summary of one indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// `false` when the fingerprints matched and nothing was rebuilt.
    pub rebuilt: bool,
    /// Why the rebuild happened, when it did.
    pub reason: Option<String>,
    pub files_seen: usize,
    pub files_indexed: usize,
    /// Files left out of the index (unreadable or failed to embed).
    pub files_failed: Vec<String>,
    pub chunks_written: usize,
    pub total_chunks: usize,
}

/// Run the `index` / `reindex` commands and print the report.
pub async fn run_index(system: &RetrievalSystem, force: bool, json: bool) -> Result<()> {
    let report = if force {
        system.reindex().await?
    } else {
        system.initialize().await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

pub fn format_report(report: &IndexReport) -> String {
    let mut out = String::new();
    if report.rebuilt {
        out.push_str(&format!(
            "Index rebuilt ({})\n",
            report.reason.as_deref().unwrap_or("requested")
        ));
    } else {
        out.push_str("Index up to date\n");
    }
    out.push_str(&format!("  files seen:     {}\n", report.files_seen));
    out.push_str(&format!("  files indexed:  {}\n", report.files_indexed));
    out.push_str(&format!("  chunks written: {}\n", report.chunks_written));
    out.push_str(&format!("  total chunks:   {}\n", report.total_chunks));
    if !report.files_failed.is_empty() {
        out.push_str(&format!("  skipped:        {}\n", report.files_failed.join(", ")));
    }
    out
}

/// Settings recorded in the snapshot and compared on the next open.
pub fn index_settings(config: &Config, embedder: &dyn Embedder) -> IndexSettings {
    IndexSettings::new(embedder.model_name(), embedder.dims(), &config.chunking.params())
}

/// Drop the collection and rebuild it from `files`.
pub async fn rebuild(
    config: &Config,
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    registry: &FingerprintRegistry,
    files: &[CorpusFile],
) -> Result<IndexReport> {
    index.drop_all().await?;

    let chunk_params = config.chunking.params();
    let classifier = config.subjects.classifier();
    let mut report = IndexReport {
        rebuilt: true,
        files_seen: files.len(),
        ..IndexReport::default()
    };
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        let doc = match load_document(file, &classifier) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(file = %file.relative, error = %format!("{:#}", e), "skipping unreadable file");
                report.files_failed.push(file.relative.clone());
                continue;
            }
        };

        let chunks = build_chunks(&doc.path, &doc.subject, chunk_text(&doc.raw_text, &chunk_params));

        match store_chunks(index, embedder, &chunks, config.embedding.batch_size).await {
            Ok(()) => {
                tracing::debug!(
                    file = %doc.path,
                    subject = %doc.subject,
                    chunks = chunks.len(),
                    "indexed file"
                );
                report.files_indexed += 1;
                report.chunks_written += chunks.len();
                entries.push(entry_for(&doc));
            }
            Err(e) => {
                tracing::warn!(file = %doc.path, error = %format!("{:#}", e), "failed to index file");
                report.files_failed.push(doc.path.clone());
            }
        }
    }

    report.total_chunks = index.count().await?;
    registry.persist(&FingerprintSnapshot::new(
        index.collection(),
        index_settings(config, embedder),
        report.total_chunks,
        entries,
    ))?;

    tracing::info!(
        files = report.files_indexed,
        failed = report.files_failed.len(),
        chunks = report.total_chunks,
        "index rebuilt"
    );

    Ok(report)
}

/// Embed in batches, then store the whole file at once so a failure never
/// leaves half a file in the index.
async fn store_chunks(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<()> {
    if chunks.is_empty() {
        return Ok(());
    }

    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != texts.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                texts.len()
            );
        }
        embeddings.extend(vectors);
    }

    index.add_many(chunks, &embeddings).await
}

fn entry_for(doc: &Document) -> FingerprintEntry {
    FingerprintEntry {
        filename: doc.path.clone(),
        content_hash: doc.content_hash.clone(),
        modified_time: doc.modified_time,
        size: doc.size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::scan_corpus;
    use async_trait::async_trait;
    use aula_retrieval_core::embedding::HashedEmbedder;
    use aula_retrieval_core::store::memory::InMemoryIndex;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Fails any batch containing the word `FALLA`.
    struct FlakyEmbedder(HashedEmbedder);

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dims(&self) -> usize {
            self.0.dims()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("FALLA")) {
                anyhow::bail!("embedding backend unavailable");
            }
            self.0.embed(texts).await
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn test_rebuild_isolates_failed_files() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("docs");
        std::fs::create_dir_all(&corpus).unwrap();
        std::fs::write(
            corpus.join("bueno.txt"),
            "La suma es una operación que junta dos cantidades para obtener un total.",
        )
        .unwrap();
        std::fs::write(
            corpus.join("malo.txt"),
            "Este texto FALLA al calcular su vector porque el servicio no responde a tiempo.",
        )
        .unwrap();
        std::fs::write(corpus.join("roto.txt"), [0xff, 0xfe, 0x00, 0x41]).unwrap();
        std::fs::write(corpus.join("vacio.txt"), "").unwrap();

        let config = Config::minimal(&corpus, tmp.path().join("data"));
        std::fs::create_dir_all(&config.storage.dir).unwrap();
        let files = scan_corpus(&config.corpus).unwrap();
        let registry = FingerprintRegistry::new(config.storage.fingerprints_path());
        let index = InMemoryIndex::new("educational_docs");
        let embedder = FlakyEmbedder(HashedEmbedder::default());

        let report = rebuild(&config, &index, &embedder, &registry, &files)
            .await
            .unwrap();

        assert!(report.rebuilt);
        assert_eq!(report.files_seen, 4);
        assert_eq!(report.files_indexed, 3);
        assert_eq!(report.files_failed, vec!["malo.txt"]);
        assert_eq!(report.chunks_written, 1);
        assert_eq!(report.total_chunks, 1);

        // Undecodable bytes are dropped; the file is recorded so the next
        // open does not see it as new.
        let snapshot = registry.load().unwrap().unwrap();
        let names: Vec<_> = snapshot.entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["bueno.txt", "roto.txt", "vacio.txt"]);
        assert_eq!(snapshot.chunk_count, 1);
        assert_eq!(snapshot.collection, "educational_docs");
        assert_eq!(snapshot.settings, index_settings(&config, &embedder));
        assert_eq!(snapshot.settings.model, "flaky");
        assert_eq!(snapshot.settings.dims, 384);
        assert_eq!(snapshot.settings.chunk_chars, 400);

        assert!(logs_contain("dropping undecodable bytes"));
        assert!(logs_contain("failed to index file"));
    }

    #[test]
    fn test_format_report() {
        let report = IndexReport {
            rebuilt: true,
            reason: Some("no fingerprint snapshot".to_string()),
            files_seen: 3,
            files_indexed: 2,
            files_failed: vec!["roto.txt".to_string()],
            chunks_written: 7,
            total_chunks: 7,
        };
        let out = format_report(&report);
        assert!(out.starts_with("Index rebuilt (no fingerprint snapshot)\n"));
        assert!(out.contains("skipped:        roto.txt"));

        let out = format_report(&IndexReport::default());
        assert!(out.starts_with("Index up to date\n"));
        assert!(!out.contains("skipped"));
    }
}
