//! Diagnostics report: what is on disk, what is indexed, and how a fixed set
//! of probe questions fare against the current index.

use anyhow::Result;
use serde::Serialize;

use aula_retrieval_core::models::IndexStats;
use aula_retrieval_core::search::EngineCacheStats;

use crate::corpus::scan_corpus;
use crate::system::RetrievalSystem;

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: String,
    pub readiness: String,
    pub corpus_dir: String,
    pub collection: String,
    pub embedding_model: String,
    pub stats: IndexStats,
    pub files: Vec<FileReport>,
    pub probes: Vec<ProbeReport>,
    pub caches: EngineCacheStats,
}

/// One eligible file on disk.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub size: u64,
    pub lines: usize,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub query: String,
    pub found_context: bool,
    pub context_length: usize,
    pub sources: Vec<String>,
    pub best_distance: f32,
}

/// Build the report. Requires a ready system.
pub async fn collect(system: &RetrievalSystem) -> Result<DiagnosticsReport> {
    let config = system.config();
    let stats = system.stats().await?;

    let preview_chars = config.diagnostics.preview_chars;
    let files = scan_corpus(&config.corpus)?
        .into_iter()
        .map(|file| match std::fs::read(&file.path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                FileReport {
                    name: file.relative,
                    size: bytes.len() as u64,
                    lines: text.lines().count(),
                    preview: text.chars().take(preview_chars).collect(),
                    error: None,
                }
            }
            Err(e) => FileReport {
                name: file.relative,
                size: file.size,
                lines: 0,
                preview: String::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    let mut probes = Vec::with_capacity(config.diagnostics.probe_queries.len());
    for query in &config.diagnostics.probe_queries {
        let outcome = system
            .search(query, config.retrieval.default_results)
            .await?;
        probes.push(ProbeReport {
            query: query.clone(),
            found_context: outcome.has_context(),
            context_length: outcome.context.chars().count(),
            sources: outcome.sources,
            best_distance: outcome.best_distance,
        });
    }

    Ok(DiagnosticsReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        readiness: system.readiness().to_string(),
        corpus_dir: config.corpus.dir.display().to_string(),
        collection: config.storage.collection.clone(),
        embedding_model: system.embedder().model_name().to_string(),
        stats,
        files,
        probes,
        caches: system.engine().cache_stats(),
    })
}

/// Run the diagnostics command: print the report as JSON.
pub async fn run_diagnostics(system: &RetrievalSystem) -> Result<()> {
    let report = collect(system).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
