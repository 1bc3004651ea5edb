//! The retrieval system: one corpus, one collection, one embedder.
//!
//! [`RetrievalSystem`] owns every long-lived handle (vector index, embedder,
//! query engine, fingerprint registry) and drives the readiness state
//! machine:
//!
//! ```text
//! Uninitialized ──initialize──▶ Loading ──▶ Ready
//!                                  │
//!                                  └──────▶ Failed
//! ```
//!
//! A reindex passes through `Loading` again. Searches hold a read guard on
//! the maintenance lock and a reindex holds the write guard, so a search
//! never observes a half-built collection.

use std::sync::{Arc, RwLock};

use anyhow::Result;

use aula_retrieval_core::embedding::Embedder;
use aula_retrieval_core::fingerprint::{ReindexDecision, ReindexReason};
use aula_retrieval_core::models::{IndexStats, Readiness, SearchOutcome};
use aula_retrieval_core::search::QueryEngine;
use aula_retrieval_core::store::VectorIndex;
use aula_retrieval_core::RetrievalError;

use crate::config::Config;
use crate::corpus::scan_corpus;
use crate::diagnostics::{self, DiagnosticsReport};
use crate::embedding::create_embedder;
use crate::fingerprint::FingerprintRegistry;
use crate::indexer::{self, IndexReport};
use crate::sqlite_store::SqliteIndex;

pub struct RetrievalSystem {
    config: Config,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    engine: QueryEngine,
    registry: FingerprintRegistry,
    readiness: RwLock<Readiness>,
    maintenance: tokio::sync::RwLock<()>,
}

impl RetrievalSystem {
    /// Build an uninitialized system with the configured embedder and the
    /// SQLite vector store.
    ///
    /// Fails with [`RetrievalError::CorpusNotFound`] if the corpus directory
    /// does not exist.
    pub async fn new(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::with_embedder(config, embedder).await
    }

    /// Like [`new`](Self::new) with a caller-supplied embedder.
    pub async fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        ensure_corpus(&config)?;
        let index = SqliteIndex::open(
            &config.storage.vectors_path(),
            &config.storage.collection,
        )
        .await?;
        Self::with_components(config, Arc::new(index), embedder)
    }

    /// Assemble a system from explicit parts.
    pub fn with_components(
        config: Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        ensure_corpus(&config)?;
        let engine = QueryEngine::new(index.clone(), embedder.clone(), config.retrieval.params());
        let registry = FingerprintRegistry::new(config.storage.fingerprints_path());
        Ok(Self {
            config,
            index,
            embedder,
            engine,
            registry,
            readiness: RwLock::new(Readiness::Uninitialized),
            maintenance: tokio::sync::RwLock::new(()),
        })
    }

    /// [`new`](Self::new) followed by [`initialize`](Self::initialize).
    pub async fn open(config: Config) -> Result<Self> {
        let system = Self::new(config).await?;
        system.initialize().await?;
        Ok(system)
    }

    /// Load the embedder and index the corpus if its fingerprints changed.
    pub async fn initialize(&self) -> Result<IndexReport> {
        self.refresh(false).await
    }

    /// Drop the collection and rebuild it regardless of fingerprints.
    pub async fn reindex(&self) -> Result<IndexReport> {
        self.refresh(true).await
    }

    /// Run the gated search. See [`QueryEngine::search`].
    pub async fn search(&self, query: &str, desired_results: usize) -> Result<SearchOutcome> {
        let _guard = self.maintenance.read().await;
        self.ensure_ready()?;
        self.engine.search(query, desired_results).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let _guard = self.maintenance.read().await;
        self.ensure_ready()?;
        self.engine.stats().await
    }

    pub async fn diagnostics(&self) -> Result<DiagnosticsReport> {
        diagnostics::collect(self).await
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn set_readiness(&self, state: Readiness) {
        tracing::debug!(state = %state, "readiness changed");
        match self.readiness.write() {
            Ok(mut guard) => *guard = state,
            Err(e) => *e.into_inner() = state,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        let state = self.readiness();
        if state.is_ready() {
            Ok(())
        } else {
            Err(RetrievalError::NotReady(state).into())
        }
    }

    async fn refresh(&self, force: bool) -> Result<IndexReport> {
        let _guard = self.maintenance.write().await;
        self.set_readiness(Readiness::Loading);

        match self.refresh_locked(force).await {
            Ok(report) => {
                self.set_readiness(Readiness::Ready);
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "retrieval system failed to load");
                self.set_readiness(Readiness::Failed(format!("{:#}", e)));
                Err(e)
            }
        }
    }

    async fn refresh_locked(&self, force: bool) -> Result<IndexReport> {
        self.embedder.warm_up().await?;

        let files = scan_corpus(&self.config.corpus)?;
        let decision = if force {
            ReindexDecision::Required(ReindexReason::Forced)
        } else {
            let current = self.registry.snapshot(&files);
            let settings = indexer::index_settings(&self.config, self.embedder.as_ref());
            self.registry.needs_reindex(
                &current,
                self.index.collection(),
                &settings,
                self.index.count().await?,
            )
        };

        match decision {
            ReindexDecision::UpToDate => {
                let total_chunks = self.index.count().await?;
                tracing::info!(
                    files = files.len(),
                    chunks = total_chunks,
                    "corpus unchanged, reusing index"
                );
                Ok(IndexReport {
                    rebuilt: false,
                    reason: None,
                    files_seen: files.len(),
                    files_indexed: files.len(),
                    files_failed: Vec::new(),
                    chunks_written: 0,
                    total_chunks,
                })
            }
            ReindexDecision::Required(reason) => {
                tracing::info!(reason = %reason, "reindexing corpus");
                let mut report = indexer::rebuild(
                    &self.config,
                    self.index.as_ref(),
                    self.embedder.as_ref(),
                    &self.registry,
                    &files,
                )
                .await?;
                self.engine.invalidate();
                report.reason = Some(reason.to_string());
                Ok(report)
            }
        }
    }
}

fn ensure_corpus(config: &Config) -> Result<()> {
    if !config.corpus.dir.is_dir() {
        return Err(RetrievalError::CorpusNotFound(config.corpus.dir.clone()).into());
    }
    Ok(())
}
