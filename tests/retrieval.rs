//! End-to-end retrieval behaviour against the SQLite store and the hashed
//! embedder.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use aula_retrieval::config::Config;
use aula_retrieval::fingerprint::FingerprintRegistry;
use aula_retrieval::system::RetrievalSystem;
use aula_retrieval_core::embedding::{Embedder, HashedEmbedder};
use aula_retrieval_core::fingerprint::content_hash;
use aula_retrieval_core::models::{IndexStatus, Readiness};
use aula_retrieval_core::{RetrievalError, SENTINEL_DISTANCE};

const MATEMATICAS: &str = "LA SUMA\nLa suma es una operación que junta dos cantidades para obtener un total. Por ejemplo, dos más tres es igual a cinco.\n";
const CIENCIAS: &str = "LOS ESTADOS DE LA MATERIA\nEl agua puede estar sólida, líquida o gaseosa. El hielo se derrite con el calor y el vapor sube cuando el agua hierve.\n";
const INGLES: &str = "COLORS\nRed, blue and yellow are primary colors. Mixing blue and yellow makes green paint.\n";

/// Hashed embedder that counts the texts it embeds.
#[derive(Default)]
struct CountingEmbedder {
    inner: HashedEmbedder,
    texts: AtomicUsize,
}

impl CountingEmbedder {
    fn with_dims(dims: usize) -> Self {
        Self {
            inner: HashedEmbedder::new(dims),
            texts: AtomicUsize::new(0),
        }
    }

    fn embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

fn setup_corpus() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("matematicas.txt"), MATEMATICAS).unwrap();
    fs::write(docs.join("ciencias_naturales.txt"), CIENCIAS).unwrap();
    fs::write(docs.join("ingles.txt"), INGLES).unwrap();

    let config = Config::minimal(docs, tmp.path().join("data"));
    (tmp, config)
}

async fn open(config: &Config, embedder: Arc<CountingEmbedder>) -> RetrievalSystem {
    RetrievalSystem::with_embedder(config.clone(), embedder)
        .await
        .unwrap()
}

fn docs(tmp: &TempDir) -> std::path::PathBuf {
    tmp.path().join("docs")
}

fn snapshot_hash(config: &Config, filename: &str) -> String {
    let registry = FingerprintRegistry::new(config.storage.fingerprints_path());
    let snapshot = registry.load().unwrap().unwrap();
    snapshot
        .entries
        .into_iter()
        .find(|e| e.filename == filename)
        .map(|e| e.content_hash)
        .unwrap()
}

fn file_hash(path: &Path) -> String {
    content_hash(&fs::read(path).unwrap())
}

#[tokio::test]
async fn test_first_open_indexes_every_file() {
    let (_tmp, config) = setup_corpus();
    let system = open(&config, Arc::new(CountingEmbedder::default())).await;

    let report = system.initialize().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.reason.as_deref(), Some("no fingerprint snapshot"));
    assert_eq!(report.files_indexed, 3);
    assert_eq!(report.total_chunks, 3);

    let stats = system.stats().await.unwrap();
    assert_eq!(stats.status, IndexStatus::Active);
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.per_subject.get("matematicas"), Some(&1));
    assert_eq!(stats.per_subject.get("ciencias_naturales"), Some(&1));
    assert_eq!(stats.per_subject.get("ingles"), Some(&1));

    assert!(config.storage.vectors_path().exists());
    assert!(config.storage.fingerprints_path().exists());
}

#[tokio::test]
async fn test_reopen_unchanged_corpus_reuses_index() {
    let (_tmp, config) = setup_corpus();

    let first = open(&config, Arc::new(CountingEmbedder::default())).await;
    let built = first.initialize().await.unwrap();
    drop(first);

    let embedder = Arc::new(CountingEmbedder::default());
    let second = open(&config, embedder.clone()).await;
    let report = second.initialize().await.unwrap();

    assert!(!report.rebuilt);
    assert!(report.reason.is_none());
    assert_eq!(report.total_chunks, built.total_chunks);
    assert_eq!(embedder.embedded(), 0);
    assert_eq!(second.stats().await.unwrap().total_chunks, built.total_chunks);
}

#[tokio::test]
async fn test_one_byte_change_triggers_reindex() {
    let (tmp, config) = setup_corpus();
    let path = docs(&tmp).join("matematicas.txt");

    let first = open(&config, Arc::new(CountingEmbedder::default())).await;
    first.initialize().await.unwrap();
    let before = snapshot_hash(&config, "matematicas.txt");
    drop(first);

    // Same size, different content.
    fs::write(&path, MATEMATICAS.replace("cinco.", "cinco!")).unwrap();

    let second = open(&config, Arc::new(CountingEmbedder::default())).await;
    let report = second.initialize().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(
        report.reason.as_deref(),
        Some("files changed: matematicas.txt")
    );

    let after = snapshot_hash(&config, "matematicas.txt");
    assert_ne!(before, after);
    assert_eq!(after, file_hash(&path));
}

#[tokio::test]
async fn test_added_file_triggers_reindex() {
    let (tmp, config) = setup_corpus();
    let first = open(&config, Arc::new(CountingEmbedder::default())).await;
    first.initialize().await.unwrap();
    drop(first);

    fs::write(
        docs(&tmp).join("espanol.txt"),
        "EL SUSTANTIVO\nUn sustantivo es una palabra que nombra personas, animales o lugares.\n",
    )
    .unwrap();

    let second = open(&config, Arc::new(CountingEmbedder::default())).await;
    let report = second.initialize().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.reason.as_deref(), Some("files added: espanol.txt"));
    assert_eq!(report.total_chunks, 4);
}

#[tokio::test]
async fn test_latin1_lesson_is_indexed_once() {
    let (tmp, config) = setup_corpus();
    let path = docs(&tmp).join("espanol.txt");
    let lesson = "EL SUSTANTIVO\nUn sustantivo es una palabra que nombra personas, animales o lugares. Por ejemplo: niño, montaña.\n";
    let latin1: Vec<u8> = lesson.chars().map(|c| c as u8).collect();
    fs::write(&path, &latin1).unwrap();

    let first = open(&config, Arc::new(CountingEmbedder::default())).await;
    let built = first.initialize().await.unwrap();
    assert!(built.rebuilt);
    assert!(built.files_failed.is_empty());
    assert_eq!(built.files_indexed, 4);
    assert_eq!(built.total_chunks, 4);
    drop(first);
    assert_eq!(snapshot_hash(&config, "espanol.txt"), file_hash(&path));

    let embedder = Arc::new(CountingEmbedder::default());
    let second = open(&config, embedder.clone()).await;
    let report = second.initialize().await.unwrap();
    assert!(!report.rebuilt, "{:?}", report.reason);
    assert_eq!(report.total_chunks, 4);
    assert_eq!(embedder.embedded(), 0);
}

#[tokio::test]
async fn test_embedder_switch_triggers_reindex() {
    let (_tmp, config) = setup_corpus();
    let first = open(&config, Arc::new(CountingEmbedder::with_dims(384))).await;
    first.initialize().await.unwrap();
    drop(first);

    let embedder = Arc::new(CountingEmbedder::with_dims(64));
    let second = open(&config, embedder.clone()).await;
    let report = second.initialize().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(
        report.reason.as_deref(),
        Some("embedding model changed from counting (384 dims) to counting (64 dims)")
    );
    assert_eq!(report.total_chunks, 3);

    let outcome = second.search("¿Qué es la suma?", 3).await.unwrap();
    assert_eq!(outcome.sources.first().map(String::as_str), Some("matematicas.txt"));
    assert!(outcome.best_distance < 0.9);

    let registry = FingerprintRegistry::new(config.storage.fingerprints_path());
    assert_eq!(registry.load().unwrap().unwrap().settings.dims, 64);
}

#[tokio::test]
async fn test_chunking_change_triggers_reindex() {
    let (_tmp, mut config) = setup_corpus();
    let first = open(&config, Arc::new(CountingEmbedder::default())).await;
    first.initialize().await.unwrap();
    drop(first);

    config.chunking.chunk_chars = 200;
    let second = open(&config, Arc::new(CountingEmbedder::default())).await;
    let report = second.initialize().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.reason.as_deref(), Some("chunking settings changed"));
    drop(second);

    let third = open(&config, Arc::new(CountingEmbedder::default())).await;
    assert!(!third.initialize().await.unwrap().rebuilt);
}

#[tokio::test]
async fn test_corrupt_snapshot_triggers_reindex() {
    let (_tmp, config) = setup_corpus();
    let first = open(&config, Arc::new(CountingEmbedder::default())).await;
    first.initialize().await.unwrap();
    drop(first);

    fs::write(config.storage.fingerprints_path(), "{ not json").unwrap();

    let second = open(&config, Arc::new(CountingEmbedder::default())).await;
    let report = second.initialize().await.unwrap();
    assert!(report.rebuilt);
    assert!(report
        .reason
        .unwrap()
        .starts_with("fingerprint snapshot unreadable"));
    assert_eq!(second.readiness(), Readiness::Ready);
}

#[tokio::test]
async fn test_small_talk_and_short_queries_skip_embedding() {
    let (_tmp, config) = setup_corpus();
    let embedder = Arc::new(CountingEmbedder::default());
    let system = open(&config, embedder.clone()).await;
    system.initialize().await.unwrap();
    let after_index = embedder.embedded();

    for query in ["hola", "ok", "¡Hola!", "Gracias", "¿y?", "suma"] {
        let outcome = system.search(query, 3).await.unwrap();
        assert_eq!(outcome.context, "", "query {:?}", query);
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.best_distance, SENTINEL_DISTANCE);
    }
    assert_eq!(embedder.embedded(), after_index);
}

#[tokio::test]
async fn test_known_question_returns_matching_lesson() {
    let (_tmp, config) = setup_corpus();
    let system = open(&config, Arc::new(CountingEmbedder::default())).await;
    system.initialize().await.unwrap();

    let outcome = system.search("¿Qué es la suma?", 3).await.unwrap();
    assert!(outcome.context.starts_with("LA SUMA\nLa suma es una operación"));
    assert_eq!(outcome.sources.first().map(String::as_str), Some("matematicas.txt"));
    assert!(outcome.sources.len() <= 2);
    assert!(outcome.best_distance < 0.9);
    assert!(outcome.context.chars().count() <= 1200);
}

#[tokio::test]
async fn test_single_lesson_corpus() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("matematicas.txt"),
        "La suma es una operación que junta dos cantidades para obtener un total. Por ejemplo, 2 más 3 es igual a 5.",
    )
    .unwrap();
    let config = Config::minimal(&docs, tmp.path().join("data"));

    let system = open(&config, Arc::new(CountingEmbedder::default())).await;
    system.initialize().await.unwrap();

    let outcome = system.search("¿Qué es la suma?", 3).await.unwrap();
    assert!(outcome.context.contains("junta dos cantidades"));
    assert_eq!(outcome.sources, vec!["matematicas.txt"]);
    assert!(outcome.best_distance < 0.9);
}

#[tokio::test]
async fn test_unrelated_question_is_gated() {
    let (_tmp, config) = setup_corpus();
    let system = open(&config, Arc::new(CountingEmbedder::default())).await;
    system.initialize().await.unwrap();

    let outcome = system
        .search("Quiero aprender sobre dinosaurios voladores", 3)
        .await
        .unwrap();
    assert_eq!(outcome.context, "");
    assert!(outcome.sources.is_empty());
    assert!(outcome.best_distance > 0.9);
    assert!(outcome.best_distance < SENTINEL_DISTANCE);
}

#[tokio::test]
async fn test_repeated_query_hits_caches() {
    let (_tmp, config) = setup_corpus();
    let embedder = Arc::new(CountingEmbedder::default());
    let system = open(&config, embedder.clone()).await;
    system.initialize().await.unwrap();
    let after_index = embedder.embedded();

    let first = system.search("¿Qué es la suma?", 3).await.unwrap();
    assert_eq!(embedder.embedded(), after_index + 1);

    // Whitespace, case and accents normalize to the same key.
    let second = system.search("  ¿que es la   SUMA? ", 3).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(embedder.embedded(), after_index + 1);

    let caches = system.engine().cache_stats();
    assert_eq!(caches.results.entries, 1);
    assert_eq!(caches.results.hits, 1);
    assert_eq!(caches.embeddings.entries, 1);

    // A reindex clears cached results but keeps the query embedding.
    system.reindex().await.unwrap();
    let after_reindex = embedder.embedded();
    assert_eq!(system.engine().cache_stats().results.entries, 0);

    let third = system.search("¿Qué es la suma?", 3).await.unwrap();
    assert_eq!(third, first);
    assert_eq!(embedder.embedded(), after_reindex);
}

#[tokio::test]
async fn test_gated_results_are_not_cached() {
    let (_tmp, config) = setup_corpus();
    let system = open(&config, Arc::new(CountingEmbedder::default())).await;
    system.initialize().await.unwrap();

    let query = "Quiero aprender sobre dinosaurios voladores";
    system.search(query, 3).await.unwrap();
    system.search(query, 3).await.unwrap();

    let caches = system.engine().cache_stats();
    assert_eq!(caches.results.entries, 0);
    assert_eq!(caches.embeddings.hits, 1);
}

#[tokio::test]
async fn test_forced_reindex_rebuilds_same_collection() {
    let (_tmp, config) = setup_corpus();
    let system = open(&config, Arc::new(CountingEmbedder::default())).await;
    let built = system.initialize().await.unwrap();

    let report = system.reindex().await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.reason.as_deref(), Some("reindex requested"));
    assert_eq!(report.total_chunks, built.total_chunks);
    assert_eq!(system.stats().await.unwrap().total_chunks, built.total_chunks);
}

#[tokio::test]
async fn test_empty_corpus_reports_empty_index() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let config = Config::minimal(&docs, tmp.path().join("data"));

    let system = open(&config, Arc::new(CountingEmbedder::default())).await;
    let report = system.initialize().await.unwrap();
    assert_eq!(report.total_chunks, 0);

    let stats = system.stats().await.unwrap();
    assert_eq!(stats.status, IndexStatus::Empty);
    assert!(stats.per_subject.is_empty());

    let outcome = system.search("¿Qué es la suma?", 3).await.unwrap();
    assert_eq!(outcome.best_distance, SENTINEL_DISTANCE);
}

#[tokio::test]
async fn test_missing_corpus_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("nope"), tmp.path().join("data"));

    let err = RetrievalSystem::with_embedder(config, Arc::new(CountingEmbedder::default()))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<RetrievalError>(),
        Some(RetrievalError::CorpusNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_searches_during_reindex() {
    let (_tmp, config) = setup_corpus();
    let system = Arc::new(open(&config, Arc::new(CountingEmbedder::default())).await);
    system.initialize().await.unwrap();

    let known = "¿Qué es la suma?";
    let unrelated = "Quiero aprender sobre dinosaurios voladores";
    let expected_known = system.search(known, 3).await.unwrap();
    let expected_unrelated = system.search(unrelated, 3).await.unwrap();
    assert!(!expected_known.context.is_empty());

    let mut searches = Vec::new();
    for i in 0..16 {
        let system = system.clone();
        let query = if i % 4 == 3 { unrelated } else { known };
        searches.push(tokio::spawn(async move {
            (query, system.search(query, 3).await)
        }));
    }
    let reindex = {
        let system = system.clone();
        tokio::spawn(async move { system.reindex().await })
    };

    for handle in searches {
        let (query, outcome) = handle.await.unwrap();
        let outcome = outcome.unwrap();
        if query == known {
            assert_eq!(outcome, expected_known);
        } else {
            assert_eq!(outcome, expected_unrelated);
        }
    }
    let report = reindex.await.unwrap().unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.total_chunks, 3);
    assert_eq!(system.readiness(), Readiness::Ready);
    assert_eq!(system.search(known, 3).await.unwrap(), expected_known);
}
