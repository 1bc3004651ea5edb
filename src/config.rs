use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use aula_retrieval_core::chunk::{ChunkParams, DEFAULT_BOILERPLATE_MARKERS};
use aula_retrieval_core::search::{default_generic_words, default_small_talk, SearchParams};
use aula_retrieval_core::subject::{default_rules, SubjectClassifier, SubjectRule, DEFAULT_SUBJECT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub subjects: SubjectsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            collection: default_collection(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_collection() -> String {
    "educational_docs".to_string()
}

impl StorageConfig {
    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join("vectors.sqlite")
    }

    pub fn fingerprints_path(&self) -> PathBuf {
        self.dir.join("fingerprints.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,
    #[serde(default = "default_boilerplate_markers")]
    pub boilerplate_markers: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
            min_section_chars: default_min_section_chars(),
            boilerplate_markers: default_boilerplate_markers(),
        }
    }
}

fn default_chunk_chars() -> usize {
    400
}
fn default_overlap_chars() -> usize {
    100
}
fn default_min_section_chars() -> usize {
    50
}
fn default_boilerplate_markers() -> Vec<String> {
    DEFAULT_BOILERPLATE_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_chars: self.chunk_chars,
            overlap_chars: self.overlap_chars,
            min_section_chars: self.min_section_chars,
            boilerplate_markers: self.boilerplate_markers.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_selection_threshold")]
    pub selection_threshold: f32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_penalty_weight")]
    pub penalty_weight: f32,
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    /// Results requested when the caller does not say.
    #[serde(default = "default_results")]
    pub default_results: usize,
    #[serde(default = "default_context_separator")]
    pub context_separator: String,
    #[serde(default = "default_small_talk")]
    pub small_talk: Vec<String>,
    #[serde(default = "default_generic_words")]
    pub generic_words: Vec<String>,
    #[serde(default = "default_embedding_cache_capacity")]
    pub embedding_cache_capacity: usize,
    #[serde(default = "default_result_cache_capacity")]
    pub result_cache_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            selection_threshold: default_selection_threshold(),
            confidence_threshold: default_confidence_threshold(),
            penalty_weight: default_penalty_weight(),
            min_candidates: default_min_candidates(),
            max_selected: default_max_selected(),
            max_context_chars: default_max_context_chars(),
            min_query_chars: default_min_query_chars(),
            default_results: default_results(),
            context_separator: default_context_separator(),
            small_talk: default_small_talk(),
            generic_words: default_generic_words(),
            embedding_cache_capacity: default_embedding_cache_capacity(),
            result_cache_capacity: default_result_cache_capacity(),
        }
    }
}

fn default_selection_threshold() -> f32 {
    0.95
}
fn default_confidence_threshold() -> f32 {
    0.9
}
fn default_penalty_weight() -> f32 {
    0.05
}
fn default_min_candidates() -> usize {
    3
}
fn default_max_selected() -> usize {
    2
}
fn default_max_context_chars() -> usize {
    1200
}
fn default_min_query_chars() -> usize {
    4
}
fn default_results() -> usize {
    3
}
fn default_context_separator() -> String {
    "\n\n---\n\n".to_string()
}
fn default_embedding_cache_capacity() -> usize {
    256
}
fn default_result_cache_capacity() -> usize {
    25
}

impl RetrievalConfig {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            selection_threshold: self.selection_threshold,
            confidence_threshold: self.confidence_threshold,
            penalty_weight: self.penalty_weight,
            min_candidates: self.min_candidates,
            max_selected: self.max_selected,
            max_context_chars: self.max_context_chars,
            min_query_chars: self.min_query_chars,
            context_separator: self.context_separator.clone(),
            small_talk: self.small_talk.clone(),
            generic_words: self.generic_words.clone(),
            embedding_cache_capacity: self.embedding_cache_capacity,
            result_cache_capacity: self.result_cache_capacity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubjectsConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<SubjectRule>,
    #[serde(default = "default_subject_label")]
    pub default_label: String,
}

impl Default for SubjectsConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            default_label: default_subject_label(),
        }
    }
}

fn default_subject_label() -> String {
    DEFAULT_SUBJECT.to_string()
}

impl SubjectsConfig {
    pub fn classifier(&self) -> SubjectClassifier {
        SubjectClassifier::new(self.rules.clone(), self.default_label.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_probe_queries")]
    pub probe_queries: Vec<String>,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            probe_queries: default_probe_queries(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_probe_queries() -> Vec<String> {
    [
        "¿Qué es la suma?",
        "¿Cuáles son los estados de la materia?",
        "¿Qué es la familia?",
        "Hello, how are you?",
        "¿Qué es un sustantivo?",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}
fn default_preview_chars() -> usize {
    200
}

impl Config {
    /// A configuration with every default and the given corpus directory.
    ///
    /// The embedding provider is `hashed`, so no model is downloaded.
    pub fn minimal(corpus_dir: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig {
                dir: corpus_dir.into(),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
            },
            storage: StorageConfig {
                dir: storage_dir.into(),
                collection: default_collection(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            subjects: SubjectsConfig::default(),
            embedding: EmbeddingConfig {
                provider: "hashed".to_string(),
                ..EmbeddingConfig::default()
            },
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.storage.collection.trim().is_empty() {
        bail!("storage.collection must not be empty");
    }

    // Validate chunking
    let chunking = &config.chunking;
    if chunking.chunk_chars == 0 {
        bail!("chunking.chunk_chars must be > 0");
    }
    if chunking.overlap_chars >= chunking.chunk_chars {
        bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }

    // Validate retrieval
    let retrieval = &config.retrieval;
    for (name, value) in [
        ("selection_threshold", retrieval.selection_threshold),
        ("confidence_threshold", retrieval.confidence_threshold),
        ("penalty_weight", retrieval.penalty_weight),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("retrieval.{} must be a non-negative number", name);
        }
    }
    if retrieval.max_selected == 0 {
        bail!("retrieval.max_selected must be >= 1");
    }
    if retrieval.min_candidates == 0 {
        bail!("retrieval.min_candidates must be >= 1");
    }
    if retrieval.max_context_chars == 0 {
        bail!("retrieval.max_context_chars must be > 0");
    }
    if retrieval.embedding_cache_capacity == 0 || retrieval.result_cache_capacity == 0 {
        bail!("retrieval cache capacities must be >= 1");
    }

    // Validate subjects
    for rule in &config.subjects.rules {
        if rule.label.trim().is_empty() {
            bail!("subjects.rules entries need a label");
        }
        if rule.keywords.iter().all(|k| k.trim().is_empty()) {
            bail!("subjects rule '{}' has no keywords", rule.label);
        }
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "local" | "hashed" => {}
        "ollama" => {
            if embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'ollama'");
            }
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'ollama'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, ollama, or hashed.",
            other
        ),
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    Ok(())
}
