//! Gated, penalized retrieval over a [`VectorIndex`].
//!
//! The query engine operates entirely through the [`VectorIndex`] and
//! [`Embedder`] traits and has no database or configuration dependencies.
//!
//! # Algorithm
//!
//! 1. Empty index, small talk, or a query too short to embed: return the
//!    sentinel outcome without touching the embedder.
//! 2. A result-cache hit on the normalized query is returned as is.
//! 3. Embed the query (embedding cache first) and fetch
//!    `max(min_candidates, desired_results)` nearest chunks.
//! 4. `adjusted = distance + penalty_weight × generic_hits(chunk)`, then sort
//!    ascending.
//! 5. Select chunks with `adjusted < selection_threshold`, at most
//!    `max_selected`.
//! 6. If the best adjusted distance exceeds `confidence_threshold`, or
//!    nothing was selected, return an empty context carrying that distance.
//! 7. Join the selected texts up to `max_context_chars`, dedupe sources,
//!    cache, and return.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::cache::{BoundedCache, CacheStats};
use crate::embedding::{embed_one, Embedder};
use crate::models::{IndexStats, SearchOutcome};
use crate::store::{ChunkCandidate, VectorIndex};
use crate::text::{normalize_query, tokens};

/// Punctuation ignored at either end of a query when matching small talk.
const SMALL_TALK_TRIM: &[char] = &['¡', '!', '¿', '?', '.', ',', ';', ':'];

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Candidates whose adjusted distance is below this are usable.
    pub selection_threshold: f32,
    /// If even the best candidate is farther than this, no context is returned.
    pub confidence_threshold: f32,
    /// Added to a candidate's distance per generic word it contains.
    pub penalty_weight: f32,
    /// Lower bound on candidates fetched from the index.
    pub min_candidates: usize,
    /// Upper bound on chunks joined into the context.
    pub max_selected: usize,
    pub max_context_chars: usize,
    /// Queries shorter than this (trimmed, in characters) are not embedded.
    pub min_query_chars: usize,
    pub context_separator: String,
    /// Greetings and acknowledgements answered without retrieval.
    pub small_talk: Vec<String>,
    /// Filler words that make a chunk less specific.
    pub generic_words: Vec<String>,
    pub embedding_cache_capacity: usize,
    pub result_cache_capacity: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            selection_threshold: 0.95,
            confidence_threshold: 0.9,
            penalty_weight: 0.05,
            min_candidates: 3,
            max_selected: 2,
            max_context_chars: 1200,
            min_query_chars: 4,
            context_separator: "\n\n---\n\n".to_string(),
            small_talk: default_small_talk(),
            generic_words: default_generic_words(),
            embedding_cache_capacity: 256,
            result_cache_capacity: 25,
        }
    }
}

pub fn default_small_talk() -> Vec<String> {
    [
        "hola",
        "buenos dias",
        "buenas tardes",
        "buenas noches",
        "gracias",
        "como estas",
        "adios",
        "hello",
        "hi",
        "thanks",
        "ok",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_generic_words() -> Vec<String> {
    [
        "cosa",
        "cosas",
        "algo",
        "etc",
        "general",
        "generalmente",
        "muchas",
        "muchos",
        "varios",
        "varias",
        "importante",
        "diferentes",
        "tipo",
        "tipos",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Occupancy of the engine's two caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineCacheStats {
    pub embeddings: CacheStats,
    pub results: CacheStats,
}

/// A candidate after the generic-word penalty.
#[derive(Debug, Clone)]
struct Scored {
    candidate: ChunkCandidate,
    adjusted: f32,
}

pub struct QueryEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    params: SearchParams,
    small_talk: HashSet<String>,
    generic_words: HashSet<String>,
    embeddings: BoundedCache<Vec<f32>>,
    results: BoundedCache<SearchOutcome>,
}

impl QueryEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        params: SearchParams,
    ) -> Self {
        let small_talk = params.small_talk.iter().map(|p| small_talk_key(p)).collect();
        let generic_words = params.generic_words.iter().flat_map(|w| tokens(w)).collect();
        Self {
            embeddings: BoundedCache::new(params.embedding_cache_capacity),
            results: BoundedCache::new(params.result_cache_capacity),
            index,
            embedder,
            params,
            small_talk,
            generic_words,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Run the gated search for `query`.
    ///
    /// `desired_results` raises the number of candidates fetched; it never
    /// raises `max_selected`.
    pub async fn search(&self, query: &str, desired_results: usize) -> Result<SearchOutcome> {
        if self.index.count().await? == 0 {
            tracing::debug!("index is empty, skipping retrieval");
            return Ok(SearchOutcome::sentinel());
        }

        if self.is_small_talk(query) {
            tracing::debug!(query, "small talk, skipping retrieval");
            return Ok(SearchOutcome::sentinel());
        }

        if self.is_too_short(query) {
            tracing::debug!(query, "query too short, skipping retrieval");
            return Ok(SearchOutcome::sentinel());
        }

        let key = normalize_query(query);
        if let Some(hit) = self.results.get(&key) {
            tracing::debug!(query = %key, "result cache hit");
            return Ok(hit);
        }

        let embedding = self.query_embedding(&key).await?;
        let k = self.params.min_candidates.max(desired_results).max(1);
        let candidates = self.index.query(&embedding, k).await?;
        let scored = self.score(candidates);

        let best = match scored.first() {
            Some(s) => s.adjusted,
            None => return Ok(SearchOutcome::sentinel()),
        };

        if best > self.params.confidence_threshold {
            tracing::debug!(
                query = %key,
                best_distance = best,
                threshold = self.params.confidence_threshold,
                "best candidate below confidence, discarding context"
            );
            return Ok(SearchOutcome::empty(best));
        }

        let selected: Vec<&Scored> = scored
            .iter()
            .filter(|s| s.adjusted < self.params.selection_threshold)
            .take(self.params.max_selected)
            .collect();
        if selected.is_empty() {
            return Ok(SearchOutcome::empty(best));
        }

        let outcome = self.assemble(&selected, best);
        tracing::debug!(
            query = %key,
            best_distance = best,
            selected = selected.len(),
            sources = ?outcome.sources,
            "retrieved context"
        );
        self.results.insert(key, outcome.clone());
        Ok(outcome)
    }

    /// Chunk totals per subject, read from the live index.
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats::from_counts(self.index.subject_counts().await?))
    }

    /// Forget cached results. Called after every reindex; query embeddings
    /// stay valid because they do not depend on the corpus.
    pub fn invalidate(&self) {
        self.results.clear();
    }

    pub fn cache_stats(&self) -> EngineCacheStats {
        EngineCacheStats {
            embeddings: self.embeddings.stats(),
            results: self.results.stats(),
        }
    }

    pub fn is_small_talk(&self, query: &str) -> bool {
        self.small_talk.contains(&small_talk_key(query))
    }

    fn is_too_short(&self, query: &str) -> bool {
        query.trim().chars().count() < self.params.min_query_chars || tokens(query).len() < 2
    }

    /// Number of tokens in `text` that are generic words.
    pub fn generic_hits(&self, text: &str) -> usize {
        tokens(text)
            .iter()
            .filter(|t| self.generic_words.contains(t.as_str()))
            .count()
    }

    async fn query_embedding(&self, key: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.embeddings.get(key) {
            return Ok(cached);
        }
        let embedding = embed_one(self.embedder.as_ref(), key).await?;
        self.embeddings.insert(key.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn score(&self, candidates: Vec<ChunkCandidate>) -> Vec<Scored> {
        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .map(|candidate| {
                let hits = self.generic_hits(&candidate.text);
                let adjusted = candidate.distance + self.params.penalty_weight * hits as f32;
                Scored {
                    candidate,
                    adjusted,
                }
            })
            .collect();
        scored.sort_by(|a, b| a.adjusted.total_cmp(&b.adjusted));
        scored
    }

    fn assemble(&self, selected: &[&Scored], best: f32) -> SearchOutcome {
        let budget = self.params.max_context_chars;
        let separator = &self.params.context_separator;
        let separator_len = separator.chars().count();

        let mut context = String::new();
        let mut used = 0usize;
        let mut sources: Vec<String> = Vec::new();

        for (i, s) in selected.iter().enumerate() {
            let sep = if i == 0 { 0 } else { separator_len };
            if used + sep >= budget {
                break;
            }
            let remaining = budget - used - sep;
            let text = &s.candidate.text;
            let text_len = text.chars().count();
            let take = text_len.min(remaining);

            if i > 0 {
                context.push_str(separator);
            }
            context.extend(text.chars().take(take));
            used += sep + take;

            if !sources.contains(&s.candidate.source_file) {
                sources.push(s.candidate.source_file.clone());
            }
            if take < text_len {
                break;
            }
        }

        SearchOutcome {
            context,
            sources,
            best_distance: best,
        }
    }
}

fn small_talk_key(text: &str) -> String {
    normalize_query(text)
        .trim_matches(|c: char| SMALL_TALK_TRIM.contains(&c) || c.is_whitespace())
        .to_string()
}
