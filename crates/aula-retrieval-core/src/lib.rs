//! # Aula Retrieval Core
//!
//! Pure retrieval logic for Aula Retrieval: data models, the sectioned
//! chunker, subject rules, fingerprint comparison, the embedder and vector
//! index traits, bounded query caches, and the gated search algorithm.
//!
//! This crate does no filesystem, network, or database I/O. The
//! `aula-retrieval` app crate supplies the corpus scanner, the SQLite
//! vector store, and the concrete embedding providers.

pub mod cache;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod search;
pub mod store;
pub mod subject;
pub mod text;

pub use error::RetrievalError;
pub use models::{Chunk, IndexStats, IndexStatus, Readiness, SearchOutcome, SENTINEL_DISTANCE};
