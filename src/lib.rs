//! # Aula Retrieval
//!
//! Local retrieval for a children's educational Q&A assistant.
//!
//! A folder of plain-text teaching documents is fingerprinted, split into
//! section-aware chunks, tagged with a school subject, embedded, and stored
//! in a SQLite-backed vector collection. Queries go through a gated search
//! that refuses small talk and weak matches, so the assistant only gets
//! context when the corpus actually covers the question.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//! │  Corpus     │──▶│ Chunk + Classify │──▶│  SQLite   │
//! │  *.txt      │   │     + Embed      │   │  vectors  │
//! └──────┬──────┘   └──────────────────┘   └─────┬─────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                         ┌────────────┐
//! │ Fingerprint │                         │ Gated      │
//! │ snapshot    │                         │ search     │
//! └─────────────┘                         └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! aula index                         # build or reuse the index
//! aula search "¿Qué es la suma?"     # gated search
//! aula stats                         # chunk counts per subject
//! aula diagnostics                   # files, probes, caches as JSON
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Corpus discovery and document loading |
//! | [`fingerprint`] | Persisted corpus fingerprints |
//! | [`embedding`] | Embedding provider selection |
//! | [`indexer`] | Full rebuild pipeline |
//! | [`sqlite_store`] | SQLite vector collection |
//! | [`system`] | Readiness and maintenance lifecycle |
//! | [`search`] | `aula search` command |
//! | [`stats`] | `aula stats` command |
//! | [`diagnostics`] | `aula diagnostics` command |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod corpus;
pub mod db;
pub mod diagnostics;
pub mod embedding;
pub mod fingerprint;
pub mod indexer;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod system;

pub use system::RetrievalSystem;
