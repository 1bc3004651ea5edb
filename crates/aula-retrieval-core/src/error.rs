//! Typed errors callers branch on.
//!
//! Everything else travels as `anyhow::Error`; these variants can be
//! recovered with `err.downcast_ref::<RetrievalError>()`.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Readiness;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("corpus directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("retrieval system is not ready (state: {0})")]
    NotReady(Readiness),
}
