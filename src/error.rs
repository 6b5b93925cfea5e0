//! Typed errors at the pipeline and case-store boundaries.
//!
//! Everything else uses `anyhow`. These two enums exist because callers
//! branch on them: the HTTP layer maps [`PipelineError::InvalidRequest`]
//! to 400 and everything else to 500.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaseStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode case record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("stored case {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("case store lock poisoned")]
    Poisoned,
}

/// Errors surfaced by [`AnalysisOrchestrator::analyze`](crate::orchestrator::AnalysisOrchestrator::analyze).
///
/// Capability failures never appear here; they degrade to empty retrieval,
/// a missing vector id, or the fallback analysis.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to persist case record: {0}")]
    Persist(#[from] CaseStoreError),
}
