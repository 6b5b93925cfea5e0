//! Single-pass analysis pipeline.
//!
//! ```text
//! request ──► retrieve ──► compose ──► analyze ──► index ──► persist ──► response
//!               │                        │           │          │
//!           empty on failure      fallback on     None on    hard error
//!                                   failure       failure
//! ```
//!
//! Nothing is retried. Only the final case-record write can fail the
//! request; every capability failure before it degrades in place.

use anyhow::Result;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{analyze_or_fallback, create_analyzer, Analyzer, DisabledAnalyzer};
use crate::config::{AnalysisConfig, Config, RetrievalConfig};
use crate::embedding::{create_provider, DisabledProvider, EmbeddingProvider};
use crate::error::PipelineError;
use crate::index::{SimilarityIndex, SqliteVectorStore, VectorMetadata};
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, CaseRecord, CodeContext, SimilarCase, SimilarityMatch,
};
use crate::store::{CaseStore, SqliteCaseStore};

const PREAMBLE: &str =
    "You are an experienced senior developer. Analyze the error below using the information provided.\n";

const SCHEMA_INSTRUCTION: &str = r#"
Analyze the error using the information above and respond with a JSON object in exactly this shape:
{
  "case_name": "short descriptive error name (e.g. NameError: undefined variable 'x')",
  "root_cause": "root cause of the error (2-3 sentences)",
  "solution": "how to fix it, with a code example, in Markdown",
  "tags": ["language or framework", "error type"]
}

Respond with the JSON object only and nothing else.
"#;

/// Build the grounding document sent to the analyzer.
pub fn compose_prompt(
    error_log: &str,
    code_context: Option<&CodeContext>,
    precedents: &[SimilarityMatch],
) -> String {
    let mut prompt = String::from(PREAMBLE);

    if !precedents.is_empty() {
        prompt.push_str("\n## Similar past errors and their resolutions\n");
        for (i, case) in precedents.iter().enumerate() {
            let _ = write!(
                prompt,
                "\n### Case {}: {}\nCause: {}\nSolution: {}\n",
                i + 1,
                case.case_name,
                case.root_cause,
                case.solution
            );
        }
    }

    let _ = write!(prompt, "\n## Current error log\n```\n{}\n```\n", error_log);

    if let Some(ctx) = code_context {
        let _ = write!(
            prompt,
            "\n## Source at the failing location\nFile: {}\nLine: {}\n```{}\n{}\n```\n",
            ctx.file_path, ctx.line_number, ctx.language, ctx.code_snippet
        );
    }

    prompt.push_str(SCHEMA_INSTRUCTION);
    prompt
}

pub struct AnalysisOrchestrator {
    index: SimilarityIndex,
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn CaseStore>,
    similarity_threshold: f64,
    max_similar_cases: usize,
    analysis_timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(
        index: SimilarityIndex,
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn CaseStore>,
        retrieval: &RetrievalConfig,
        analysis: &AnalysisConfig,
    ) -> Self {
        Self {
            index,
            analyzer,
            store,
            similarity_threshold: retrieval.similarity_threshold,
            max_similar_cases: retrieval.max_similar_cases,
            analysis_timeout: Duration::from_secs(analysis.timeout_secs),
        }
    }

    /// Open the database, ensure the schema, and wire the configured
    /// providers. A provider that cannot be constructed (e.g. a missing API
    /// key) is replaced by its disabled form so requests still complete.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = crate::db::connect(config).await?;
        crate::migrate::create_schema(&pool).await?;

        let embedder: Arc<dyn EmbeddingProvider> = match create_provider(&config.embedding) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider unavailable, retrieval disabled");
                Arc::new(DisabledProvider)
            }
        };
        let analyzer: Arc<dyn Analyzer> = match create_analyzer(&config.analysis) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, "analysis provider unavailable, using fallback analysis");
                Arc::new(DisabledAnalyzer)
            }
        };

        let index = SimilarityIndex::new(
            embedder,
            Arc::new(SqliteVectorStore::new(pool.clone())),
            &config.retrieval,
            &config.embedding,
        );

        Ok(Self::new(
            index,
            analyzer,
            Arc::new(SqliteCaseStore::new(pool)),
            &config.retrieval,
            &config.analysis,
        ))
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    /// Run the full pipeline for one failure.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidRequest`] when `error_log` is blank, and
    /// [`PipelineError::Persist`] when the case record cannot be written.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, PipelineError> {
        if request.error_log.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "error_log must not be empty".to_string(),
            ));
        }

        let precedents = self
            .index
            .search(
                &request.error_log,
                self.similarity_threshold,
                self.max_similar_cases,
            )
            .await;
        tracing::debug!(count = precedents.len(), "retrieved precedents");

        let prompt = compose_prompt(
            &request.error_log,
            request.code_context.as_ref(),
            &precedents,
        );

        let outcome =
            analyze_or_fallback(self.analyzer.as_ref(), &prompt, self.analysis_timeout).await;
        let is_fallback = outcome.is_fallback();
        let analysis = outcome.into_analysis();

        // Fallback text is not worth offering as a precedent.
        let metadata = VectorMetadata {
            case_name: analysis.case_name.clone(),
            tags: analysis.tags.clone(),
            root_cause: (!is_fallback).then(|| analysis.root_cause.clone()),
            solution: (!is_fallback).then(|| analysis.solution.clone()),
        };
        let vector_id = self.index.add(&request.error_log, metadata).await;

        let record = CaseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            case_name: analysis.case_name,
            command: request.command,
            error_log: request.error_log,
            code_context: request.code_context,
            root_cause: analysis.root_cause,
            solution: analysis.solution,
            tags: analysis.tags,
            created_at: Utc::now(),
            vector_id,
        };
        self.store.insert(&record).await?;

        tracing::info!(
            id = %record.id,
            case_name = %record.case_name,
            fallback = is_fallback,
            indexed = record.vector_id.is_some(),
            "case recorded"
        );

        Ok(AnalyzeResponse {
            id: record.id,
            case_name: record.case_name,
            root_cause: record.root_cause,
            solution: record.solution,
            tags: record.tags,
            similar_cases: precedents.iter().map(SimilarCase::from).collect(),
        })
    }
}
