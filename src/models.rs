//! Core data models used throughout the capture and analysis pipeline.
//!
//! These types represent parsed traces, code context, analyses, stored
//! cases, and the request/response shapes exchanged between the CLI and
//! the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Language tag detected from a failure trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Java,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Java => "java",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file path and 1-based line number implicated by a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
}

/// Result of parsing a failure trace. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTrace {
    pub location: Option<SourceLocation>,
    pub language: Language,
}

impl ParsedTrace {
    pub fn unknown() -> Self {
        Self {
            location: None,
            language: Language::Unknown,
        }
    }
}

/// Source lines surrounding the implicated line.
///
/// `code_snippet` holds the rendered, annotated lines joined by `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    pub file_path: String,
    pub line_number: u32,
    pub code_snippet: String,
    #[serde(default = "default_context_language")]
    pub language: String,
}

fn default_context_language() -> String {
    "python".to_string()
}

/// The four fields every analysis must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub case_name: String,
    pub root_cause: String,
    pub solution: String,
    pub tags: Vec<String>,
}

/// A stored precedent that scored at or above the similarity threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub id: String,
    pub case_name: String,
    pub root_cause: String,
    pub solution: String,
    pub similarity: f64,
}

/// Projection of a [`SimilarityMatch`] returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    pub id: String,
    pub case_name: String,
    pub similarity: f64,
}

impl From<&SimilarityMatch> for SimilarCase {
    fn from(m: &SimilarityMatch) -> Self {
        Self {
            id: m.id.clone(),
            case_name: m.case_name.clone(),
            similarity: m.similarity,
        }
    }
}

/// Durable record of one analyzed failure. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseRecord {
    pub id: String,
    pub case_name: String,
    pub command: String,
    pub error_log: String,
    pub code_context: Option<CodeContext>,
    pub root_cause: String,
    pub solution: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub vector_id: Option<String>,
}

/// Lightweight row for paginated listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSummary {
    pub id: String,
    pub case_name: String,
    pub command: String,
    pub tags: Vec<String>,
    pub created_at: String,
}

/// One page of [`CaseSummary`] rows plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasePage {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub errors: Vec<CaseSummary>,
}

/// Request accepted by `POST /api/analyze` and the in-process pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub command: String,
    pub error_log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<CodeContext>,
}

/// Response returned for every successful analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub id: String,
    pub case_name: String,
    pub root_cause: String,
    pub solution: String,
    pub tags: Vec<String>,
    pub similar_cases: Vec<SimilarCase>,
}
