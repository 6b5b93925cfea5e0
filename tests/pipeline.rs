//! End-to-end pipeline tests over in-memory stores and scripted providers.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cli_mate::analysis::{parse_analysis, Analyzer, FALLBACK_CASE_NAME};
use cli_mate::config::{AnalysisConfig, ContextConfig, EmbeddingConfig, RetrievalConfig};
use cli_mate::context::ContextExtractor;
use cli_mate::embedding::EmbeddingProvider;
use cli_mate::error::{CaseStoreError, PipelineError};
use cli_mate::index::{InMemoryVectorStore, SimilarityIndex};
use cli_mate::models::{Analysis, AnalyzeRequest, CasePage, CaseRecord, Language};
use cli_mate::orchestrator::AnalysisOrchestrator;
use cli_mate::redact::Redactor;
use cli_mate::store::{CaseStore, InMemoryCaseStore};
use cli_mate::trace::TraceParser;

/// Counts a few error keywords; the constant last component keeps every
/// vector non-zero.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            text.matches("NameError").count() as f32,
            text.matches("TypeError").count() as f32,
            text.matches("ECONNREFUSED").count() as f32,
            0.01,
        ])
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding service unreachable"))
    }
}

/// Replays canned model output and records every prompt it receives.
struct ScriptedAnalyzer {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAnalyzer {
    fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn raising(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn analyze(&self, prompt: &str) -> Result<Analysis> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(content) => parse_analysis(content),
            Err(message) => Err(anyhow!("{}", message)),
        }
    }
}

struct BrokenCaseStore;

#[async_trait]
impl CaseStore for BrokenCaseStore {
    async fn insert(&self, _record: &CaseRecord) -> Result<(), CaseStoreError> {
        Err(CaseStoreError::Poisoned)
    }
    async fn get(&self, _id: &str) -> Result<Option<CaseRecord>, CaseStoreError> {
        Ok(None)
    }
    async fn list(
        &self,
        _tag: Option<&str>,
        page: i64,
        limit: i64,
    ) -> Result<CasePage, CaseStoreError> {
        Ok(CasePage {
            total: 0,
            page,
            limit,
            errors: Vec::new(),
        })
    }
}

const NAME_ERROR_REPLY: &str = r#"{
    "case_name": "NameError: undefined variable",
    "root_cause": "The variable x is used before it is assigned.",
    "solution": "Define x before calling print.",
    "tags": ["python", "name-error"]
}"#;

const NAME_ERROR_LOG: &str = "Traceback (most recent call last):\n  File \"app.py\", line 42, in <module>\nNameError: name 'x' is not defined";

struct Harness {
    orchestrator: AnalysisOrchestrator,
    vectors: Arc<InMemoryVectorStore>,
    cases: Arc<InMemoryCaseStore>,
}

fn harness(embedder: Arc<dyn EmbeddingProvider>, analyzer: Arc<dyn Analyzer>) -> Harness {
    let vectors = Arc::new(InMemoryVectorStore::new());
    let cases = Arc::new(InMemoryCaseStore::new());
    let retrieval = RetrievalConfig::default();
    let index = SimilarityIndex::new(
        embedder,
        vectors.clone(),
        &retrieval,
        &EmbeddingConfig::default(),
    );
    let orchestrator = AnalysisOrchestrator::new(
        index,
        analyzer,
        cases.clone(),
        &retrieval,
        &AnalysisConfig::default(),
    );
    Harness {
        orchestrator,
        vectors,
        cases,
    }
}

fn request(error_log: &str) -> AnalyzeRequest {
    AnalyzeRequest {
        command: "python app.py".to_string(),
        error_log: error_log.to_string(),
        code_context: None,
    }
}

#[test]
fn test_python_trace_location() {
    let parsed = TraceParser::new().parse(NAME_ERROR_LOG);
    let location = parsed.location.expect("python frame should be located");
    assert_eq!(location.path, "app.py");
    assert_eq!(location.line, 42);
    assert_eq!(parsed.language, Language::Python);
}

#[test]
fn test_live_api_key_is_masked() {
    std::env::set_var("OPENAI_API_KEY", "sk-abc123");
    let redactor = Redactor::new();

    let out = redactor.redact("request failed with OPENAI_API_KEY=sk-abc123 set");
    assert!(out.contains("OPENAI_API_KEY=***"), "got: {}", out);
    assert!(!out.contains("sk-abc123"));
}

#[tokio::test]
async fn test_analysis_failure_falls_back_and_still_records() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let h = harness(
        embedder.clone(),
        Arc::new(ScriptedAnalyzer::raising("model overloaded")),
    );

    let response = h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();

    assert_eq!(response.case_name, FALLBACK_CASE_NAME);
    assert_eq!(response.tags, vec!["error", "ai-failed"]);
    assert!(response.root_cause.contains("model overloaded"));
    assert!(response.similar_cases.is_empty());

    // One embedding for retrieval, one for indexing.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.vectors.len(), 1);

    let record = h.cases.get(&response.id).await.unwrap().unwrap();
    assert_eq!(record.case_name, FALLBACK_CASE_NAME);
    assert_eq!(record.error_log, NAME_ERROR_LOG);
    let vector_id = record.vector_id.expect("trace should be indexed");
    let meta = h.vectors.metadata(&vector_id).unwrap();
    assert_eq!(meta.case_name, FALLBACK_CASE_NAME);
    assert!(meta.root_cause.is_none());
}

#[tokio::test]
async fn test_malformed_model_output_falls_back() {
    let h = harness(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(ScriptedAnalyzer::replying(r#"{"case_name": "x", "tags": []}"#)),
    );

    let response = h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();
    assert_eq!(response.case_name, FALLBACK_CASE_NAME);
    assert_eq!(h.cases.len(), 1);
}

#[tokio::test]
async fn test_second_occurrence_retrieves_precedent() {
    let analyzer = Arc::new(ScriptedAnalyzer::replying(NAME_ERROR_REPLY));
    let h = harness(Arc::new(KeywordEmbedder::default()), analyzer.clone());

    let first = h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();
    assert_eq!(first.case_name, "NameError: undefined variable");
    assert_eq!(first.tags, vec!["python", "name-error"]);
    assert!(first.similar_cases.is_empty());
    assert!(!analyzer.last_prompt().contains("Similar past errors"));

    let second = h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();
    assert_eq!(second.similar_cases.len(), 1);
    let precedent = &second.similar_cases[0];
    assert_eq!(precedent.case_name, "NameError: undefined variable");
    assert_eq!(precedent.similarity, 1.0);

    let prompt = analyzer.last_prompt();
    assert!(prompt.contains("Case 1: NameError: undefined variable"));
    assert!(prompt.contains("Cause: The variable x is used before it is assigned."));
    assert!(prompt.contains("Solution: Define x before calling print."));
    assert!(prompt.contains(NAME_ERROR_LOG));

    assert_eq!(h.cases.len(), 2);
    assert_eq!(h.vectors.len(), 2);
}

#[tokio::test]
async fn test_unrelated_errors_are_not_precedents() {
    let analyzer = Arc::new(ScriptedAnalyzer::replying(NAME_ERROR_REPLY));
    let h = harness(Arc::new(KeywordEmbedder::default()), analyzer);

    h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();
    let response = h
        .orchestrator
        .analyze(request("Error: connect ECONNREFUSED 127.0.0.1:5432"))
        .await
        .unwrap();
    assert!(response.similar_cases.is_empty());
}

#[tokio::test]
async fn test_fallback_precedent_reports_missing_fields() {
    let h = harness(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(ScriptedAnalyzer::raising("boom")),
    );

    h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();
    let matches = h.orchestrator.index().search(NAME_ERROR_LOG, 0.8, 3).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].root_cause, "N/A");
    assert_eq!(matches[0].solution, "N/A");
}

#[tokio::test]
async fn test_embedding_failure_still_records_case() {
    let h = harness(
        Arc::new(FailingEmbedder),
        Arc::new(ScriptedAnalyzer::replying(NAME_ERROR_REPLY)),
    );

    let response = h.orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap();
    assert_eq!(response.case_name, "NameError: undefined variable");
    assert!(response.similar_cases.is_empty());

    let record = h.cases.get(&response.id).await.unwrap().unwrap();
    assert!(record.vector_id.is_none());
    assert!(h.vectors.is_empty());
}

#[tokio::test]
async fn test_blank_error_log_is_rejected() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let h = harness(
        embedder.clone(),
        Arc::new(ScriptedAnalyzer::replying(NAME_ERROR_REPLY)),
    );

    let err = h.orchestrator.analyze(request("  \n")).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert!(h.cases.is_empty());
}

#[tokio::test]
async fn test_persist_failure_is_surfaced() {
    let index = SimilarityIndex::new(
        Arc::new(KeywordEmbedder::default()),
        Arc::new(InMemoryVectorStore::new()),
        &RetrievalConfig::default(),
        &EmbeddingConfig::default(),
    );
    let orchestrator = AnalysisOrchestrator::new(
        index,
        Arc::new(ScriptedAnalyzer::replying(NAME_ERROR_REPLY)),
        Arc::new(BrokenCaseStore),
        &RetrievalConfig::default(),
        &AnalysisConfig::default(),
    );

    let err = orchestrator.analyze(request(NAME_ERROR_LOG)).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Persist(CaseStoreError::Poisoned)
    ));
}

#[tokio::test]
async fn test_code_context_reaches_prompt_and_record() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("app.py");
    std::fs::write(&script, "import sys\nprint(x)\nsys.exit(0)\n").unwrap();

    let ctx = ContextExtractor::new(&ContextConfig { lines: 1 })
        .extract(script.to_str().unwrap(), 2)
        .unwrap();

    let analyzer = Arc::new(ScriptedAnalyzer::replying(NAME_ERROR_REPLY));
    let h = harness(Arc::new(KeywordEmbedder::default()), analyzer.clone());

    let mut req = request(NAME_ERROR_LOG);
    req.code_context = Some(ctx.clone());
    let response = h.orchestrator.analyze(req).await.unwrap();

    let prompt = analyzer.last_prompt();
    assert!(prompt.contains(">>>    2 | print(x)"));
    assert!(prompt.contains("```python"));

    let record = h.cases.get(&response.id).await.unwrap().unwrap();
    assert_eq!(record.code_context, Some(ctx));
}
