//! Root-cause analysis capability.
//!
//! An [`Analyzer`] turns a grounding prompt into an [`Analysis`]. Any
//! failure (network, timeout, malformed or incomplete JSON) is converted
//! into the deterministic fallback by [`analyze_or_fallback`], so callers
//! always end up with all four fields.
//!
//! Providers:
//! - **[`DisabledAnalyzer`]** — always fails; every request gets the fallback.
//! - **[`OpenAIAnalyzer`]** — OpenAI-compatible `/chat/completions` with a
//!   JSON-object response format.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AnalysisConfig;
use crate::embedding::send_with_retry;
use crate::models::Analysis;

pub const FALLBACK_CASE_NAME: &str = "Error Analysis Failed";
pub const FALLBACK_TAGS: [&str; 2] = ["error", "ai-failed"];

const SYSTEM_PROMPT: &str =
    "You are an experienced senior developer. Analyze the error and respond only with a JSON object.";

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn analyze(&self, prompt: &str) -> Result<Analysis>;
}

/// How an analysis was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Model(Analysis),
    Fallback { analysis: Analysis, reason: String },
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &Analysis {
        match self {
            AnalysisOutcome::Model(a) => a,
            AnalysisOutcome::Fallback { analysis, .. } => analysis,
        }
    }

    pub fn into_analysis(self) -> Analysis {
        match self {
            AnalysisOutcome::Model(a) => a,
            AnalysisOutcome::Fallback { analysis, .. } => analysis,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback { .. })
    }
}

/// The analysis substituted whenever the capability fails.
pub fn fallback_analysis(reason: &str) -> Analysis {
    Analysis {
        case_name: FALLBACK_CASE_NAME.to_string(),
        root_cause: format!("Error occurred during AI analysis: {}", reason),
        solution: "Please check the error log manually.".to_string(),
        tags: FALLBACK_TAGS.iter().map(|t| t.to_string()).collect(),
    }
}

/// Run `analyzer` under `timeout`, substituting the fallback on failure.
pub async fn analyze_or_fallback(
    analyzer: &dyn Analyzer,
    prompt: &str,
    timeout: Duration,
) -> AnalysisOutcome {
    let result = match tokio::time::timeout(timeout, analyzer.analyze(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("analysis timed out after {}s", timeout.as_secs())),
    };

    match result {
        Ok(analysis) => AnalysisOutcome::Model(analysis),
        Err(e) => {
            let reason = e.to_string();
            tracing::warn!(model = analyzer.model_name(), error = %reason, "analysis failed, using fallback");
            AnalysisOutcome::Fallback {
                analysis: fallback_analysis(&reason),
                reason,
            }
        }
    }
}

/// Parse model output into an [`Analysis`].
///
/// The content must be a JSON object carrying `case_name`, `root_cause`
/// and `solution` as strings and `tags` as an array of strings. A
/// surrounding Markdown code fence is tolerated.
pub fn parse_analysis(content: &str) -> Result<Analysis> {
    let body = strip_code_fence(content.trim());
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| anyhow!("analysis is not valid JSON: {}", e))?;
    if !value.is_object() {
        bail!("analysis is not a JSON object");
    }
    for field in ["case_name", "root_cause", "solution", "tags"] {
        if value.get(field).is_none() {
            bail!("analysis is missing required field: {}", field);
        }
    }
    serde_json::from_value(value).map_err(|e| anyhow!("analysis has invalid field types: {}", e))
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn completion_content(json: &serde_json::Value) -> Result<&str> {
    json.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("chat response is missing message content"))
}

// ============ Disabled ============

pub struct DisabledAnalyzer;

#[async_trait]
impl Analyzer for DisabledAnalyzer {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn analyze(&self, _prompt: &str) -> Result<Analysis> {
        bail!("analysis provider is disabled")
    }
}

// ============ OpenAI ============

/// Chat-completions analyzer. Requires `OPENAI_API_KEY`.
pub struct OpenAIAnalyzer {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Analyzer for OpenAIAnalyzer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, prompt: &str) -> Result<Analysis> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        });
        let endpoint = format!("{}/chat/completions", self.url);

        let request = || {
            self.client
                .post(&endpoint)
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
        };

        let json = send_with_retry("OpenAI", self.max_retries, request).await?;
        parse_analysis(completion_content(&json)?)
    }
}

/// Create the configured [`Analyzer`].
pub fn create_analyzer(config: &AnalysisConfig) -> Result<Arc<dyn Analyzer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledAnalyzer)),
        "openai" => Ok(Arc::new(OpenAIAnalyzer::new(config)?)),
        other => bail!("Unknown analysis provider: {}", other),
    }
}
