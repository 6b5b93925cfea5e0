//! `wtf run`: execute a command and analyze it if it fails.
//!
//! ```text
//! run command ──► exit 0 or empty stderr ──► done
//!      │
//!      ▼
//! parse trace (unredacted) ──► read code context ──► redact ──► analyze ──► print
//! ```
//!
//! The CLI always exits with the wrapped command's exit code, whether or
//! not analysis succeeds.

use anyhow::{bail, Result};

use crate::client::ApiClient;
use crate::config::Config;
use crate::context::ContextExtractor;
use crate::executor;
use crate::models::{AnalyzeRequest, AnalyzeResponse};
use crate::orchestrator::AnalysisOrchestrator;
use crate::redact::Redactor;
use crate::trace::TraceParser;

/// Build the analysis request for a failed command.
///
/// Parsing runs on the raw trace; only the redacted command, trace and
/// snippet go into the request.
pub fn prepare_request(
    command: &str,
    stderr: &str,
    parser: &TraceParser,
    extractor: &ContextExtractor,
    redactor: &Redactor,
) -> AnalyzeRequest {
    let parsed = parser.parse(stderr);

    let code_context = parsed
        .location
        .as_ref()
        .and_then(|loc| extractor.extract(&loc.path, loc.line))
        .map(|mut ctx| {
            ctx.file_path = redactor.redact(&ctx.file_path);
            ctx.code_snippet = redactor.redact(&ctx.code_snippet);
            ctx
        });

    AnalyzeRequest {
        command: redactor.redact(command),
        error_log: redactor.redact(stderr),
        code_context,
    }
}

/// Run `args` as one shell command and return the exit code to exit with.
///
/// The command runs whatever the state of `config`; a configuration error
/// only prevents the analysis and is reported as a warning.
pub async fn run_capture(config: Result<Config>, args: &[String]) -> Result<i32> {
    if args.is_empty() {
        bail!("no command given; usage: wtf run -- <command...>");
    }
    let command = args.join(" ");

    let output = executor::run_command(&command).await;
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }

    if !output.failed() || output.stderr.trim().is_empty() {
        return Ok(output.exit_code);
    }

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!();
            eprintln!("Warning: analysis skipped, configuration error: {:#}", e);
            return Ok(output.exit_code);
        }
    };

    let request = prepare_request(
        &command,
        &output.stderr,
        &TraceParser::new(),
        &ContextExtractor::new(&config.context),
        &Redactor::new(),
    );
    if let Some(ctx) = &request.code_context {
        tracing::debug!(file = %ctx.file_path, line = ctx.line_number, "attached code context");
    }

    eprintln!();
    eprintln!("Command failed with exit code {}. Analyzing...", output.exit_code);

    match submit(&config, request).await {
        Ok(response) => print_analysis(&response, config.client.web_url.as_deref()),
        Err(e) => eprintln!("Warning: analysis failed: {:#}", e),
    }

    Ok(output.exit_code)
}

async fn submit(config: &Config, request: AnalyzeRequest) -> Result<AnalyzeResponse> {
    match &config.client.api_url {
        Some(url) => {
            let client = ApiClient::new(url, config.client.timeout_secs)?;
            client.analyze(&request).await
        }
        None => {
            let orchestrator = AnalysisOrchestrator::from_config(config).await?;
            Ok(orchestrator.analyze(request).await?)
        }
    }
}

/// Written to stderr: stdout belongs to the wrapped command.
pub fn print_analysis(response: &AnalyzeResponse, web_url: Option<&str>) {
    eprintln!();
    eprintln!("=== {} ===", response.case_name);
    eprintln!();
    eprintln!("Root cause:");
    eprintln!("{}", response.root_cause);
    eprintln!();
    eprintln!("Solution:");
    eprintln!("{}", response.solution);
    eprintln!();
    if !response.tags.is_empty() {
        eprintln!("Tags: {}", response.tags.join(", "));
    }
    if !response.similar_cases.is_empty() {
        eprintln!("Similar past cases: {}", response.similar_cases.len());
        for case in &response.similar_cases {
            eprintln!("  {:.2}  {}  ({})", case.similarity, case.case_name, case.id);
        }
    }
    match web_url {
        Some(base) => eprintln!(
            "Details: {}/errors/{}",
            base.trim_end_matches('/'),
            response.id
        ),
        None => eprintln!("Case id: {}  (wtf show {})", response.id, response.id),
    }
}
