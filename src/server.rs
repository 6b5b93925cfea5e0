//! HTTP API for the analysis pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/analyze` | Analyze one failure and store the case |
//! | `GET`  | `/api/errors` | Paginated case list (`page`, `limit`, `tag`) |
//! | `GET`  | `/api/errors/{id}` | Full case record |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "error_log must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400, including unparseable JSON bodies),
//! `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the web UI can be
//! served from a different origin.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{CaseStoreError, PipelineError};
use crate::models::{AnalyzeRequest, AnalyzeResponse, CasePage, CaseRecord};
use crate::orchestrator::AnalysisOrchestrator;
use crate::store::DEFAULT_PAGE_LIMIT;

pub const SERVICE_NAME: &str = "cli-mate";

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<AnalysisOrchestrator>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = AnalysisOrchestrator::from_config(config).await?;
    let app = router(Arc::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("Analysis server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router around an existing orchestrator.
pub fn router(orchestrator: Arc<AnalysisOrchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", post(handle_analyze))
        .route("/api/errors", get(handle_list_errors))
        .route("/api/errors/{id}", get(handle_get_error))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { orchestrator })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidRequest(msg) => bad_request(msg),
            PipelineError::Persist(e) => {
                tracing::error!(error = %e, "failed to persist case");
                internal(e.to_string())
            }
        }
    }
}

impl From<CaseStoreError> for AppError {
    fn from(err: CaseStoreError) -> Self {
        tracing::error!(error = %err, "case store query failed");
        internal(err.to_string())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /api/analyze ============

async fn handle_analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let response = state.orchestrator.analyze(request).await?;
    Ok(Json(response))
}

// ============ GET /api/errors ============

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    tag: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

async fn handle_list_errors(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<CasePage>, AppError> {
    let tag = params.tag.as_deref().filter(|t| !t.is_empty());
    let page = state
        .orchestrator
        .store()
        .list(tag, params.page, params.limit)
        .await?;
    Ok(Json(page))
}

// ============ GET /api/errors/{id} ============

async fn handle_get_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CaseRecord>, AppError> {
    state
        .orchestrator
        .store()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("case not found: {}", id)))
}
