//! JSON HTTP API over the document and transaction pipelines.
//!
//! # Endpoints
//!
//! | Method  | Path | Description |
//! |---------|------|-------------|
//! | `GET`   | `/health` | Health check (returns version) |
//! | `POST`  | `/ingest` | Ingest a text file by path |
//! | `POST`  | `/search` | Semantic search over chunks |
//! | `POST`  | `/chat` | Grounded question answering |
//! | `POST`  | `/analyze` | Extract and categorize transactions |
//! | `GET`   | `/transactions` | List stored transactions |
//! | `GET`   | `/summary` | Spending report |
//! | `PATCH` | `/transactions/{id}/category` | Manual category override |
//! | `POST`  | `/clear` | Reset the index (requires `confirm`) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `unavailable` (503),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::analyze;
use crate::ask;
use crate::cancel::CancelToken;
use crate::clear;
use crate::config::Config;
use crate::db;
use crate::error::CoreError;
use crate::generation::ResponseLength;
use crate::ingest;
use crate::reconcile;
use crate::search;
use crate::summary;
use crate::txstore;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .route("/analyze", post(handle_analyze))
        .route("/transactions", get(handle_transactions))
        .route("/transactions/{id}/category", patch(handle_set_category))
        .route("/summary", get(handle_summary))
        .route("/clear", post(handle_clear))
        .layer(cors)
        .with_state(state);

    info!(bind = %bind_addr, "server starting");
    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let (status, code) = match &err {
            CoreError::InvalidInput(_)
            | CoreError::UnknownCategory(_)
            | CoreError::DimensionMismatch { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            CoreError::TransactionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::EmbeddingUnavailable(_) | CoreError::GenerationUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            CoreError::Cancelled | CoreError::Db(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

/// Map pipeline errors onto the contract, surfacing typed causes buried in
/// an anyhow chain.
fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast::<CoreError>() {
        Ok(core) => core.into(),
        Err(other) => AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: other.to_string(),
        },
    }
}

// ============ Handlers ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct IngestRequest {
    path: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<ingest::IngestOutcome>, AppError> {
    if req.path.trim().is_empty() {
        return Err(bad_request("path must not be empty"));
    }

    let cancel = CancelToken::new();
    let outcome = ingest::ingest_file(&state.config, &state.pool, Path::new(&req.path), &cancel)
        .await
        .map_err(classify_error)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<i64>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let k = req.k.unwrap_or(state.config.retrieval.top_k);
    let hits = search::search_chunks(&state.config, &state.pool, &req.query, k).await?;
    Ok(Json(serde_json::json!({ "results": hits })))
}

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    response_length: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ask::AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let length = match req.response_length.as_deref() {
        Some(s) => ResponseLength::parse(s)?,
        None => ResponseLength::default(),
    };

    let response = ask::answer_question(&state.config, &state.pool, &req.question, length).await?;
    Ok(Json(response))
}

async fn handle_analyze(
    State(state): State<AppState>,
) -> Result<Json<analyze::AnalyzeOutcome>, AppError> {
    let cancel = CancelToken::new();
    let outcome = analyze::analyze_documents(&state.config, &state.pool, &cancel)
        .await
        .map_err(classify_error)?;
    Ok(Json(outcome))
}

async fn handle_transactions(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let txns = txstore::load_all(&state.pool).await?;
    Ok(Json(serde_json::json!({ "transactions": txns })))
}

#[derive(Deserialize)]
struct CategoryRequest {
    category: String,
}

async fn handle_set_category(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<crate::models::Transaction>, AppError> {
    let updated = reconcile::override_category(&state.pool, &id, &req.category).await?;
    Ok(Json(updated))
}

async fn handle_summary(
    State(state): State<AppState>,
) -> Result<Json<summary::SpendingReport>, AppError> {
    let txns = txstore::load_all(&state.pool).await?;
    Ok(Json(summary::build_report(&txns)))
}

#[derive(Deserialize)]
struct ClearRequest {
    #[serde(default)]
    confirm: bool,
    #[serde(default)]
    transactions: bool,
}

async fn handle_clear(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !req.confirm {
        return Err(bad_request("clear requires \"confirm\": true"));
    }

    clear::clear_data(&state.pool, req.transactions)
        .await
        .map_err(classify_error)?;
    Ok(Json(serde_json::json!({ "cleared": true })))
}
