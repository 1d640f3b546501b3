//! HTTP retrieval server for LLM tooling.
//!
//! Exposes the context store over a small JSON API so editor integrations
//! and agent frameworks can query it without linking the crate.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Semantic search over indexed chunks |
//! | `POST` | `/optimize` | Enrich an instruction with retrieved context |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `index_unavailable` (503),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::context::AppContext;
use crate::error::IndexError;
use crate::models::{EnrichedInstruction, ScoredChunk};
use crate::service;

/// Start the retrieval server on the configured bind address. Runs until
/// the process is terminated.
pub async fn run_server(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/optimize", post(handle_optimize))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx);

    info!(addr = %bind_addr, "retrieval server listening");

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

/// Map a retrieval failure to a response: a store that cannot be opened is
/// 503 (distinct from an empty result, which is a 200 with no hits),
/// everything else is 500.
fn classify_error(err: anyhow::Error) -> AppError {
    if let Some(IndexError::Unavailable(msg)) = err.downcast_ref::<IndexError>() {
        return AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "index_unavailable".to_string(),
            message: msg.clone(),
        };
    }
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    text: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<ScoredChunk>,
}

async fn handle_query(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    if req.k == Some(0) {
        return Err(bad_request("k must be >= 1"));
    }

    let results = service::answer_query(&ctx, &req.text, req.k)
        .await
        .map_err(classify_error)?;
    Ok(Json(QueryResponse { results }))
}

// ============ POST /optimize ============

#[derive(Deserialize)]
struct OptimizeRequest {
    instruction: String,
}

async fn handle_optimize(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<EnrichedInstruction>, AppError> {
    if req.instruction.trim().is_empty() {
        return Err(bad_request("instruction must not be empty"));
    }

    let enriched = service::answer_optimize(&ctx, &req.instruction)
        .await
        .map_err(classify_error)?;
    Ok(Json(enriched))
}
