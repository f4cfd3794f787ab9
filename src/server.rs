//! HTTP API for the question-answering service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/ask` | Answer a query, optionally continuing a session |
//! | `POST` | `/api/v1/reset-session` | Delete a conversation session |
//! | `GET`  | `/health` | Health check with index stats |
//! | `GET`  | `/api/v1/documents` | List the document collection |
//! | `GET`  | `/api/v1/sessions/stats` | Session counts (sweeps expired first) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query is 2001 characters, maximum is 2000" } }
//! ```
//!
//! Codes map from the error taxonomy by type: `bad_request` (400) for
//! validation, `not_found` (404), `external_service` (502) for failed
//! LLM/embedding calls, `internal` (500) for persistence faults.
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

use crate::agent::Agent;
use crate::config::Config;
use crate::documents::scan_documents;
use crate::error::Error;
use crate::models::{DocumentInfo, IndexStats, QueryOutcome};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    agent: Arc<Agent>,
    config: Arc<Config>,
}

/// Start the HTTP server and run until the process terminates.
pub async fn run_server(config: Arc<Config>, agent: Arc<Agent>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState { agent, config };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/ask", post(handle_ask))
        .route("/api/v1/reset-session", post(handle_reset_session))
        .route("/api/v1/documents", get(handle_documents))
        .route("/api/v1/sessions/stats", get(handle_session_stats))
        .layer(cors)
        .with_state(state);

    tracing::info!(addr = %bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::ExternalService { .. } => (StatusCode::BAD_GATEWAY, "external_service"),
            Error::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ POST /api/v1/ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
    session_id: Option<String>,
}

/// Handler for `POST /api/v1/ask`.
///
/// The agent decides per query whether to ground the answer in the document
/// collection or answer from general knowledge.
async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<QueryOutcome>, AppError> {
    let outcome = state
        .agent
        .ask(&request.query, request.session_id.as_deref())
        .await?;
    Ok(Json(outcome))
}

// ============ POST /api/v1/reset-session ============

#[derive(Deserialize)]
struct ResetSessionRequest {
    session_id: String,
}

#[derive(Serialize)]
struct ResetSessionResponse {
    message: String,
    session_id: String,
}

/// Handler for `POST /api/v1/reset-session`. Idempotent: resetting an
/// unknown session is still acknowledged.
async fn handle_reset_session(
    State(state): State<AppState>,
    Json(request): Json<ResetSessionRequest>,
) -> Json<ResetSessionResponse> {
    state.agent.sessions().reset(&request.session_id);
    Json(ResetSessionResponse {
        message: "Session reset successfully".to_string(),
        session_id: request.session_id,
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index: IndexStats,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index: state.agent.retrieval().index().stats(),
    })
}

// ============ GET /api/v1/documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentInfo>,
    total_count: usize,
}

/// Handler for `GET /api/v1/documents`. A missing collection directory is
/// an empty listing, not an error.
async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents =
        scan_documents(&state.config.documents).map_err(|e| internal(e.to_string()))?;
    let total_count = documents.len();
    Ok(Json(DocumentsResponse {
        documents,
        total_count,
    }))
}

// ============ GET /api/v1/sessions/stats ============

#[derive(Serialize)]
struct SessionStatsResponse {
    total_sessions: usize,
    timeout_minutes: i64,
    expired_cleaned: usize,
}

/// Handler for `GET /api/v1/sessions/stats`. Runs an expiry sweep first so
/// the reported count reflects only live sessions.
async fn handle_session_stats(State(state): State<AppState>) -> Json<SessionStatsResponse> {
    let expired_cleaned = state.agent.sessions().cleanup_expired();
    let stats = state.agent.sessions().stats();
    Json(SessionStatsResponse {
        total_sessions: stats.total_sessions,
        timeout_minutes: stats.timeout_minutes,
        expired_cleaned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Service;

    #[test]
    fn test_error_mapping_by_type() {
        let cases = [
            (Error::Validation("too long".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (Error::NotFound("session x".into()), StatusCode::NOT_FOUND, "not_found"),
            (
                Error::external(Service::Generation, "boom"),
                StatusCode::BAD_GATEWAY,
                "external_service",
            ),
            (
                Error::Persistence("bad snapshot".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];

        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }
}
