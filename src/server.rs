//! HTTP API for NCM search.
//!
//! Exposes the search engine and entry lookup as a JSON HTTP API for the
//! back-office services that classify invoice line items.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | no | Health check (returns version) |
//! | `POST` | `/ncm/search` | yes | Ranked NCM candidates for a free-text query |
//! | `GET`  | `/ncm/{code}` | yes | A single entry by code (dotted or not) |
//!
//! # Authentication
//!
//! `/ncm/*` routes require `Authorization: Bearer <token>`. The server only
//! knows the SHA-256 hex digests of valid tokens (`server.api_token_sha256`).
//! Requests without a matching token are rejected before the engine runs.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid query: query text is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `timeout` (408), `internal` (500).

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{Config, ServerConfig};
use crate::error::SearchError;
use crate::get::find_entry;
use crate::models::{hash_text, MatchType, NomenclatureEntry, SearchQuery};
use crate::search::{build_engine, SearchEngine};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<SearchEngine>,
    /// Lowercase hex SHA-256 digests of accepted bearer tokens.
    token_digests: Arc<HashSet<String>>,
    request_timeout: Duration,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(config).await?);

    if config.server.api_token_sha256.is_empty() {
        tracing::warn!("no API tokens configured, every /ncm request will be rejected");
    }
    if !config.embedding.is_enabled() {
        tracing::warn!("embedding provider disabled, search answers from lexical matches only");
    }

    let app = router(engine, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "NCM search API listening");
    println!("NCM search API listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router around a search engine.
pub fn router(engine: Arc<SearchEngine>, server: &ServerConfig) -> Router {
    let state = AppState {
        engine,
        token_digests: Arc::new(
            server
                .api_token_sha256
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .collect(),
        ),
        request_timeout: Duration::from_millis(server.request_timeout_ms),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/ncm/search", post(handle_search))
        .route("/ncm/{code}", get(handle_get))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(protected)
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(_) => bad_request(err.to_string()),
            SearchError::Authentication => unauthorized(err.to_string()),
            SearchError::Cancelled => timeout_error("search did not finish in time"),
            SearchError::EmbeddingProvider(_) | SearchError::IndexQuery(_) => {
                internal(err.to_string())
            }
        }
    }
}

// ============ Auth ============

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let authorized = token.is_some_and(|t| state.token_digests.contains(&hash_text(t)));
    if !authorized {
        tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
        return Err(SearchError::Authentication.into());
    }

    Ok(next.run(request).await)
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

// ============ POST /ncm/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    threshold: Option<f64>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Serialize)]
struct SearchHit {
    code: String,
    description: String,
    score: f64,
    #[serde(rename = "matchType")]
    match_type: MatchType,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;

    let query = SearchQuery {
        text: req.query,
        limit: req.limit,
        threshold: req.threshold,
    };

    let results = state
        .engine
        .search_with_cancel(&query, tokio::time::sleep(state.request_timeout))
        .await?;

    Ok(Json(SearchResponse {
        results: results
            .into_iter()
            .map(|r| SearchHit {
                code: r.entry.code,
                description: r.entry.description,
                score: r.score,
                match_type: r.match_type,
            })
            .collect(),
    }))
}

// ============ GET /ncm/{code} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<NomenclatureEntry>, AppError> {
    if crate::ncm::canonical_code(&code).is_none() {
        return Err(bad_request(format!("invalid NCM code: {}", code)));
    }

    match find_entry(state.engine.store().as_ref(), &code).await {
        Ok(Some(entry)) => Ok(Json(entry)),
        Ok(None) => Err(not_found(format!("entry not found: {}", code))),
        Err(e) => Err(internal(e.to_string())),
    }
}
