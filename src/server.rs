//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/v1/predict` | Predict category and tags |
//! | `POST` | `/api/v1/validation/run` | Validate a product payload |
//! | `POST` | `/api/v1/commit` | Validate, then push an edit to the catalog |
//! | `GET`  | `/api/v1/records` | List commit attempts |
//! | `GET`  | `/api/v1/meta` | Mapping cache diagnostics |
//! | `POST` | `/api/v1/mapping/rebuild` | Rebuild the mapping cache |
//! | `GET`  | `/api/v1/categories/search` | Keyword search over the category directory |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "title or author is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Rule violations and catalog failures are not errors: they come back in
//! the validation result or as a `FAILED` record.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use shelfmark_core::models::{CategoryEntry, PredictionResult, SyncAttemptRecord, ValidationResult};
use shelfmark_core::payload::ProductPayload;
use shelfmark_core::predict::PredictRequest;
use shelfmark_core::store::{AuditQuery, AuditStore, CategoryDirectory, Page};
use shelfmark_core::ShelfError;

use crate::config::Config;
use crate::services::Services;

/// Starts the HTTP server on `[server].bind`.
///
/// The mapping cache is built before the listener opens. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::open(config).await?;
    services.rebuild_mapping().await?;
    serve(services, &config.server.bind).await
}

/// Serve an already assembled set of services.
pub async fn serve(services: Services, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(services);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "http server listening");
    println!("Shelfmark listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/predict", post(handle_predict))
        .route("/api/v1/validation/run", post(handle_validate))
        .route("/api/v1/commit", post(handle_commit))
        .route("/api/v1/records", get(handle_records))
        .route("/api/v1/meta", get(handle_meta))
        .route("/api/v1/mapping/rebuild", post(handle_rebuild))
        .route("/api/v1/categories/search", get(handle_category_search))
        .layer(cors)
        .with_state(services)
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

fn internal(err: impl std::fmt::Display) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

impl From<ShelfError> for AppError {
    fn from(err: ShelfError) -> Self {
        match err {
            ShelfError::Input(msg) => bad_request(msg),
            other => internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(format!("{:#}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rej: JsonRejection) -> Self {
        bad_request(rej.body_text())
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

// ============ POST /api/v1/predict ============

async fn handle_predict(
    State(services): State<Services>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, AppError> {
    let Json(req) = body?;
    Ok(Json(services.predictor.predict(&req).await?))
}

// ============ POST /api/v1/validation/run ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    #[serde(default)]
    product_data: Value,
}

async fn handle_validate(
    State(services): State<Services>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidationResult>, AppError> {
    let Json(req) = body?;
    let payload = ProductPayload::from_value(&req.product_data)?;
    Ok(Json(services.validator.validate(&payload).await?))
}

// ============ POST /api/v1/commit ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitRequest {
    #[serde(default)]
    account_id: Option<i64>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    update_payload: Value,
}

async fn handle_commit(
    State(services): State<Services>,
    body: Result<Json<CommitRequest>, JsonRejection>,
) -> Result<Json<SyncAttemptRecord>, AppError> {
    let Json(req) = body?;
    let account_id = req
        .account_id
        .ok_or_else(|| bad_request("accountId is required"))?;
    let product_id = req.product_id.unwrap_or_default();
    let record = services
        .gate
        .commit(account_id, &product_id, &req.update_payload)
        .await?;
    Ok(Json(record))
}

// ============ GET /api/v1/records ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordsParams {
    account_id: Option<i64>,
    id: Option<i64>,
    title: Option<String>,
    #[serde(default)]
    page: usize,
    #[serde(default)]
    size: usize,
}

async fn handle_records(
    State(services): State<Services>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<Page<SyncAttemptRecord>>, AppError> {
    let query = AuditQuery {
        account_id: params.account_id,
        id: params.id,
        title: params.title,
        page: params.page,
        size: params.size,
    };
    let page = services.store.list(&query).await?;
    if let (Some(id), true) = (query.id, page.items.is_empty()) {
        return Err(not_found(format!("no sync record with id {}", id)));
    }
    Ok(Json(page))
}

// ============ GET /api/v1/meta, POST /api/v1/mapping/rebuild ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaResponse {
    cache_loaded: bool,
    category_count: usize,
    total_tag_links: usize,
}

fn meta(services: &Services) -> MetaResponse {
    let snap = services.cache.snapshot();
    MetaResponse {
        cache_loaded: snap.is_loaded(),
        category_count: snap.category_count(),
        total_tag_links: snap.total_tag_links(),
    }
}

async fn handle_meta(State(services): State<Services>) -> Json<MetaResponse> {
    Json(meta(&services))
}

async fn handle_rebuild(State(services): State<Services>) -> Result<Json<MetaResponse>, AppError> {
    services.rebuild_mapping().await?;
    Ok(Json(meta(&services)))
}

// ============ GET /api/v1/categories/search ============

#[derive(Deserialize)]
struct CategorySearchParams {
    #[serde(default)]
    keyword: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

async fn handle_category_search(
    State(services): State<Services>,
    Query(params): Query<CategorySearchParams>,
) -> Result<Json<Vec<CategoryEntry>>, AppError> {
    Ok(Json(
        services.store.search(&params.keyword, params.limit).await?,
    ))
}
