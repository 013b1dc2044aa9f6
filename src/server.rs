//! HTTP API over the company store and the upload job manager.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/api/companies` | Filtered, paged listing plus total count |
//! | `GET`    | `/api/companies/{id}` | One company |
//! | `POST`   | `/api/companies/{id}/enrich` | Enrich one company now |
//! | `DELETE` | `/api/companies` | Delete every company |
//! | `POST`   | `/api/upload` | Queue an upload job (`202 Accepted`) |
//! | `GET`    | `/api/jobs/{id}` | Job status |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "company 42 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `processing_failed` (422), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser dashboard
//! can talk to the API directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::error::PipelineError;
use crate::jobs::{JobManager, JobStatus, UploadInput};
use crate::migrate;
use crate::models::{Company, CompanyFilters, EmployeeSize};
use crate::pipeline::UploadPipeline;
use crate::store::{CompanyStore, SqliteStore};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn CompanyStore>,
    jobs: JobManager,
}

impl AppState {
    pub fn new(jobs: JobManager) -> Self {
        Self {
            store: Arc::clone(jobs.pipeline().store()),
            jobs,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/companies",
            get(handle_list_companies).delete(handle_delete_companies),
        )
        .route("/api/companies/{id}", get(handle_get_company))
        .route("/api/companies/{id}/enrich", post(handle_enrich_company))
        .route("/api/upload", post(handle_upload))
        .route("/api/jobs/{id}", get(handle_job_status))
        .layer(cors)
        .with_state(state)
}

/// Open the database, build the pipeline from `config` and serve until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store: Arc<dyn CompanyStore> = Arc::new(SqliteStore::new(pool));

    let pipeline = UploadPipeline::from_config(config, store)?;
    let state = AppState::new(JobManager::new(pipeline));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        ai = %config.ai.provider,
        news = %config.news.provider,
        "server listening"
    );
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

#[derive(Debug)]
pub struct AppError {
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Maps library errors onto HTTP statuses by their [`PipelineError`] kind.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::NotFound(_)) => not_found(err.to_string()),
            Some(PipelineError::MalformedInput(_)) => bad_request(err.to_string()),
            Some(PipelineError::Processing(_)) | Some(PipelineError::Enrichment { .. }) => {
                AppError {
                    status: StatusCode::UNPROCESSABLE_ENTITY,
                    code: "processing_failed",
                    message: format!("{:#}", err),
                }
            }
            None => {
                tracing::error!(error = %format!("{:#}", err), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: format!("{:#}", err),
                }
            }
        }
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

// ============ GET /api/companies ============

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub country: Option<String>,
    pub employee_size: Option<String>,
    pub domain: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListParams {
    fn into_filters(self) -> Result<CompanyFilters, AppError> {
        let employee_size = match self.employee_size.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_size_param(raw).ok_or_else(|| {
                bad_request(format!(
                    "employee_size must be one of {}",
                    EmployeeSize::label_list()
                ))
            })?),
        };

        Ok(CompanyFilters {
            country: self.country.filter(|s| !s.trim().is_empty()),
            employee_size,
            domain: self.domain.filter(|s| !s.trim().is_empty()),
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// An unencoded `+` in a query string arrives as a space ("10,000 ").
fn parse_size_param(raw: &str) -> Option<EmployeeSize> {
    raw.parse()
        .ok()
        .or_else(|| format!("{}+", raw).parse().ok())
}

#[derive(Serialize)]
struct ListResponse {
    companies: Vec<Company>,
    total: i64,
    limit: i64,
    offset: i64,
}

async fn handle_list_companies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let filters = params.into_filters()?;
    let companies = state.store.list(&filters).await?;
    let total = state.store.count(&filters).await?;

    Ok(Json(ListResponse {
        companies,
        total,
        limit: filters.effective_limit(),
        offset: filters.effective_offset(),
    }))
}

// ============ GET /api/companies/{id} ============

async fn handle_get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Company>, AppError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("company {} not found", id)))
}

// ============ POST /api/companies/{id}/enrich ============

async fn handle_enrich_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Company>, AppError> {
    let company = state
        .jobs
        .pipeline()
        .enricher()
        .enrich_and_store(state.store.as_ref(), &id)
        .await?;
    Ok(Json(company))
}

// ============ DELETE /api/companies ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: u64,
}

async fn handle_delete_companies(
    State(state): State<AppState>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.store.delete_all().await?;
    tracing::info!(deleted, "deleted all companies");
    Ok(Json(DeleteResponse { deleted }))
}

// ============ POST /api/upload ============

/// Either `csv` text or a `records` array must be given.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub records: Option<Vec<Value>>,
    #[serde(default)]
    pub enable_enrichment: bool,
}

#[derive(Serialize)]
struct UploadResponse {
    job_id: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let input = match (req.csv, req.records) {
        (Some(csv), None) if !csv.trim().is_empty() => UploadInput::Csv(csv),
        (None, Some(records)) if !records.is_empty() => UploadInput::Records(records),
        (Some(_), Some(_)) => return Err(bad_request("send either csv or records, not both")),
        _ => return Err(bad_request("csv must not be empty")),
    };

    let job_id = state.jobs.submit(input, req.enable_enrichment).await;
    Ok((StatusCode::ACCEPTED, Json(UploadResponse { job_id })))
}

// ============ GET /api/jobs/{id} ============

async fn handle_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, AppError> {
    state
        .jobs
        .status(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("job {} not found", id)))
}
