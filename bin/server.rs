// Record Import - Web Server
// REST API with Axum over the shared SQLite store

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use record_import::config::{init_tracing, StoreArgs, DEFAULT_LOG_FILTER};
use record_import::{
    Association, AssociationType, FailedRow, ImportError, ImportRow, Record, RecordImporter,
    SqliteStore,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "record-server", version, about = "REST API for record imports")]
struct ServerArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[arg(long, env = "RECORD_IMPORT_PORT", default_value_t = 3000)]
    port: u16,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    importer: Arc<RecordImporter>,
}

impl AppState {
    fn store(&self) -> Result<MutexGuard<'_, SqliteStore>, ApiError> {
        self.store
            .lock()
            .map_err(|_| ApiError::internal("store lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        let status = match &err {
            ImportError::RowRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ImportError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ImportError>() {
            Ok(err) => err.into(),
            Err(err) => ApiError::bad_request(format!("{:#}", err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Query / response types
// ============================================================================

#[derive(Deserialize)]
struct RecordQuery {
    email: Option<String>,
}

#[derive(Deserialize)]
struct AssociationQuery {
    #[serde(rename = "type")]
    association_type: Option<String>,
}

#[derive(Deserialize)]
struct ImportQuery {
    file_name: Option<String>,
}

#[derive(Serialize)]
struct NamedCount {
    name: String,
    count: i64,
}

#[derive(Serialize)]
struct StatsResponse {
    total_records: i64,
    total_associations: i64,
    by_sector: Vec<NamedCount>,
    by_resource: Vec<NamedCount>,
    by_exhibition: Vec<NamedCount>,
    per_month: Vec<NamedCount>,
}

fn named(counts: Vec<(String, i64)>) -> Vec<NamedCount> {
    counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/records?email= - All records, or those owning one email
async fn get_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Vec<Record>> {
    let store = state.store()?;
    let records = match query.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => store.find_records_by_email(email)?,
        _ => store.all_records()?,
    };
    Ok(Json(ApiResponse::ok(records)))
}

/// PUT /api/records/:id - Admin edit, same contact rules as an import
async fn edit_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(row): Json<ImportRow>,
) -> ApiResult<Record> {
    let store = state.store()?;
    let record = state.importer.apply_edit(&*store, id, &row)?;
    Ok(Json(ApiResponse::ok(record)))
}

/// GET /api/associations?type= - Lookup values, optionally of one type
async fn get_associations(
    State(state): State<AppState>,
    Query(query): Query<AssociationQuery>,
) -> ApiResult<Vec<Association>> {
    let association_type = query
        .association_type
        .as_deref()
        .map(str::parse::<AssociationType>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let store = state.store()?;
    let associations = store.list_associations(association_type)?;
    Ok(Json(ApiResponse::ok(associations)))
}

/// GET /api/stats - Dashboard counts
async fn get_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let store = state.store()?;
    let stats = StatsResponse {
        total_records: store.record_count()?,
        total_associations: store.association_count()?,
        by_sector: named(store.record_counts_by_association(AssociationType::Sector)?),
        by_resource: named(store.record_counts_by_association(AssociationType::Resource)?),
        by_exhibition: named(store.record_counts_by_association(AssociationType::Exhibition)?),
        per_month: named(store.records_per_month()?),
    };
    Ok(Json(ApiResponse::ok(stats)))
}

/// POST /api/import?file_name= - CSV body, returns the run summary
async fn import_csv(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("empty upload"));
    }
    let file_name = query.file_name.unwrap_or_else(|| "upload.csv".to_string());

    let summary = tokio::task::spawn_blocking(move || {
        let store = state.store()?;
        state
            .importer
            .run(&*store, &file_name, &body)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal(format!("import task failed: {}", e)))??;

    info!(import_id = %summary.import_id, "{}", summary.notification_body());
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(summary))))
}

/// GET /api/imports/:id/failures - Rejected rows of one run
async fn get_failures(
    State(state): State<AppState>,
    Path(import_id): Path<String>,
) -> ApiResult<Vec<FailedRow>> {
    let store = state.store()?;
    if store.import_run(&import_id)?.is_none() {
        return Err(ImportError::NotFound(format!("import {}", import_id)).into());
    }
    Ok(Json(ApiResponse::ok(store.failed_rows(&import_id)?)))
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/records", get(get_records))
        .route("/records/:id", put(edit_record))
        .route("/associations", get(get_associations))
        .route("/stats", get(get_stats))
        .route("/import", post(import_csv))
        .route("/imports/:id/failures", get(get_failures))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);
    let args = ServerArgs::parse();

    let store = args.store.open_store()?;
    let importer = RecordImporter::new(args.store.load_rules()?);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        importer: Arc::new(importer),
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("record-server listening on http://{}", addr);
    info!("Health check: http://{}/api/health", addr);

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
