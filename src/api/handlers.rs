//! API request handlers
//!
//! Handlers for the health, import, export and download endpoints.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::cli::open_store;
use crate::config::WORKBOOK_EXTENSIONS;
use crate::error::{LedgerError, LedgerResult};
use crate::excel::{export_project, import_upload, ImportSummary};
use crate::types::UserStats;
use crate::upload;

use super::server::AppState;

pub const USER_HEADER: &str = "x-user-id";
pub const EXCEL_FIELD: &str = "excel";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure<T: Serialize + Default>(context: &str, err: &LedgerError) -> ApiReply<T> {
    if err.is_client_error() {
        warn!(error = %err, "{}", context);
    } else {
        error!(error = %err, "{}", context);
    }
    (status_for(err), Json(ApiResponse::err(format!("{}: {}", context, err))))
}

/// Acting user id from the `x-user-id` header
fn acting_user(headers: &HeaderMap) -> Result<i64, (StatusCode, String)> {
    let raw = headers
        .get(USER_HEADER)
        .ok_or((StatusCode::UNAUTHORIZED, format!("Missing {} header", USER_HEADER)))?;
    raw.to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or((StatusCode::BAD_REQUEST, format!("Invalid {} header", USER_HEADER)))
}

fn unauthorized<T: Serialize + Default>((status, message): (StatusCode, String)) -> ApiReply<T> {
    (status, Json(ApiResponse::err(message)))
}

/// Run storage/codec work off the async runtime
async fn run_blocking<T, F>(work: F) -> LedgerResult<T>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LedgerError::Io(std::io::Error::other(e)))?
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "import".to_string(),
            "export".to_string(),
            "download".to_string(),
        ],
    }))
}

/// Import response
#[derive(Serialize, Default)]
pub struct ImportResponse {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub incomplete_count: usize,
    pub message: String,
}

impl From<ImportSummary> for ImportResponse {
    fn from(summary: ImportSummary) -> Self {
        Self {
            message: summary.message(),
            imported_count: summary.imported_count,
            skipped_count: summary.skipped_count,
            incomplete_count: summary.incomplete_count,
        }
    }
}

async fn read_excel_field(multipart: &mut Multipart) -> LedgerResult<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| LedgerError::Validation(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some(EXCEL_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(LedgerError::Validation("No file selected".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| LedgerError::Validation(format!("Malformed upload: {}", e)))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(LedgerError::Validation(format!(
        "Missing '{}' file field",
        EXCEL_FIELD
    )))
}

/// POST /api/v1/projects/:project_id/import - Import a workbook into a project
pub async fn import_excel(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiReply<ImportResponse> {
    let user_id = match acting_user(&headers) {
        Ok(id) => id,
        Err(e) => return unauthorized(e),
    };
    let (filename, bytes) = match read_excel_field(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => return failure("Import failed", &e),
    };

    let config = state.ledger.clone();
    let result = run_blocking(move || {
        let mut store = open_store(&config)?;
        let staged =
            upload::stage_bytes(&config.temp_dir(), &filename, &bytes, &WORKBOOK_EXTENSIONS)?;
        import_upload(&mut store, user_id, project_id, &staged)
    })
    .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(ApiResponse::ok(summary.into()))),
        Err(e) => failure("Import failed", &e),
    }
}

/// Export response
#[derive(Serialize, Default)]
pub struct ExportResponse {
    pub export_id: i64,
    pub filename: String,
    pub file_size: i64,
    pub download_url: String,
}

/// POST /api/v1/projects/:project_id/export - Render a project to a workbook
pub async fn export_excel(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
) -> ApiReply<ExportResponse> {
    let user_id = match acting_user(&headers) {
        Ok(id) => id,
        Err(e) => return unauthorized(e),
    };

    let config = state.ledger.clone();
    let result = run_blocking(move || {
        let store = open_store(&config)?;
        export_project(&store, &config, user_id, project_id, Local::now())
    })
    .await;

    match result {
        Ok(manifest) => (
            StatusCode::OK,
            Json(ApiResponse::ok(ExportResponse {
                download_url: format!("/api/v1/exports/{}/download", manifest.id),
                export_id: manifest.id,
                filename: manifest.filename,
                file_size: manifest.file_size,
            })),
        ),
        Err(e) => failure("Export failed", &e),
    }
}

/// GET /api/v1/exports/:export_id/download - Stream a stored export
pub async fn download_export(
    State(state): State<Arc<AppState>>,
    Path(export_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let user_id = match acting_user(&headers) {
        Ok(id) => id,
        Err(e) => return unauthorized::<()>(e).into_response(),
    };

    let config = state.ledger.clone();
    let result = run_blocking(move || {
        let store = open_store(&config)?;
        let manifest = store.find_export(user_id, export_id)?;
        if !manifest.file_path.exists() {
            return Err(LedgerError::NotFound(format!(
                "Export file {} no longer exists",
                manifest.filename
            )));
        }
        let bytes = std::fs::read(&manifest.file_path)?;
        Ok((manifest.filename, bytes))
    })
    .await;

    match result {
        Ok((filename, bytes)) => (
            [
                (header::CONTENT_TYPE, XLSX_MIME.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => failure::<()>("Download failed", &e).into_response(),
    }
}

/// GET /api/v1/stats - Counts for the acting user
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiReply<UserStats> {
    let user_id = match acting_user(&headers) {
        Ok(id) => id,
        Err(e) => return unauthorized(e),
    };

    let config = state.ledger.clone();
    match run_blocking(move || open_store(&config)?.user_stats(user_id)).await {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::ok(stats))),
        Err(e) => failure("Stats failed", &e),
    }
}
