/// API Request Handlers
/// Reuses core business logic from the pipeline modules

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cli::VERSION_WITH_BUILD;
use crate::core::host::{HostCollector, HostConfig};
use crate::core::inspector::ContainerRecord;
use crate::core::{BackupOptions, Guardian, RunError, RunSummary};
use crate::utils::is_safe_file_name;

// ============================================================================
// Shared State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub guardian: Arc<Guardian>,
    pub status: Arc<RwLock<BackupStatus>>,
    pub output_dir: PathBuf,
}

/// Dashboard-visible state of the most recent backup run.
#[derive(Debug, Clone, Serialize)]
pub struct BackupStatus {
    pub running: bool,
    pub message: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_summary: Option<RunSummaryDto>,
}

impl Default for BackupStatus {
    fn default() -> Self {
        Self {
            running: false,
            message: "Ready".to_string(),
            last_run: None,
            last_error: None,
            last_summary: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummaryDto {
    pub containers: usize,
    pub failed_inspections: usize,
    pub warnings: Vec<String>,
    pub changes: usize,
    pub first_run: bool,
    pub duration_ms: u64,
}

impl From<&RunSummary> for RunSummaryDto {
    fn from(summary: &RunSummary) -> Self {
        Self {
            containers: summary.containers,
            failed_inspections: summary.failed_inspections,
            warnings: summary.warnings.clone(),
            changes: summary.changes,
            first_run: summary.first_run,
            duration_ms: summary.duration.as_millis() as u64,
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
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

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

#[derive(Serialize)]
pub struct SystemInfo {
    version: &'static str,
    timestamp: DateTime<Utc>,
    host: HostConfig,
}

#[derive(Serialize)]
pub struct BackupFile {
    name: String,
    size: u64,
    size_human: String,
    modified: DateTime<Utc>,
}

#[derive(Deserialize, Default)]
pub struct StartBackupRequest {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub mask_secrets: Option<bool>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn get_containers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ContainerRecord>>>, StatusCode> {
    let (records, _warnings) = state
        .guardian
        .inspect_containers()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ApiResponse::ok(records)))
}

pub async fn get_system(State(state): State<AppState>) -> Json<ApiResponse<SystemInfo>> {
    let host = HostCollector::new(state.guardian.settings().host_paths.clone()).collect();

    Json(ApiResponse::ok(SystemInfo {
        version: VERSION_WITH_BUILD,
        timestamp: Utc::now(),
        host,
    }))
}

/// Kick off a backup run in the background. A second trigger while one is in
/// progress is rejected with 409, matching the orchestrator's single-flight
/// guarantee.
pub async fn start_backup(
    State(state): State<AppState>,
    body: Option<Json<StartBackupRequest>>,
) -> Response {
    {
        let status = state.status.read().await;
        if status.running {
            return (
                StatusCode::CONFLICT,
                Json(ApiResponse::<()>::error("Backup already running".to_string())),
            )
                .into_response();
        }
    }

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let opts = BackupOptions {
        output_dir: request
            .output
            .map(PathBuf::from)
            .unwrap_or_else(|| state.output_dir.clone()),
        mask_secrets: request.mask_secrets.unwrap_or(true),
    };

    {
        let mut status = state.status.write().await;
        status.running = true;
        status.message = "Generating backup bundle...".to_string();
        status.last_error = None;
    }

    let guardian = Arc::clone(&state.guardian);
    let shared_status = Arc::clone(&state.status);
    tokio::spawn(async move {
        let result = guardian.run_backup(&opts).await;
        let mut status = shared_status.write().await;
        status.running = false;
        match result {
            Ok(summary) => {
                status.message = format!(
                    "Backup completed: {} containers, {} changes",
                    summary.containers, summary.changes
                );
                status.last_run = Some(Utc::now());
                status.last_summary = Some(RunSummaryDto::from(&summary));
            }
            Err(RunError::AlreadyRunning) => {
                status.message = "Rejected: a run was already in progress".to_string();
            }
            Err(e) => {
                status.message = "Backup failed".to_string();
                status.last_error = Some(e.to_string());
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok("Backup started".to_string())),
    )
        .into_response()
}

pub async fn backup_status(State(state): State<AppState>) -> Json<BackupStatus> {
    Json(state.status.read().await.clone())
}

pub async fn list_backups(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BackupFile>>>, StatusCode> {
    let mut files = Vec::new();

    if let Ok(entries) = std::fs::read_dir(&state.output_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let known = path
                .extension()
                .map(|ext| ["json", "yml", "sh", "md", "env", "log"].iter().any(|k| ext == *k))
                .unwrap_or(false);
            if !path.is_file() || !known {
                continue;
            }

            if let Ok(metadata) = entry.metadata() {
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                files.push(BackupFile {
                    name: entry.file_name().to_string_lossy().to_string(),
                    size: metadata.len(),
                    size_human: crate::utils::format_bytes(metadata.len()),
                    modified,
                });
            }
        }
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(Json(ApiResponse::ok(files)))
}

pub async fn download_file(
    Path(filename): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if !is_safe_file_name(&filename) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let path = state.output_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(&filename).first_or_octet_stream();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime.as_ref())
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                )
                .body(Body::from(contents))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("File not found".to_string())),
        )
            .into_response(),
    }
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.guardian.engine().ping().await {
        Ok(()) => Json(ApiResponse::ok("ok".to_string())).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::<()>::error(e.to_string())),
        )
            .into_response(),
    }
}
