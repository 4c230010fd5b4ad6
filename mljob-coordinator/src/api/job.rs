//! Job API Handlers
//!
//! HTTP endpoints for job submission, the worker-facing lifecycle
//! (accept, status, logs, bundle, artifacts) and operator queries.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use mljob_core::domain::job::Job;
use mljob_core::domain::log::LogEntry;
use mljob_core::dto::artifact::UploadedArtifact;
use mljob_core::dto::job::{AcceptJob, AcceptedJob, Ack, JobDescriptor, StatusUpdate};
use mljob_core::dto::log::{AppendLogs, LogsAppended};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::job::NewJob;
use crate::service::{artifact_service, job_service, log_service};

// =============================================================================
// Submission & Queries (Operator)
// =============================================================================

/// POST /api/jobs
/// Submit a job as multipart: `name`, `main_entry`, `requirements_file`
/// and the zip `file`
pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let mut name = None;
    let mut main_entry = None;
    let mut requirements_file = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = Some(field.text().await.map_err(bad_multipart)?),
            "main_entry" => main_entry = Some(field.text().await.map_err(bad_multipart)?),
            "requirements_file" => {
                requirements_file = Some(field.text().await.map_err(bad_multipart)?)
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                upload = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let (filename, archive) =
        upload.ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;
    let name = name.ok_or_else(|| ApiError::BadRequest("Missing job name".to_string()))?;

    let job = job_service::create_job(
        state.store.as_ref(),
        &state.storage,
        &state.events,
        NewJob {
            name,
            main_entry,
            requirements_file,
            filename,
            archive,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs
/// List all jobs, newest first
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing all jobs");

    let jobs = job_service::list_jobs(state.store.as_ref()).await?;

    Ok(Json(jobs))
}

/// GET /api/jobs/{id}
/// Get job details by ID
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(state.store.as_ref(), id).await?;

    Ok(Json(job))
}

/// POST /api/jobs/{id}/cancel
/// Cancel a job that has not reached a terminal state
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = job_service::cancel_job(state.store.as_ref(), &state.events, id).await?;

    Ok(Json(job))
}

// =============================================================================
// Worker Lifecycle Endpoints
// =============================================================================

/// GET /api/jobs/pending
/// Pending jobs, oldest first
pub async fn list_pending_jobs(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<JobDescriptor>>> {
    let jobs = job_service::list_pending_jobs(state.store.as_ref()).await?;

    Ok(Json(jobs))
}

/// POST /api/jobs/{id}/accept
/// Claim a pending job; 409 when it is no longer pending
pub async fn accept_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AcceptJob>,
) -> ApiResult<Json<AcceptedJob>> {
    let job =
        job_service::accept_job(state.store.as_ref(), &state.events, id, &req.worker_name).await?;

    Ok(Json(AcceptedJob {
        image_tag: job.image_tag,
    }))
}

/// POST /api/jobs/{id}/status
/// Worker-reported status change with an optional note
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> ApiResult<Json<Ack>> {
    job_service::update_status(
        state.store.as_ref(),
        &state.events,
        id,
        req.status,
        req.note.as_deref(),
    )
    .await?;

    Ok(Json(Ack {
        message: "Status updated".to_string(),
    }))
}

/// POST /api/jobs/{id}/logs
/// Append log lines for a job
pub async fn add_job_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AppendLogs>,
) -> ApiResult<Json<LogsAppended>> {
    let count =
        log_service::append_lines(state.store.as_ref(), &state.events, id, req.lines).await?;

    Ok(Json(LogsAppended { count }))
}

/// GET /api/jobs/{id}/logs
/// Get all logs for a job
pub async fn get_job_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let logs = log_service::get_logs(state.store.as_ref(), id).await?;

    Ok(Json(logs))
}

/// GET /api/jobs/{id}/download
/// The job's zip archive
pub async fn download_bundle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let data = job_service::read_bundle(state.store.as_ref(), &state.storage, id).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"job_{}.zip\"", id),
        ),
    ];

    Ok((headers, data))
}

/// POST /api/jobs/{id}/upload_model
/// Store one artifact sent as the multipart `file` field
pub async fn upload_artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadedArtifact>> {
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(bad_multipart)?;

        let uploaded = artifact_service::upload_artifact(
            state.store.as_ref(),
            &state.storage,
            id,
            &filename,
            &data,
        )
        .await?;

        return Ok(Json(uploaded));
    }

    Err(ApiError::BadRequest("No file part".to_string()))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart body: {}", err))
}
