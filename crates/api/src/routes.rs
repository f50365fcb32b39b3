//! HTTP route handlers.

use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use podsmith_common::{Brief, ErrorKind, Job, JobError, JobMetadata, JobState};
use podsmith_pipeline::{ArtifactsOutcome, BriefValidation, JobSummary};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_jobs: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        active_jobs: state.service.active_jobs().await,
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{what} not found"),
            code: "NOT_FOUND",
        }),
    )
}

fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: podsmith_common::PodsmithError) -> ApiError {
    let kind = err.kind();
    (
        error_status(kind),
        Json(ErrorResponse {
            error: err.to_string(),
            code: match kind {
                ErrorKind::Validation => "VALIDATION",
                ErrorKind::Agent => "AGENT",
                ErrorKind::Backend => "BACKEND",
                ErrorKind::Audio => "AUDIO",
                ErrorKind::Cancelled => "CANCELLED",
                ErrorKind::Internal => "INTERNAL",
            },
        }),
    )
}

/// Accepted-job response.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: String,
    pub state: JobState,
}

/// Submit a brief. Accepts synchronously, generates asynchronously.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(brief): Json<Brief>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    info!(topic = %brief.topic.chars().take(60).collect::<String>(), "Brief received");
    let id = state.service.submit(brief).await.map_err(error_response)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id: id.to_string(),
            state: JobState::Queued,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Json<Vec<JobSummary>> {
    Json(state.service.list(params.limit.min(100), params.offset).await)
}

/// Job status response: terminal state, progress, and a stable error kind.
/// No stack traces, no internal type names.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub id: String,
    pub topic: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub steps_completed: u32,
    pub total_steps: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<Job> for StatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.to_string(),
            topic: job.brief.topic,
            state: job.state,
            current_step: job.current_step,
            steps_completed: job.steps_completed,
            total_steps: job.total_steps,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            audio_path: job.audio_path,
            metadata: job.metadata,
            error: job.error,
        }
    }
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let job = state.service.status(id).await.ok_or_else(|| not_found("job"))?;
    Ok(Json(job.into()))
}

pub async fn artifacts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<podsmith_common::EpisodeArtifacts>, ApiError> {
    match state.service.artifacts(id).await {
        None => Err(not_found("job")),
        Some(ArtifactsOutcome::Ready(artifacts)) => Ok(Json(artifacts)),
        Some(ArtifactsOutcome::NotReady(job_state)) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("artifacts are only available for completed jobs (state: {job_state:?})"),
                code: "NOT_READY",
            }),
        )),
    }
}

/// Stream the finished episode.
pub async fn audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Response, ApiError> {
    let job = state.service.status(id).await.ok_or_else(|| not_found("job"))?;
    let (JobState::Completed, Some(path)) = (job.state, job.audio_path) else {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "audio is only available for completed jobs".into(),
                code: "NOT_READY",
            }),
        ));
    };

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        warn!(path = %path.display(), error = %e, "Final audio missing on disk");
        not_found("audio file")
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{id}.mp3\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub state: JobState,
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let job_state = state
        .service
        .cancel(id)
        .await
        .ok_or_else(|| not_found("job"))?;
    Ok(Json(CancelResponse { state: job_state }))
}

/// Pre-flight validation; never creates a job.
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(brief): Json<Brief>,
) -> Json<BriefValidation> {
    Json(state.service.validate(&brief))
}
