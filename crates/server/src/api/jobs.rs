//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use spotnik_core::{Job, JobFilter, JobSpec, JobStatus, JobView, OrchestratorError};

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: usize = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<usize>,
    /// Pagination offset
    pub offset: Option<usize>,
}

/// Response for a submitted job
#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub id: String,
    pub status: JobStatus,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
    pub limit: usize,
    pub offset: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn not_found(id: &str) -> (StatusCode, Json<JobErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(JobErrorResponse {
            error: format!("Job not found: {}", id),
        }),
    )
}

fn parse_status(value: &str) -> Option<JobStatus> {
    match value {
        "pending" => Some(JobStatus::Pending),
        "initiating" => Some(JobStatus::Initiating),
        "polling" => Some(JobStatus::Polling),
        "quota_wait" => Some(JobStatus::QuotaWait),
        "completed" => Some(JobStatus::Completed),
        "failed" => Some(JobStatus::Failed),
        _ => None,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new production request
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<JobSpec>,
) -> (StatusCode, Json<SubmitJobResponse>) {
    let id = state.orchestrator().submit(spec);
    (
        StatusCode::CREATED,
        Json(SubmitJobResponse {
            id,
            status: JobStatus::Pending,
        }),
    )
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, impl IntoResponse> {
    match state.orchestrator().job(&id) {
        Some(job) => Ok(Json(job)),
        None => Err(not_found(&id)),
    }
}

/// List jobs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        match parse_status(status) {
            Some(status) => filter = filter.with_status(status),
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(JobErrorResponse {
                        error: format!("Unknown status filter: {}", status),
                    }),
                ));
            }
        }
    }

    let jobs = state
        .orchestrator()
        .jobs(&filter)
        .iter()
        .map(Job::view)
        .collect();

    Ok(Json(ListJobsResponse {
        jobs,
        limit,
        offset,
    }))
}

/// Cancel a job (DELETE endpoint)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, impl IntoResponse> {
    match state.orchestrator().cancel(&id).await {
        Ok(job) => Ok(Json(job.view())),
        Err(OrchestratorError::JobNotFound(_)) => Err(not_found(&id)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(JobErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Re-queue a failed job
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, impl IntoResponse> {
    match state.orchestrator().retry_failed(&id) {
        Ok(job) => Ok(Json(job.view())),
        Err(OrchestratorError::JobNotFound(_)) => Err(not_found(&id)),
        Err(e @ OrchestratorError::InvalidStatus { .. }) => Err((
            StatusCode::CONFLICT,
            Json(JobErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(JobErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
