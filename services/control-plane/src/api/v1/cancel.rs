//! Job cancellation: by id, or by queue and job set with optional state
//! filtering.
//!
//! Job-set cancellation processes the target ids in batches to bound memory,
//! checks the cancel verb for every queue a batch touches, and enforces a soft
//! deadline between batches so the caller gets a partial result instead of
//! being killed mid-batch. The ids cancelled so far always reach the caller,
//! riding in the error details when the operation cannot finish.

use std::collections::BTreeSet;

use axum::{extract::State, Json};
use convoy_id::JobId;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ErrorCode};
use crate::api::request_context::RequestContext;
use crate::auth::Permission;
use crate::model::{Job, JobState, QueueVerb};
use crate::repository::{JobSetFilter, QueueRepoError};
use crate::reporting;
use crate::state::AppState;
use crate::validation;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Cancels either one job by id, or a whole queue + job set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobCancelRequest {
    #[serde(default)]
    pub job_id: String,

    #[serde(default)]
    pub queue: String,

    #[serde(default)]
    pub job_set_id: String,

    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancellationResult {
    pub cancelled_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSetCancelRequest {
    #[serde(default)]
    pub queue: String,

    #[serde(default)]
    pub job_set_id: String,

    #[serde(default)]
    pub filter: Option<JobSetStateFilter>,

    #[serde(default)]
    pub reason: String,
}

/// The states a job-set cancellation addresses; absent means all states.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSetStateFilter {
    #[serde(default)]
    pub states: Vec<JobState>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Cancel jobs identified by the request.
///
/// POST /v1/jobs/cancel
pub(crate) async fn cancel_jobs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<JobCancelRequest>,
) -> Result<Json<CancellationResult>, ApiError> {
    if !request.job_id.is_empty() {
        let cancelled = cancel_jobs_by_id(&state, &ctx, &request.job_id, &request.reason).await?;
        return Ok(Json(to_result(cancelled)));
    }
    if !request.job_set_id.is_empty() && !request.queue.is_empty() {
        let cancelled = cancel_jobs_by_queue_and_set(
            &state,
            &ctx,
            &request.queue,
            &request.job_set_id,
            None,
            &request.reason,
        )
        .await?;
        return Ok(Json(to_result(cancelled)));
    }
    Err(
        ApiError::invalid_argument("specify either a job ID or both a queue and a job set ID")
            .with_request_id(ctx.request_id),
    )
}

/// Cancel all jobs of a job set matching the filter.
///
/// POST /v1/job-sets/cancel
pub(crate) async fn cancel_job_set(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<JobSetCancelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.queue.is_empty() || request.job_set_id.is_empty() {
        return Err(
            ApiError::invalid_argument("both queue and job set ID must be specified")
                .with_request_id(ctx.request_id),
        );
    }

    let filter = match &request.filter {
        Some(filter) => {
            validation::validate_job_set_filter_states(&filter.states)
                .map_err(|e| ApiError::invalid_argument(e).with_request_id(ctx.request_id.clone()))?;
            Some(validation::derive_job_set_filter(&filter.states))
        }
        None => None,
    };

    cancel_jobs_by_queue_and_set(
        &state,
        &ctx,
        &request.queue,
        &request.job_set_id,
        filter,
        &request.reason,
    )
    .await?;

    Ok(Json(serde_json::json!({})))
}

// =============================================================================
// Engine
// =============================================================================

async fn cancel_jobs_by_id(
    state: &AppState,
    ctx: &RequestContext,
    job_id: &str,
    reason: &str,
) -> Result<Vec<JobId>, ApiError> {
    let request_id = ctx.request_id.clone();

    let job_id = JobId::parse(job_id).map_err(|e| {
        ApiError::invalid_argument(format!("invalid job ID {job_id:?}: {e}"))
            .with_request_id(request_id.clone())
    })?;

    let jobs = state
        .job_repository()
        .get_existing_jobs_by_ids(&[job_id])
        .await
        .map_err(|e| {
            ApiError::unavailable(format!("error getting job {job_id}: {e}"))
                .with_request_id(request_id.clone())
        })?;
    if jobs.len() != 1 {
        return Err(ApiError::internal(format!(
            "error getting job {job_id}: expected exactly one result, got {}",
            jobs.len()
        ))
        .with_request_id(request_id));
    }

    cancel_batch(state, ctx, jobs, reason).await
}

async fn cancel_jobs_by_queue_and_set(
    state: &AppState,
    ctx: &RequestContext,
    queue: &str,
    job_set_id: &str,
    filter: Option<JobSetFilter>,
    reason: &str,
) -> Result<Vec<JobId>, ApiError> {
    let request_id = ctx.request_id.clone();

    let ids = state
        .job_repository()
        .get_job_set_job_ids(queue, job_set_id, filter.as_ref())
        .await
        .map_err(|e| {
            ApiError::unavailable(format!(
                "error getting job IDs for queue {queue} and job set {job_set_id}: {e}"
            ))
            .with_request_id(request_id.clone())
        })?;

    let batch_size = state.submission_config().cancel_jobs_batch_size.max(1);
    let leeway = state.submission_config().cancel_deadline_leeway;

    // Batches are processed one at a time to bound the number of jobs held in
    // memory; input id order determines cross-batch order.
    let mut cancelled_ids: Vec<JobId> = Vec::new();
    for batch in ids.chunks(batch_size) {
        let jobs = match state.job_repository().get_existing_jobs_by_ids(batch).await {
            Ok(jobs) => jobs,
            Err(e) => {
                return Err(ApiError::internal(format!("error getting jobs: {e}"))
                    .with_details(cancelled_details(&cancelled_ids))
                    .with_request_id(request_id));
            }
        };

        match cancel_batch(state, ctx, jobs, reason).await {
            Ok(batch_cancelled) => cancelled_ids.extend(batch_cancelled),
            // An unauthorized queue aborts the entire remaining operation;
            // other failures surface the partial result.
            Err(e) if e.code() == ErrorCode::PermissionDenied => return Err(e),
            Err(e) => return Err(e.with_details(cancelled_details(&cancelled_ids))),
        }

        if ctx.close_to_deadline(leeway) {
            return Err(
                ApiError::deadline_exceeded("deadline exceeded while cancelling jobs")
                    .with_details(cancelled_details(&cancelled_ids))
                    .with_request_id(request_id),
            );
        }
    }

    Ok(cancelled_ids)
}

/// Cancels one loaded batch: authorize per touched queue, emit `Cancelling`,
/// delete, then emit `Cancelled` for the jobs actually removed.
async fn cancel_batch(
    state: &AppState,
    ctx: &RequestContext,
    jobs: Vec<Job>,
    reason: &str,
) -> Result<Vec<JobId>, ApiError> {
    let request_id = ctx.request_id.clone();
    let principal = &ctx.principal;

    check_cancel_permissions(state, ctx, &jobs).await?;

    let store = state.event_store().as_ref();
    reporting::report_cancelling(store, &principal.name, &jobs, reason)
        .await
        .map_err(|e| {
            ApiError::aborted(format!("error reporting jobs being cancelled: {e}"))
                .with_request_id(request_id.clone())
        })?;

    let deletion_result = state.job_repository().delete_jobs(&jobs).await.map_err(|e| {
        ApiError::unavailable(format!("error deleting jobs: {e}"))
            .with_request_id(request_id.clone())
    })?;

    let mut cancelled = Vec::new();
    for job in jobs {
        match deletion_result.get(&job.id) {
            Some(None) => cancelled.push(job),
            Some(Some(error)) => {
                tracing::error!(job_id = %job.id, error = %error, "Failed to cancel job");
            }
            None => {
                tracing::error!(job_id = %job.id, "No deletion result for job");
            }
        }
    }

    reporting::report_cancelled(store, &principal.name, &cancelled, reason)
        .await
        .map_err(|e| {
            ApiError::internal(format!("error reporting job cancellation: {e}"))
                .with_request_id(request_id)
        })?;

    Ok(cancelled.into_iter().map(|job| job.id).collect())
}

/// Checks the cancel verb on every distinct queue the jobs belong to.
async fn check_cancel_permissions(
    state: &AppState,
    ctx: &RequestContext,
    jobs: &[Job],
) -> Result<(), ApiError> {
    let request_id = ctx.request_id.clone();
    let queue_names: BTreeSet<&str> = jobs.iter().map(|job| job.queue.as_str()).collect();

    for queue_name in queue_names {
        let queue = match state.queue_repository().get(queue_name).await {
            Ok(queue) => queue,
            Err(QueueRepoError::NotFound(_)) => {
                return Err(
                    ApiError::not_found(format!("queue {queue_name:?} does not exist"))
                        .with_request_id(request_id),
                )
            }
            Err(e) => {
                return Err(
                    ApiError::unavailable(format!("error getting queue {queue_name}: {e}"))
                        .with_request_id(request_id),
                )
            }
        };

        state
            .authorizer()
            .authorize_queue_action(
                &ctx.principal,
                &queue,
                Permission::CancelAnyJobs,
                QueueVerb::Cancel,
            )
            .await
            .map_err(|e| {
                ApiError::from_auth(e, &format!("error cancelling jobs in queue {queue_name}"))
                    .with_request_id(request_id.clone())
            })?;
    }

    Ok(())
}

fn to_result(cancelled: Vec<JobId>) -> CancellationResult {
    CancellationResult {
        cancelled_ids: cancelled.iter().map(JobId::to_string).collect(),
    }
}

fn cancelled_details(cancelled: &[JobId]) -> serde_json::Value {
    serde_json::json!({
        "cancelled_ids": cancelled.iter().map(JobId::to_string).collect::<Vec<_>>(),
    })
}
