//! Job reprioritization.
//!
//! Addressing mirrors cancellation: an explicit id list, or a queue and job
//! set resolving to all active ids. The priority write happens under the job
//! repository's optimistic update contract; the mutator also emits the
//! `Updated` and `Reprioritized` events, so a conflicting write that forces a
//! retry re-emits them. That duplication is a known property of the current
//! contract and is deliberately left in place.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use convoy_id::JobId;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::auth::Permission;
use crate::model::{Job, QueueVerb};
use crate::repository::{EventStore, QueueRepoError};
use crate::reporting;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobReprioritizeRequest {
    #[serde(default)]
    pub job_ids: Vec<String>,

    #[serde(default)]
    pub queue: String,

    #[serde(default)]
    pub job_set_id: String,

    pub new_priority: f64,
}

/// Maps each addressed job id to an error string; empty means success.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobReprioritizeResponse {
    pub reprioritization_results: HashMap<String, String>,
}

// =============================================================================
// Handler
// =============================================================================

/// Update the priority of one or more jobs.
///
/// POST /v1/jobs/reprioritize
pub(crate) async fn reprioritize_jobs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<JobReprioritizeRequest>,
) -> Result<Json<JobReprioritizeResponse>, ApiError> {
    let request_id = ctx.request_id.clone();

    let jobs = if !request.job_ids.is_empty() {
        let mut ids = Vec::with_capacity(request.job_ids.len());
        for raw in &request.job_ids {
            ids.push(JobId::parse(raw).map_err(|e| {
                ApiError::invalid_argument(format!("invalid job ID {raw:?}: {e}"))
                    .with_request_id(request_id.clone())
            })?);
        }
        state
            .job_repository()
            .get_existing_jobs_by_ids(&ids)
            .await
            .map_err(|e| {
                ApiError::unavailable(format!("error getting jobs by ID: {e}"))
                    .with_request_id(request_id.clone())
            })?
    } else if !request.queue.is_empty() && !request.job_set_id.is_empty() {
        let ids = state
            .job_repository()
            .get_active_job_ids(&request.queue, &request.job_set_id)
            .await
            .map_err(|e| {
                ApiError::unavailable(format!(
                    "error getting job IDs for queue {} and job set {}: {e}",
                    request.queue, request.job_set_id
                ))
                .with_request_id(request_id.clone())
            })?;
        state
            .job_repository()
            .get_existing_jobs_by_ids(&ids)
            .await
            .map_err(|e| {
                ApiError::unavailable(format!(
                    "error getting jobs for queue {} and job set {}: {e}",
                    request.queue, request.job_set_id
                ))
                .with_request_id(request_id.clone())
            })?
    } else {
        return Err(ApiError::invalid_argument(
            "specify either job IDs or both a queue and a job set ID",
        )
        .with_request_id(request_id));
    };

    check_reprioritize_permissions(&state, &ctx, &jobs).await?;

    let principal_name = ctx.principal.name.clone();
    let new_priority = request.new_priority;

    reporting::report_reprioritizing(
        state.event_store().as_ref(),
        &principal_name,
        &jobs,
        new_priority,
    )
    .await
    .map_err(|e| {
        ApiError::unavailable(format!("error reporting job reprioritization: {e}"))
            .with_request_id(request_id.clone())
    })?;

    let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
    let id_strings: Vec<String> = ids.iter().map(JobId::to_string).collect();

    let event_store: Arc<dyn EventStore> = state.event_store().clone();
    let mutator = move |mut jobs: Vec<Job>| -> BoxFuture<'static, Vec<Job>> {
        let event_store = event_store.clone();
        let principal_name = principal_name.clone();
        let id_strings = id_strings.clone();
        Box::pin(async move {
            for job in &mut jobs {
                job.priority = new_priority;
            }
            // Emission failures inside the critical section are logged, never
            // propagated, so they cannot fail the optimistic write.
            if let Err(e) =
                reporting::report_updated(event_store.as_ref(), &principal_name, &jobs).await
            {
                tracing::warn!(
                    error = %e,
                    job_ids = %id_strings.join(", "),
                    "Failed to report updated events for reprioritized jobs"
                );
            }
            if let Err(e) = reporting::report_reprioritized(
                event_store.as_ref(),
                &principal_name,
                &jobs,
                new_priority,
            )
            .await
            {
                tracing::warn!(
                    error = %e,
                    job_ids = %id_strings.join(", "),
                    "Failed to report reprioritized events"
                );
            }
            jobs
        })
    };

    let results = state
        .job_repository()
        .update_jobs(&ids, &mutator)
        .await
        .map_err(|e| {
            ApiError::unavailable(format!("error reprioritizing jobs: {e}"))
                .with_request_id(request_id)
        })?;

    let reprioritization_results = results
        .into_iter()
        .map(|result| {
            (
                result.job_id.to_string(),
                result.error.unwrap_or_default(),
            )
        })
        .collect();

    Ok(Json(JobReprioritizeResponse {
        reprioritization_results,
    }))
}

/// Checks the reprioritize verb on every distinct queue the jobs belong to.
async fn check_reprioritize_permissions(
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
                Permission::ReprioritizeAnyJobs,
                QueueVerb::Reprioritize,
            )
            .await
            .map_err(|e| {
                ApiError::from_auth(
                    e,
                    &format!("error reprioritizing jobs in queue {queue_name}"),
                )
                .with_request_id(request_id.clone())
            })?;
    }

    Ok(())
}
