//! Job intake: construct, default, validate, quota-check, feasibility-check,
//! and persist a batch of jobs, emitting lifecycle events along the way.
//!
//! Stages run in order and the first to fail short-circuits the request:
//! construction, cross-item validation, queue resolution (with optional
//! auto-provisioning), quota, per-queue authorization, feasibility,
//! pre-persistence `Submitted` event, persistence, post-persistence dispatch.

use axum::{extract::State, Json};
use chrono::Utc;
use convoy_id::JobId;

use crate::api::error::{ApiError, MAX_RESPONSE_ITEMS};
use crate::api::request_context::RequestContext;
use crate::auth::{Permission, EVERYONE_GROUP};
use crate::compress;
use crate::model::{
    Job, JobSubmitRequest, JobSubmitResponse, JobSubmitResponseItem, Queue, QueueGrant, QueueVerb,
    DEFAULT_NAMESPACE,
};
use crate::repository::QueueRepoError;
use crate::reporting::{self, DuplicateSubmission, JobFailure};
use crate::scheduling;
use crate::state::AppState;
use crate::validation;

/// Submit a batch of jobs to one queue and job set.
///
/// POST /v1/jobs
pub(crate) async fn submit_jobs(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<JobSubmitRequest>,
) -> Result<Json<JobSubmitResponse>, ApiError> {
    let request_id = ctx.request_id.clone();
    let principal = ctx.principal.clone();
    let num_items = request.job_request_items.len();

    let jobs = create_jobs(&state, &ctx, &request).await?;

    let cross_failures = validation::validate_jobs(&jobs, state.scheduling_config());
    if !cross_failures.is_empty() {
        return Err(
            item_failure_error("validating", cross_failures, num_items).with_request_id(request_id)
        );
    }

    let queue = get_queue_or_create(&state, &ctx, &request.queue).await?;

    check_queue_limit(&state, &queue, num_items, &request_id).await?;

    state
        .authorizer()
        .authorize_queue_action(
            &principal,
            &queue,
            Permission::SubmitAnyJobs,
            QueueVerb::Submit,
        )
        .await
        .map_err(|e| {
            ApiError::from_auth(e, &format!("error submitting jobs to queue {}", queue.name))
                .with_request_id(request_id.clone())
        })?;

    // Check that every job would fit on some cluster, to avoid having users
    // wait for a job that may never be scheduled.
    let cluster_info = state
        .scheduling_info()
        .get_cluster_scheduling_info()
        .await
        .map_err(|e| {
            ApiError::unavailable(format!("error getting scheduling info: {e}"))
                .with_request_id(request_id.clone())
        })?;
    let infeasible = scheduling::validate_jobs_can_be_scheduled(&jobs, &cluster_info);
    if !infeasible.is_empty() {
        return Err(item_failure_error("validating", infeasible, num_items)
            .with_request_id(request_id));
    }

    reporting::report_submitted(state.event_store().as_ref(), &principal.name, &jobs)
        .await
        .map_err(|e| {
            ApiError::aborted(format!("error reporting submitted jobs: {e}"))
                .with_request_id(request_id.clone())
        })?;

    let submission_results = match state.job_repository().add_jobs(&jobs).await {
        Ok(results) => results,
        Err(e) => {
            let failures: Vec<JobFailure<'_>> = jobs
                .iter()
                .map(|job| JobFailure {
                    job,
                    reason: format!("failed to save job: {e}"),
                })
                .collect();
            if let Err(report_err) =
                reporting::report_failed(state.event_store().as_ref(), "", &failures).await
            {
                return Err(ApiError::internal(format!(
                    "error reporting failure events: {report_err}"
                ))
                .with_request_id(request_id));
            }
            return Err(
                ApiError::aborted(format!("error saving jobs: {e}")).with_request_id(request_id)
            );
        }
    };

    if submission_results.len() != jobs.len() {
        return Err(ApiError::internal(format!(
            "job repository returned {} results for {} jobs",
            submission_results.len(),
            jobs.len()
        ))
        .with_request_id(request_id));
    }

    let mut response_items = Vec::with_capacity(jobs.len());
    let mut created: Vec<Job> = Vec::new();
    let mut failures: Vec<JobFailure<'_>> = Vec::new();
    let mut duplicates: Vec<DuplicateSubmission<'_>> = Vec::new();

    for (job, result) in jobs.iter().zip(&submission_results) {
        if let Some(error) = &result.error {
            response_items.push(JobSubmitResponseItem {
                job_id: result.job_id.to_string(),
                error: error.clone(),
            });
            failures.push(JobFailure {
                job,
                reason: format!("failed to save job: {error}"),
            });
        } else if result.duplicate_detected {
            duplicates.push(DuplicateSubmission {
                job,
                original_job_id: result.job_id,
            });
            response_items.push(JobSubmitResponseItem {
                job_id: result.job_id.to_string(),
                error: String::new(),
            });
        } else {
            created.push(job.clone());
            response_items.push(JobSubmitResponseItem {
                job_id: result.job_id.to_string(),
                error: String::new(),
            });
        }
    }

    let response = JobSubmitResponse {
        job_response_items: response_items,
    };

    // Emission failures after persistence surface as internal errors, but the
    // partial response stays visible in the error details.
    let store = state.event_store().as_ref();
    if let Err(e) = reporting::report_failed(store, "", &failures).await {
        return Err(partial_response_error(
            format!("error reporting failed jobs: {e}"),
            &response,
            request_id,
        ));
    }
    if let Err(e) = reporting::report_duplicates(store, &principal.name, &duplicates).await {
        return Err(partial_response_error(
            format!("error reporting duplicate jobs: {e}"),
            &response,
            request_id,
        ));
    }
    if let Err(e) = reporting::report_queued(store, &principal.name, &created).await {
        return Err(partial_response_error(
            format!("error reporting queued jobs: {e}"),
            &response,
            request_id,
        ));
    }

    Ok(Json(response))
}

/// Builds validated job records from the request items.
///
/// Every item gets its ULID minted here, so the id is stable and reported
/// even when the item fails a later check. If any item fails, the whole stage
/// fails with invalid-argument carrying the first failures as details.
async fn create_jobs(
    state: &AppState,
    ctx: &RequestContext,
    request: &JobSubmitRequest,
) -> Result<Vec<Job>, ApiError> {
    let request_id = ctx.request_id.clone();
    let config = state.scheduling_config();

    // The compressor goes back to the pool when the guard drops, on every
    // exit path out of this function.
    let mut compressor = state.compressor_pool().acquire().await.map_err(|e| {
        ApiError::unavailable(format!("error acquiring compressor: {e}"))
            .with_request_id(request_id.clone())
    })?;
    let compressed_ownership_groups =
        compress::compress_string_list(&mut compressor, &ctx.principal.groups).map_err(|e| {
            ApiError::internal(format!("error compressing ownership groups: {e}"))
                .with_request_id(request_id.clone())
        })?;

    if request.job_set_id.is_empty() {
        return Err(ApiError::invalid_argument("job set not specified").with_request_id(request_id));
    }
    if request.queue.is_empty() {
        return Err(ApiError::invalid_argument("queue not specified").with_request_id(request_id));
    }

    let mut jobs = Vec::with_capacity(request.job_request_items.len());
    let mut response_items = Vec::new();

    for (i, item) in request.job_request_items.iter().enumerate() {
        let job_id = JobId::new();

        if item.pod_spec.is_some() && !item.pod_specs.is_empty() {
            response_items.push(JobSubmitResponseItem {
                job_id: job_id.to_string(),
                error: format!(
                    "job {i} in job set {} contains both podSpec and podSpecs, but may only contain either",
                    request.job_set_id
                ),
            });
            continue;
        }
        if item.pod_spec.is_none() && item.pod_specs.is_empty() {
            response_items.push(JobSubmitResponseItem {
                job_id: job_id.to_string(),
                error: format!(
                    "job {i} in job set {} contains no podSpec",
                    request.job_set_id
                ),
            });
            continue;
        }

        let mut item = item.clone();
        let namespace = if item.namespace.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            item.namespace.clone()
        };

        for pod_spec in item.pod_spec.iter_mut().chain(item.pod_specs.iter_mut()) {
            scheduling::fill_container_requests_and_limits(&mut pod_spec.containers);
        }
        scheduling::apply_defaults_to_annotations(&mut item.annotations, config);
        for pod_spec in item.pod_spec.iter_mut().chain(item.pod_specs.iter_mut()) {
            scheduling::apply_defaults_to_pod_spec(pod_spec, config);
        }

        if let Err(e) = validation::validate_submit_request_item(&item) {
            response_items.push(JobSubmitResponseItem {
                job_id: job_id.to_string(),
                error: format!(
                    "error validating job {i} of job set {}: {e}",
                    request.job_set_id
                ),
            });
            continue;
        }

        let mut pod_spec_error = None;
        for pod_spec in item.pod_spec.iter().chain(item.pod_specs.iter()) {
            if let Err(e) = validation::validate_pod_spec(pod_spec, config) {
                pod_spec_error = Some(e);
                break;
            }
        }
        if let Some(e) = pod_spec_error {
            response_items.push(JobSubmitResponseItem {
                job_id: job_id.to_string(),
                error: format!(
                    "error validating job {i} of job set {}: {e}",
                    request.job_set_id
                ),
            });
            continue;
        }

        // requiredNodeLabels is deprecated; merge it into the selectors.
        for pod_spec in item.pod_spec.iter_mut().chain(item.pod_specs.iter_mut()) {
            for (key, value) in &item.required_node_labels {
                pod_spec.node_selector.insert(key.clone(), value.clone());
            }
        }

        let job_id_string = job_id.to_string();
        validation::enrich_text(&mut item.labels, &job_id_string);
        validation::enrich_text(&mut item.annotations, &job_id_string);

        jobs.push(Job {
            id: job_id,
            client_id: item.client_id,
            queue: request.queue.clone(),
            job_set_id: request.job_set_id.clone(),
            namespace,
            labels: item.labels,
            annotations: item.annotations,
            required_node_labels: item.required_node_labels,
            ingress: item.ingress,
            services: item.services,
            priority: item.priority,
            scheduler: item.scheduler,
            pod_spec: item.pod_spec,
            pod_specs: item.pod_specs,
            created: Utc::now(),
            owner: ctx.principal.name.clone(),
            compressed_ownership_groups: compressed_ownership_groups.clone(),
            queue_ttl_seconds: item.queue_ttl_seconds,
        });
    }

    if !response_items.is_empty() {
        return Err(item_failure_error(
            "creating",
            response_items,
            request.job_request_items.len(),
        )
        .with_request_id(request_id));
    }

    Ok(jobs)
}

/// Resolves the target queue, provisioning it when configured to.
///
/// Auto-provisioning requires the caller to hold `SubmitAnyJobs` and names
/// the caller sole owner, together with its non-universal groups.
async fn get_queue_or_create(
    state: &AppState,
    ctx: &RequestContext,
    queue_name: &str,
) -> Result<Queue, ApiError> {
    let request_id = ctx.request_id.clone();

    match state.queue_repository().get(queue_name).await {
        Ok(queue) => Ok(queue),
        Err(QueueRepoError::NotFound(_)) => {
            if !state.submission_config().auto_create_queues {
                return Err(ApiError::aborted(format!(
                    "queue {queue_name} not found; refusing to create it automatically (autoCreateQueues is disabled)"
                ))
                .with_request_id(request_id));
            }
            if state
                .authorizer()
                .authorize_action(&ctx.principal, Permission::SubmitAnyJobs)
                .await
                .is_err()
            {
                return Err(ApiError::permission_denied(format!(
                    "queue {queue_name} not found; not creating it because user {} lacks the {} permission",
                    ctx.principal.name,
                    Permission::SubmitAnyJobs
                ))
                .with_request_id(request_id));
            }

            let owner_groups: Vec<String> = ctx
                .principal
                .groups
                .iter()
                .filter(|group| group.as_str() != EVERYONE_GROUP)
                .cloned()
                .collect();
            let queue = Queue {
                name: queue_name.to_string(),
                priority_factor: state.submission_config().default_priority_factor,
                permissions: vec![QueueGrant::from_owners(
                    vec![ctx.principal.name.clone()],
                    owner_groups,
                )],
                resource_limits: None,
            };

            state
                .queue_repository()
                .create(queue.clone())
                .await
                .map_err(|e| {
                    ApiError::aborted(format!(
                        "couldn't find or create queue {queue_name}: {e}"
                    ))
                    .with_request_id(request_id)
                })?;
            tracing::info!(queue = %queue_name, owner = %ctx.principal.name, "Auto-provisioned queue");
            Ok(queue)
        }
        Err(e) => Err(
            ApiError::unavailable(format!("couldn't load queue {queue_name}: {e}"))
                .with_request_id(request_id),
        ),
    }
}

/// Rejects the submission when it would push the queue past the queued-jobs
/// quota. A non-positive limit disables the check.
async fn check_queue_limit(
    state: &AppState,
    queue: &Queue,
    batch_size: usize,
    request_id: &str,
) -> Result<(), ApiError> {
    let limit = state.submission_config().default_queued_jobs_limit;
    if limit <= 0 {
        return Ok(());
    }

    let sizes = state
        .job_repository()
        .get_queue_sizes(std::slice::from_ref(&queue.name))
        .await
        .map_err(|e| {
            ApiError::unavailable(format!("error counting queued jobs: {e}"))
                .with_request_id(request_id.to_string())
        })?;
    let Some(queued) = sizes.first().copied() else {
        return Err(
            ApiError::internal("no queue size returned from job repository")
                .with_request_id(request_id.to_string()),
        );
    };

    let queued_after_submission = queued + batch_size as i64;
    if queued_after_submission > limit {
        return Err(ApiError::invalid_argument(format!(
            "too many queued jobs in queue {}: currently have {queued}, would have {queued_after_submission} with the new submission, limit is {limit}",
            queue.name
        ))
        .with_request_id(request_id.to_string()));
    }

    Ok(())
}

/// Builds the invalid-argument error for a list of per-item failures,
/// truncating the attached details to [`MAX_RESPONSE_ITEMS`].
fn item_failure_error(
    action: &str,
    items: Vec<JobSubmitResponseItem>,
    num_submitted: usize,
) -> ApiError {
    let num_failed = items.len();
    let shown = num_failed.min(MAX_RESPONSE_ITEMS);
    let detail = format!(
        "error {action} {num_failed} of {num_submitted} job(s) submitted; first {shown} error(s) attached"
    );
    let truncated = &items[..shown];
    ApiError::invalid_argument(detail).with_details(serde_json::json!({
        "job_response_items": truncated,
    }))
}

fn partial_response_error(
    detail: String,
    response: &JobSubmitResponse,
    request_id: String,
) -> ApiError {
    ApiError::internal(detail)
        .with_details(serde_json::json!({
            "job_response_items": response.job_response_items,
        }))
        .with_request_id(request_id)
}
