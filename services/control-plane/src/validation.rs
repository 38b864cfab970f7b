//! Validation of submitted items, pod specs, and job-set filters, plus the
//! label/annotation text enrichment applied at intake.

use std::collections::BTreeMap;
use std::collections::HashMap;

use convoy_id::JobId;

use crate::config::SchedulingConfig;
use crate::model::{Job, JobState, JobSubmitRequestItem, JobSubmitResponseItem, PodSpec};
use crate::repository::JobSetFilter;

// The escape placeholder cannot occur in user-supplied text.
const JOB_ID_ESCAPE: &str = "\u{0}";

/// Substitutes `{JobId}` with the job id and unescapes `{{JobId}}` to the
/// literal string `JobId`. The escape is resolved first so an escaped token
/// never picks up the id, and the whole transform is idempotent.
pub fn enrich_text(values: &mut BTreeMap<String, String>, job_id: &str) {
    for value in values.values_mut() {
        let escaped = value.replace("{{JobId}}", JOB_ID_ESCAPE);
        let substituted = escaped.replace("{JobId}", job_id);
        *value = substituted.replace(JOB_ID_ESCAPE, "JobId");
    }
}

/// Structural checks on one submitted item, before pod-spec validation.
pub fn validate_submit_request_item(item: &JobSubmitRequestItem) -> Result<(), String> {
    if item.priority < 0.0 {
        return Err(format!(
            "priority must be non-negative, got {}",
            item.priority
        ));
    }
    if let Some(client_id) = &item.client_id {
        if client_id.is_empty() {
            return Err("clientId may not be empty when present".to_string());
        }
    }
    for ingress in &item.ingress {
        if ingress.ports.is_empty() {
            return Err("ingress declaration has no ports".to_string());
        }
    }
    for service in &item.services {
        if service.ports.is_empty() {
            return Err("service declaration has no ports".to_string());
        }
    }
    Ok(())
}

/// Validates one pod spec against the scheduling config.
pub fn validate_pod_spec(pod_spec: &PodSpec, config: &SchedulingConfig) -> Result<(), String> {
    if pod_spec.containers.is_empty() {
        return Err("pod spec has no containers".to_string());
    }

    let mut names = Vec::new();
    for container in &pod_spec.containers {
        if container.name.is_empty() {
            return Err("container has no name".to_string());
        }
        if names.contains(&container.name) {
            return Err(format!("duplicate container name {:?}", container.name));
        }
        names.push(container.name.clone());

        let resources = &container.resources;
        for (resource, request) in &resources.requests {
            if let Some(limit) = resources.limits.get(resource) {
                if request > limit {
                    return Err(format!(
                        "container {}: {} request {} exceeds limit {}",
                        container.name,
                        resource,
                        request.value(),
                        limit.value()
                    ));
                }
            }
        }
        for (resource, floor) in &config.min_job_resources {
            let requested = resources.requests.get(resource);
            if requested.is_none_or(|q| q < floor) {
                return Err(format!(
                    "container {}: {} request below the minimum of {}",
                    container.name,
                    resource,
                    floor.value()
                ));
            }
        }
    }

    if let Some(grace) = pod_spec.termination_grace_period_seconds {
        if let Some(min) = config.min_termination_grace_period_seconds {
            if grace < min {
                return Err(format!(
                    "termination grace period {grace}s below the minimum of {min}s"
                ));
            }
        }
        if let Some(max) = config.max_termination_grace_period_seconds {
            if grace > max {
                return Err(format!(
                    "termination grace period {grace}s above the maximum of {max}s"
                ));
            }
        }
    }

    Ok(())
}

/// Cross-item validation over the assembled jobs.
///
/// Rejects duplicate non-empty client ids within one submission (the
/// deduplication identity would silently collapse the batch) and enforces the
/// serialized pod-spec size ceiling.
pub fn validate_jobs(jobs: &[Job], config: &SchedulingConfig) -> Vec<JobSubmitResponseItem> {
    let mut items = Vec::new();
    let mut seen_client_ids: HashMap<&str, JobId> = HashMap::new();

    for job in jobs {
        if let Some(client_id) = job.client_id.as_deref() {
            if let Some(first) = seen_client_ids.get(client_id) {
                items.push(JobSubmitResponseItem {
                    job_id: job.id.to_string(),
                    error: format!(
                        "duplicate clientId {client_id:?} in submission; already used by job {first}"
                    ),
                });
                continue;
            }
            seen_client_ids.insert(client_id, job.id);
        }

        let size: usize = job
            .all_pod_specs()
            .map(|spec| serde_json::to_vec(spec).map(|b| b.len()).unwrap_or(0))
            .sum();
        if size as u64 > config.max_pod_spec_size_bytes {
            items.push(JobSubmitResponseItem {
                job_id: job.id.to_string(),
                error: format!(
                    "pod specs total {size} bytes, exceeding the {} byte limit",
                    config.max_pod_spec_size_bytes
                ),
            });
        }
    }

    items
}

/// Only queued, pending, and running may appear in a job-set filter.
pub fn validate_job_set_filter_states(states: &[JobState]) -> Result<(), String> {
    for state in states {
        match state {
            JobState::Queued | JobState::Pending | JobState::Running => {}
            other => {
                return Err(format!(
                    "unsupported state {other:?} in job set filter; only queued, pending, and running may be filtered"
                ));
            }
        }
    }
    Ok(())
}

/// Derives the repository filter from the requested states.
///
/// Queued sets `include_queued`; pending or running set `include_leased`.
pub fn derive_job_set_filter(states: &[JobState]) -> JobSetFilter {
    JobSetFilter {
        include_queued: states.contains(&JobState::Queued),
        include_leased: states.contains(&JobState::Pending) || states.contains(&JobState::Running),
    }
}
