//! Scheduling-config defaulting and cluster feasibility checks.
//!
//! Submitted pod specs are defaulted from [`SchedulingConfig`] before
//! validation, and every job is checked against the cluster capacity profiles
//! reported by the scheduling-info oracle so that an unschedulable job fails
//! the submission instead of waiting forever.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SchedulingConfig;
use crate::model::{Container, Job, JobSubmitResponseItem, PodSpec, ResourceList};

/// One schedulable node shape within a cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTypeCapacity {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub allocatable: ResourceList,
}

/// Capacity profile of one cluster, as reported by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSchedulingInfo {
    pub cluster: String,

    #[serde(default)]
    pub node_types: Vec<NodeTypeCapacity>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulingInfoError {
    #[error("scheduling info unavailable: {0}")]
    Unavailable(String),
}

/// Containers missing a request default it to the limit and vice versa.
pub fn fill_container_requests_and_limits(containers: &mut [Container]) {
    for container in containers {
        let resources = &mut container.resources;
        for (name, quantity) in resources.limits.clone() {
            resources.requests.entry(name).or_insert(quantity);
        }
        for (name, quantity) in resources.requests.clone() {
            resources.limits.entry(name).or_insert(quantity);
        }
    }
}

/// Adds configured default annotations where the key is absent.
pub fn apply_defaults_to_annotations(
    annotations: &mut BTreeMap<String, String>,
    config: &SchedulingConfig,
) {
    for (key, value) in &config.default_annotations {
        annotations
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Applies configured pod-spec defaults: job limits for resources the
/// containers are silent on, active deadline, and termination grace period.
pub fn apply_defaults_to_pod_spec(pod_spec: &mut PodSpec, config: &SchedulingConfig) {
    for container in &mut pod_spec.containers {
        let resources = &mut container.resources;
        for (name, quantity) in &config.default_job_limits {
            if !resources.requests.contains_key(name) && !resources.limits.contains_key(name) {
                resources.requests.insert(name.clone(), *quantity);
                resources.limits.insert(name.clone(), *quantity);
            }
        }
    }

    if pod_spec.active_deadline_seconds.is_none() {
        pod_spec.active_deadline_seconds = config.default_active_deadline_seconds;
    }
    if pod_spec.termination_grace_period_seconds.is_none() {
        pod_spec.termination_grace_period_seconds =
            config.default_termination_grace_period_seconds;
    }
}

/// Checks that each job could fit on some cluster.
///
/// Returns one response item per infeasible job; empty means all jobs fit.
pub fn validate_jobs_can_be_scheduled(
    jobs: &[Job],
    clusters: &[ClusterSchedulingInfo],
) -> Vec<JobSubmitResponseItem> {
    jobs.iter()
        .filter(|job| !job_fits_any_cluster(job, clusters))
        .map(|job| JobSubmitResponseItem {
            job_id: job.id.to_string(),
            error: format!(
                "job {} can't be scheduled on any cluster: no node type satisfies its node selector and resource requests",
                job.id
            ),
        })
        .collect()
}

fn job_fits_any_cluster(job: &Job, clusters: &[ClusterSchedulingInfo]) -> bool {
    clusters
        .iter()
        .any(|cluster| job.all_pod_specs().all(|pod| pod_fits_cluster(pod, cluster)))
}

fn pod_fits_cluster(pod: &PodSpec, cluster: &ClusterSchedulingInfo) -> bool {
    let requests = pod.aggregate_requests();
    cluster.node_types.iter().any(|node_type| {
        selector_matches(&pod.node_selector, &node_type.labels)
            && requests_fit(&requests, &node_type.allocatable)
    })
}

fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

fn requests_fit(requests: &ResourceList, allocatable: &ResourceList) -> bool {
    requests.iter().all(|(name, requested)| {
        allocatable
            .get(name)
            .is_some_and(|available| available >= requested)
    })
}
