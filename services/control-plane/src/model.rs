//! Domain model: queues, jobs, and pod specs.
//!
//! Queues outlive jobs and jobs outlive the submission RPC that created them;
//! nothing in this process owns a job beyond that request. Every type here is
//! wire-visible and round-trips through serde.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use convoy_id::JobId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace assigned to submitted items that carry none.
pub const DEFAULT_NAMESPACE: &str = "default";

// =============================================================================
// Resources
// =============================================================================

/// A resource quantity.
///
/// Quantities are plain numeric values (cpu in cores, memory in bytes, and so
/// on); comparisons only need a totally ordered scalar.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(pub f64);

impl Quantity {
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::ops::Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

/// Named resource quantities, keyed by resource name (`cpu`, `memory`, ...).
pub type ResourceList = BTreeMap<String, Quantity>;

// =============================================================================
// Queues
// =============================================================================

/// Verbs that a queue can grant to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueVerb {
    Submit,
    Cancel,
    Reprioritize,
    Watch,
}

impl QueueVerb {
    pub const ALL: [QueueVerb; 4] = [
        QueueVerb::Submit,
        QueueVerb::Cancel,
        QueueVerb::Reprioritize,
        QueueVerb::Watch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueVerb::Submit => "submit",
            QueueVerb::Cancel => "cancel",
            QueueVerb::Reprioritize => "reprioritize",
            QueueVerb::Watch => "watch",
        }
    }
}

impl std::fmt::Display for QueueVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The users and groups a grant applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSubjects {
    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub groups: Vec<String>,
}

/// A single permission grant on a queue: subjects and the verbs they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueGrant {
    pub subjects: GrantSubjects,

    #[serde(default)]
    pub verbs: Vec<QueueVerb>,
}

impl QueueGrant {
    /// An owner grant: the given subjects hold every verb.
    pub fn from_owners(users: Vec<String>, groups: Vec<String>) -> Self {
        Self {
            subjects: GrantSubjects { users, groups },
            verbs: QueueVerb::ALL.to_vec(),
        }
    }
}

/// A named tenant-facing submission point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,

    pub priority_factor: f64,

    #[serde(default)]
    pub permissions: Vec<QueueGrant>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceList>,
}

/// Validation failures for queue records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueValidationError {
    #[error("queue name cannot be empty")]
    EmptyName,

    #[error("queue name {0:?} may only contain lowercase alphanumerics and dashes")]
    InvalidName(String),

    #[error("queue name {0:?} exceeds 63 characters")]
    NameTooLong(String),

    #[error("priority factor must be positive, got {0}")]
    NonPositivePriorityFactor(String),

    #[error("permission grant has no subjects")]
    EmptySubjects,

    #[error("permission grant names a blank subject")]
    BlankSubject,

    #[error("permission grant repeats verb {0}")]
    DuplicateVerb(QueueVerb),
}

impl Queue {
    /// Validates the queue record: name, priority factor, and grants.
    pub fn validate(&self) -> Result<(), QueueValidationError> {
        if self.name.is_empty() {
            return Err(QueueValidationError::EmptyName);
        }
        if self.name.len() > 63 {
            return Err(QueueValidationError::NameTooLong(self.name.clone()));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(QueueValidationError::InvalidName(self.name.clone()));
        }

        if !(self.priority_factor > 0.0) {
            return Err(QueueValidationError::NonPositivePriorityFactor(
                self.priority_factor.to_string(),
            ));
        }

        for grant in &self.permissions {
            if grant.subjects.users.is_empty() && grant.subjects.groups.is_empty() {
                return Err(QueueValidationError::EmptySubjects);
            }
            if grant
                .subjects
                .users
                .iter()
                .chain(grant.subjects.groups.iter())
                .any(|s| s.is_empty())
            {
                return Err(QueueValidationError::BlankSubject);
            }
            let mut seen = Vec::new();
            for verb in &grant.verbs {
                if seen.contains(verb) {
                    return Err(QueueValidationError::DuplicateVerb(*verb));
                }
                seen.push(*verb);
            }
        }

        Ok(())
    }

    /// Whether any grant gives `verb` to the named user or one of the groups.
    pub fn verb_granted_to(&self, verb: QueueVerb, user: &str, groups: &[String]) -> bool {
        self.permissions.iter().any(|grant| {
            grant.verbs.contains(&verb)
                && (grant.subjects.users.iter().any(|u| u == user)
                    || grant
                        .subjects
                        .groups
                        .iter()
                        .any(|g| groups.iter().any(|pg| pg == g)))
        })
    }
}

// =============================================================================
// Job states
// =============================================================================

/// Coarse job lifecycle states, as used by job-set filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
}

// =============================================================================
// Pods
// =============================================================================

/// Requested and limiting resources for one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,

    #[serde(default)]
    pub limits: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,

    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// The workload payload of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

impl PodSpec {
    /// Sums the resource requests of all containers.
    pub fn aggregate_requests(&self) -> ResourceList {
        let mut total = ResourceList::new();
        for container in &self.containers {
            for (name, quantity) in &container.resources.requests {
                total
                    .entry(name.clone())
                    .and_modify(|q| *q = *q + *quantity)
                    .or_insert(*quantity);
            }
        }
        total
    }
}

/// An ingress declaration attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default)]
    pub ports: Vec<u16>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub tls_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    #[default]
    NodePort,
    Headless,
}

/// A service declaration attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub kind: ServiceKind,

    #[serde(default)]
    pub ports: Vec<u16>,
}

// =============================================================================
// Jobs
// =============================================================================

/// A validated, schedulable job record.
///
/// `pod_spec` and `pod_specs` are mutually exclusive; intake enforces that
/// exactly one of them is populated before a `Job` is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Client-chosen deduplication key, scoped to the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    pub queue: String,

    pub job_set_id: String,

    pub namespace: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Deprecated; merged into the pod specs' node selectors at intake.
    #[serde(default)]
    pub required_node_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub ingress: Vec<IngressConfig>,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    pub priority: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec: Option<PodSpec>,

    #[serde(default)]
    pub pod_specs: Vec<PodSpec>,

    pub created: DateTime<Utc>,

    pub owner: String,

    #[serde(default)]
    pub compressed_ownership_groups: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_ttl_seconds: Option<i64>,
}

impl Job {
    /// Iterates over every pod spec of the job, whichever field carries them.
    pub fn all_pod_specs(&self) -> impl Iterator<Item = &PodSpec> {
        self.pod_spec.iter().chain(self.pod_specs.iter())
    }
}

// =============================================================================
// Submission wire types
// =============================================================================

/// A batch job submission addressed to one queue and job set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSubmitRequest {
    #[serde(default)]
    pub queue: String,

    #[serde(default)]
    pub job_set_id: String,

    #[serde(default)]
    pub job_request_items: Vec<JobSubmitRequestItem>,
}

/// One item of a submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSubmitRequestItem {
    #[serde(default)]
    pub priority: f64,

    #[serde(default)]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub required_node_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub ingress: Vec<IngressConfig>,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec: Option<PodSpec>,

    #[serde(default)]
    pub pod_specs: Vec<PodSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_ttl_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitResponse {
    pub job_response_items: Vec<JobSubmitResponseItem>,
}

/// Per-item submission outcome, in input order; `error` is empty on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmitResponseItem {
    pub job_id: String,

    #[serde(default)]
    pub error: String,
}
