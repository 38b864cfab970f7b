//! Collaborator contracts for the stores this service coordinates.
//!
//! The queue catalog, the job repository, the event log, and the
//! scheduling-info oracle are external systems; these traits are their
//! contracts. Multi-store mutations are not transactional: event emission is
//! best-effort after persistence and implementations must keep event appends
//! idempotent rather than adding rollback logic.

pub mod mem;

use std::collections::HashMap;

use async_trait::async_trait;
use convoy_events::{EventError, EventMessage};
use convoy_id::JobId;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::model::{Job, Queue};
use crate::scheduling::{ClusterSchedulingInfo, SchedulingInfoError};

/// Which job states a job-set operation addresses.
///
/// Derived from the requested states: queued sets `include_queued`, pending
/// or running set `include_leased`. An absent filter means all states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSetFilter {
    pub include_queued: bool,
    pub include_leased: bool,
}

/// Per-job outcome of a batch insert.
///
/// Duplicate detection is repository-owned and keyed on `(queue, client_id)`;
/// for a duplicate, `job_id` is the id of the job already registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub job_id: JobId,
    pub error: Option<String>,
    pub duplicate_detected: bool,
}

/// Per-job outcome of an optimistic update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateJobResult {
    pub job_id: JobId,
    pub error: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueRepoError {
    #[error("queue {0:?} does not exist")]
    NotFound(String),

    #[error("queue {0:?} already exists")]
    AlreadyExists(String),

    #[error("queue repository unavailable: {0}")]
    Backend(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobRepoError {
    #[error("job repository unavailable: {0}")]
    Backend(String),
}

/// Mutator applied by [`JobRepository::update_jobs`] under optimistic
/// concurrency: the repository re-reads the jobs, applies the mutator, and
/// writes back under a version guard, retrying the whole cycle on conflict.
/// Side effects of the mutator are re-run by such retries.
pub type JobMutator = dyn Fn(Vec<Job>) -> BoxFuture<'static, Vec<Job>> + Send + Sync;

/// The queue catalog.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Queue, QueueRepoError>;

    async fn create(&self, queue: Queue) -> Result<(), QueueRepoError>;

    /// Replaces the queue record wholesale.
    async fn update(&self, queue: Queue) -> Result<(), QueueRepoError>;

    async fn delete(&self, name: &str) -> Result<(), QueueRepoError>;

    /// All queues in catalog order.
    async fn get_all(&self) -> Result<Vec<Queue>, QueueRepoError>;
}

/// The persistent job store.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts a batch, returning one result per input job in input order.
    async fn add_jobs(&self, jobs: &[Job]) -> Result<Vec<SubmissionResult>, JobRepoError>;

    /// Deletes jobs; the map carries a per-job error, `None` on success.
    async fn delete_jobs(
        &self,
        jobs: &[Job],
    ) -> Result<HashMap<JobId, Option<String>>, JobRepoError>;

    /// Loads the jobs that exist among `ids`; missing ids are skipped.
    async fn get_existing_jobs_by_ids(&self, ids: &[JobId]) -> Result<Vec<Job>, JobRepoError>;

    /// Ids of the jobs in a job set matching the filter.
    async fn get_job_set_job_ids(
        &self,
        queue: &str,
        job_set_id: &str,
        filter: Option<&JobSetFilter>,
    ) -> Result<Vec<JobId>, JobRepoError>;

    /// Ids of all active jobs in a job set.
    async fn get_active_job_ids(
        &self,
        queue: &str,
        job_set_id: &str,
    ) -> Result<Vec<JobId>, JobRepoError>;

    /// Job sets with at least one active job on the queue.
    async fn get_queue_active_job_sets(&self, queue: &str) -> Result<Vec<String>, JobRepoError>;

    /// Queued-job counts, one per requested queue, in request order.
    async fn get_queue_sizes(&self, queues: &[String]) -> Result<Vec<i64>, JobRepoError>;

    /// Applies `mutator` to the jobs under optimistic concurrency.
    async fn update_jobs(
        &self,
        ids: &[JobId],
        mutator: &JobMutator,
    ) -> Result<Vec<UpdateJobResult>, JobRepoError>;
}

/// Append-only lifecycle event log, sharded by job set.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn report(&self, events: Vec<EventMessage>) -> Result<(), EventError>;
}

/// Oracle for per-cluster scheduling capacity profiles.
#[async_trait]
pub trait SchedulingInfoRepository: Send + Sync {
    async fn get_cluster_scheduling_info(
        &self,
    ) -> Result<Vec<ClusterSchedulingInfo>, SchedulingInfoError>;
}
