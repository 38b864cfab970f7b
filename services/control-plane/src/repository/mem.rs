//! In-memory reference implementations of the collaborator contracts.
//!
//! These back the development binary and the integration tests. The job store
//! versions its records so `update_jobs` exercises the real optimistic
//! read-modify-write cycle, retries included.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use convoy_events::{EventError, EventMessage};
use convoy_id::JobId;

use crate::model::{Job, Queue};
use crate::scheduling::{ClusterSchedulingInfo, SchedulingInfoError};

use super::{
    EventStore, JobMutator, JobRepoError, JobRepository, JobSetFilter, QueueRepoError,
    QueueRepository, SchedulingInfoRepository, SubmissionResult, UpdateJobResult,
};

// =============================================================================
// Queue catalog
// =============================================================================

/// In-memory queue catalog.
#[derive(Clone, Default)]
pub struct MemQueueRepository {
    queues: Arc<Mutex<BTreeMap<String, Queue>>>,
}

impl MemQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueRepository for MemQueueRepository {
    async fn get(&self, name: &str) -> Result<Queue, QueueRepoError> {
        self.queues
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| QueueRepoError::NotFound(name.to_string()))
    }

    async fn create(&self, queue: Queue) -> Result<(), QueueRepoError> {
        let mut queues = self.queues.lock().unwrap();
        if queues.contains_key(&queue.name) {
            return Err(QueueRepoError::AlreadyExists(queue.name));
        }
        queues.insert(queue.name.clone(), queue);
        Ok(())
    }

    async fn update(&self, queue: Queue) -> Result<(), QueueRepoError> {
        let mut queues = self.queues.lock().unwrap();
        if !queues.contains_key(&queue.name) {
            return Err(QueueRepoError::NotFound(queue.name));
        }
        queues.insert(queue.name.clone(), queue);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), QueueRepoError> {
        let mut queues = self.queues.lock().unwrap();
        if queues.remove(name).is_none() {
            return Err(QueueRepoError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Queue>, QueueRepoError> {
        Ok(self.queues.lock().unwrap().values().cloned().collect())
    }
}

// =============================================================================
// Job store
// =============================================================================

#[derive(Clone)]
struct StoredJob {
    job: Job,
    version: u64,
    leased: bool,
}

#[derive(Default)]
struct JobStoreInner {
    jobs: BTreeMap<JobId, StoredJob>,
    by_client: HashMap<(String, String), JobId>,
}

/// In-memory versioned job store.
#[derive(Clone, Default)]
pub struct MemJobRepository {
    inner: Arc<Mutex<JobStoreInner>>,
}

impl MemJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored job, if any.
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .get(&id)
            .map(|stored| stored.job.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves a job from the queued to the leased state.
    pub fn mark_leased(&self, id: JobId) {
        if let Some(stored) = self.inner.lock().unwrap().jobs.get_mut(&id) {
            stored.leased = true;
        }
    }
}

#[async_trait]
impl JobRepository for MemJobRepository {
    async fn add_jobs(&self, jobs: &[Job]) -> Result<Vec<SubmissionResult>, JobRepoError> {
        let mut inner = self.inner.lock().unwrap();
        let mut results = Vec::with_capacity(jobs.len());

        for job in jobs {
            if let Some(client_id) = &job.client_id {
                let key = (job.queue.clone(), client_id.clone());
                if let Some(original) = inner.by_client.get(&key) {
                    results.push(SubmissionResult {
                        job_id: *original,
                        error: None,
                        duplicate_detected: true,
                    });
                    continue;
                }
                inner.by_client.insert(key, job.id);
            }

            inner.jobs.insert(
                job.id,
                StoredJob {
                    job: job.clone(),
                    version: 1,
                    leased: false,
                },
            );
            results.push(SubmissionResult {
                job_id: job.id,
                error: None,
                duplicate_detected: false,
            });
        }

        Ok(results)
    }

    async fn delete_jobs(
        &self,
        jobs: &[Job],
    ) -> Result<HashMap<JobId, Option<String>>, JobRepoError> {
        let mut inner = self.inner.lock().unwrap();
        let mut outcome = HashMap::with_capacity(jobs.len());

        for job in jobs {
            match inner.jobs.remove(&job.id) {
                Some(stored) => {
                    if let Some(client_id) = &stored.job.client_id {
                        inner
                            .by_client
                            .remove(&(stored.job.queue.clone(), client_id.clone()));
                    }
                    outcome.insert(job.id, None);
                }
                None => {
                    outcome.insert(job.id, Some("job does not exist".to_string()));
                }
            }
        }

        Ok(outcome)
    }

    async fn get_existing_jobs_by_ids(&self, ids: &[JobId]) -> Result<Vec<Job>, JobRepoError> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.jobs.get(id).map(|stored| stored.job.clone()))
            .collect())
    }

    async fn get_job_set_job_ids(
        &self,
        queue: &str,
        job_set_id: &str,
        filter: Option<&JobSetFilter>,
    ) -> Result<Vec<JobId>, JobRepoError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|stored| stored.job.queue == queue && stored.job.job_set_id == job_set_id)
            .filter(|stored| match filter {
                None => true,
                Some(filter) => {
                    if stored.leased {
                        filter.include_leased
                    } else {
                        filter.include_queued
                    }
                }
            })
            .map(|stored| stored.job.id)
            .collect())
    }

    async fn get_active_job_ids(
        &self,
        queue: &str,
        job_set_id: &str,
    ) -> Result<Vec<JobId>, JobRepoError> {
        self.get_job_set_job_ids(queue, job_set_id, None).await
    }

    async fn get_queue_active_job_sets(&self, queue: &str) -> Result<Vec<String>, JobRepoError> {
        let inner = self.inner.lock().unwrap();
        let mut job_sets: Vec<String> = inner
            .jobs
            .values()
            .filter(|stored| stored.job.queue == queue)
            .map(|stored| stored.job.job_set_id.clone())
            .collect();
        job_sets.sort();
        job_sets.dedup();
        Ok(job_sets)
    }

    async fn get_queue_sizes(&self, queues: &[String]) -> Result<Vec<i64>, JobRepoError> {
        let inner = self.inner.lock().unwrap();
        Ok(queues
            .iter()
            .map(|queue| {
                inner
                    .jobs
                    .values()
                    .filter(|stored| &stored.job.queue == queue && !stored.leased)
                    .count() as i64
            })
            .collect())
    }

    async fn update_jobs(
        &self,
        ids: &[JobId],
        mutator: &JobMutator,
    ) -> Result<Vec<UpdateJobResult>, JobRepoError> {
        loop {
            let (snapshot, versions): (Vec<Job>, Vec<(JobId, u64)>) = {
                let inner = self.inner.lock().unwrap();
                let mut snapshot = Vec::new();
                let mut versions = Vec::new();
                for id in ids {
                    if let Some(stored) = inner.jobs.get(id) {
                        snapshot.push(stored.job.clone());
                        versions.push((*id, stored.version));
                    }
                }
                (snapshot, versions)
            };

            let mutated = mutator(snapshot).await;

            let mut inner = self.inner.lock().unwrap();
            let conflicted = versions.iter().any(|(id, version)| {
                inner
                    .jobs
                    .get(id)
                    .map(|stored| stored.version != *version)
                    .unwrap_or(false)
            });
            if conflicted {
                continue;
            }

            for job in mutated {
                if let Some(stored) = inner.jobs.get_mut(&job.id) {
                    stored.job = job;
                    stored.version += 1;
                }
            }

            return Ok(ids
                .iter()
                .map(|id| UpdateJobResult {
                    job_id: *id,
                    error: if inner.jobs.contains_key(id) {
                        None
                    } else {
                        Some("job does not exist".to_string())
                    },
                })
                .collect());
        }
    }
}

// =============================================================================
// Event log
// =============================================================================

/// In-memory append-only event log.
#[derive(Clone, Default)]
pub struct MemEventStore {
    events: Arc<Mutex<Vec<EventMessage>>>,
}

impl MemEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the full event stream, in append order.
    pub fn events(&self) -> Vec<EventMessage> {
        self.events.lock().unwrap().clone()
    }

    /// Event kind names in append order, for assertions on ordering.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.kind())
            .collect()
    }
}

#[async_trait]
impl EventStore for MemEventStore {
    async fn report(&self, events: Vec<EventMessage>) -> Result<(), EventError> {
        self.events.lock().unwrap().extend(events);
        Ok(())
    }
}

// =============================================================================
// Scheduling-info oracle
// =============================================================================

/// Oracle returning a fixed set of cluster profiles.
#[derive(Clone, Default)]
pub struct FixedSchedulingInfoRepository {
    clusters: Vec<ClusterSchedulingInfo>,
}

impl FixedSchedulingInfoRepository {
    pub fn new(clusters: Vec<ClusterSchedulingInfo>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl SchedulingInfoRepository for FixedSchedulingInfoRepository {
    async fn get_cluster_scheduling_info(
        &self,
    ) -> Result<Vec<ClusterSchedulingInfo>, SchedulingInfoError> {
        Ok(self.clusters.clone())
    }
}
