//! Shared harness for the control-plane integration tests: in-memory
//! backends, a server bound to an ephemeral port, and failure-injecting
//! repository decorators.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use convoy_events::{EventError, EventMessage};
use convoy_id::JobId;

use convoy_control_plane::api;
use convoy_control_plane::auth::{ActionAuthorizer, Permission, PrincipalAuthorizer};
use convoy_control_plane::config::{SchedulingConfig, SubmissionConfig};
use convoy_control_plane::model::{Job, PodSpec, Quantity, Queue, QueueGrant, ResourceList};
use convoy_control_plane::repository::mem::{
    FixedSchedulingInfoRepository, MemEventStore, MemJobRepository, MemQueueRepository,
};
use convoy_control_plane::repository::{
    EventStore, JobMutator, JobRepoError, JobRepository, JobSetFilter, QueueRepository,
    SubmissionResult, UpdateJobResult,
};
use convoy_control_plane::scheduling::{ClusterSchedulingInfo, NodeTypeCapacity};
use convoy_control_plane::state::AppState;

pub const ADMIN_AUTH: &str = "Bearer user:admin:admins";
pub const POWER_AUTH: &str = "Bearer user:power:power-users";
pub const ALICE_AUTH: &str = "Bearer user:alice";

pub fn bearer(user: &str, groups: &str) -> String {
    if groups.is_empty() {
        format!("Bearer user:{user}")
    } else {
        format!("Bearer user:{user}:{groups}")
    }
}

/// A cluster that fits anything the tests submit.
pub fn big_cluster() -> ClusterSchedulingInfo {
    ClusterSchedulingInfo {
        cluster: "test".to_string(),
        node_types: vec![NodeTypeCapacity {
            labels: BTreeMap::new(),
            allocatable: ResourceList::from([
                ("cpu".to_string(), Quantity(1024.0)),
                ("memory".to_string(), Quantity(1e15)),
            ]),
        }],
    }
}

/// A cluster with the given cpu capacity and no labels.
pub fn cluster_with_cpu(cpu: f64) -> ClusterSchedulingInfo {
    ClusterSchedulingInfo {
        cluster: "small".to_string(),
        node_types: vec![NodeTypeCapacity {
            labels: BTreeMap::new(),
            allocatable: ResourceList::from([("cpu".to_string(), Quantity(cpu))]),
        }],
    }
}

/// A queue owned (all verbs) by the given user.
pub fn queue_owned_by(name: &str, user: &str) -> Queue {
    Queue {
        name: name.to_string(),
        priority_factor: 1.0,
        permissions: vec![QueueGrant::from_owners(vec![user.to_string()], Vec::new())],
        resource_limits: None,
    }
}

/// A directly constructed job record, for seeding the job store.
pub fn mk_job(queue: &str, job_set_id: &str) -> Job {
    Job {
        id: JobId::new(),
        client_id: None,
        queue: queue.to_string(),
        job_set_id: job_set_id.to_string(),
        namespace: "default".to_string(),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        required_node_labels: BTreeMap::new(),
        ingress: Vec::new(),
        services: Vec::new(),
        priority: 1.0,
        scheduler: None,
        pod_spec: Some(PodSpec::default()),
        pod_specs: Vec::new(),
        created: Utc::now(),
        owner: "seed".to_string(),
        compressed_ownership_groups: Vec::new(),
        queue_ttl_seconds: None,
    }
}

/// A minimal valid submission item as raw JSON.
pub fn simple_item() -> serde_json::Value {
    serde_json::json!({
        "priority": 2.0,
        "pod_spec": {
            "containers": [{
                "name": "main",
                "resources": {
                    "requests": {"cpu": 1.0},
                    "limits": {"cpu": 1.0}
                }
            }]
        }
    })
}

pub fn submit_body(queue: &str, job_set_id: &str, items: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "queue": queue,
        "job_set_id": job_set_id,
        "job_request_items": items,
    })
}

// =============================================================================
// Failure-injecting decorators
// =============================================================================

/// Wraps the in-memory job repository and fails selected operations.
#[derive(Clone)]
pub struct FlakyJobRepository {
    pub inner: Arc<MemJobRepository>,
    fail_add: Arc<AtomicBool>,
    add_errors: Arc<Mutex<HashMap<String, String>>>,
    update_errors: Arc<Mutex<HashMap<JobId, String>>>,
}

impl FlakyJobRepository {
    pub fn new(inner: Arc<MemJobRepository>) -> Self {
        Self {
            inner,
            fail_add: Arc::new(AtomicBool::new(false)),
            add_errors: Arc::new(Mutex::new(HashMap::new())),
            update_errors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Makes the next `add_jobs` calls fail wholesale.
    pub fn fail_adds(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    /// Injects a per-item persistence failure, keyed by client id.
    pub fn fail_add_for_client(&self, client_id: &str, error: &str) {
        self.add_errors
            .lock()
            .unwrap()
            .insert(client_id.to_string(), error.to_string());
    }

    /// Injects an error into the optimistic-update result for one job.
    pub fn fail_update_for(&self, job_id: JobId, error: &str) {
        self.update_errors
            .lock()
            .unwrap()
            .insert(job_id, error.to_string());
    }
}

#[async_trait]
impl JobRepository for FlakyJobRepository {
    async fn add_jobs(&self, jobs: &[Job]) -> Result<Vec<SubmissionResult>, JobRepoError> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(JobRepoError::Backend("injected add failure".to_string()));
        }
        let add_errors = self.add_errors.lock().unwrap().clone();
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let injected = job
                .client_id
                .as_deref()
                .and_then(|client_id| add_errors.get(client_id));
            match injected {
                Some(error) => results.push(SubmissionResult {
                    job_id: job.id,
                    error: Some(error.clone()),
                    duplicate_detected: false,
                }),
                None => {
                    let mut inner = self.inner.add_jobs(std::slice::from_ref(job)).await?;
                    results.push(inner.remove(0));
                }
            }
        }
        Ok(results)
    }

    async fn delete_jobs(
        &self,
        jobs: &[Job],
    ) -> Result<HashMap<JobId, Option<String>>, JobRepoError> {
        self.inner.delete_jobs(jobs).await
    }

    async fn get_existing_jobs_by_ids(&self, ids: &[JobId]) -> Result<Vec<Job>, JobRepoError> {
        self.inner.get_existing_jobs_by_ids(ids).await
    }

    async fn get_job_set_job_ids(
        &self,
        queue: &str,
        job_set_id: &str,
        filter: Option<&JobSetFilter>,
    ) -> Result<Vec<JobId>, JobRepoError> {
        self.inner.get_job_set_job_ids(queue, job_set_id, filter).await
    }

    async fn get_active_job_ids(
        &self,
        queue: &str,
        job_set_id: &str,
    ) -> Result<Vec<JobId>, JobRepoError> {
        self.inner.get_active_job_ids(queue, job_set_id).await
    }

    async fn get_queue_active_job_sets(&self, queue: &str) -> Result<Vec<String>, JobRepoError> {
        self.inner.get_queue_active_job_sets(queue).await
    }

    async fn get_queue_sizes(&self, queues: &[String]) -> Result<Vec<i64>, JobRepoError> {
        self.inner.get_queue_sizes(queues).await
    }

    async fn update_jobs(
        &self,
        ids: &[JobId],
        mutator: &JobMutator,
    ) -> Result<Vec<UpdateJobResult>, JobRepoError> {
        let mut results = self.inner.update_jobs(ids, mutator).await?;
        let update_errors = self.update_errors.lock().unwrap();
        for result in &mut results {
            if let Some(error) = update_errors.get(&result.job_id) {
                result.error = Some(error.clone());
            }
        }
        Ok(results)
    }
}

/// Event store that can be switched to fail every append.
#[derive(Clone)]
pub struct FailingEventStore {
    pub inner: MemEventStore,
    fail: Arc<AtomicBool>,
}

impl FailingEventStore {
    pub fn new(inner: MemEventStore) -> Self {
        Self {
            inner,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn report(&self, events: Vec<EventMessage>) -> Result<(), EventError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EventError::Unavailable(
                "injected event store failure".to_string(),
            ));
        }
        self.inner.report(events).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct TestHarness {
    pub base_url: String,
    pub client: reqwest::Client,
    pub queue_repo: Arc<MemQueueRepository>,
    pub job_repo: Arc<MemJobRepository>,
    pub events: MemEventStore,
}

impl TestHarness {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn seed_queue(&self, queue: Queue) {
        self.queue_repo.create(queue).await.unwrap();
    }

    pub async fn seed_jobs(&self, jobs: &[Job]) {
        self.job_repo.add_jobs(jobs).await.unwrap();
    }
}

pub struct HarnessBuilder {
    submission: SubmissionConfig,
    scheduling: SchedulingConfig,
    clusters: Vec<ClusterSchedulingInfo>,
    job_repo: Arc<MemJobRepository>,
    queue_repo: Arc<MemQueueRepository>,
    events: MemEventStore,
    job_repo_override: Option<Arc<dyn JobRepository>>,
    event_store_override: Option<Arc<dyn EventStore>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            submission: SubmissionConfig::default(),
            scheduling: SchedulingConfig::default(),
            clusters: vec![big_cluster()],
            job_repo: Arc::new(MemJobRepository::new()),
            queue_repo: Arc::new(MemQueueRepository::new()),
            events: MemEventStore::new(),
            job_repo_override: None,
            event_store_override: None,
        }
    }

    pub fn submission(mut self, submission: SubmissionConfig) -> Self {
        self.submission = submission;
        self
    }

    pub fn scheduling(mut self, scheduling: SchedulingConfig) -> Self {
        self.scheduling = scheduling;
        self
    }

    pub fn clusters(mut self, clusters: Vec<ClusterSchedulingInfo>) -> Self {
        self.clusters = clusters;
        self
    }

    pub fn job_repository(mut self, repo: Arc<dyn JobRepository>) -> Self {
        self.job_repo_override = Some(repo);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store_override = Some(store);
        self
    }

    /// The mem job repository that backs the harness, for direct seeding even
    /// when a decorator overrides the wired repository.
    pub fn mem_job_repo(&self) -> Arc<MemJobRepository> {
        self.job_repo.clone()
    }

    pub async fn spawn(self) -> TestHarness {
        // admins administer queues and watch; power-users hold the *-any-jobs
        // permissions. Everything else comes from per-queue grants.
        let mut table: BTreeMap<Permission, Vec<String>> = BTreeMap::new();
        table.insert(Permission::CreateQueue, vec!["admins".to_string()]);
        table.insert(Permission::DeleteQueue, vec!["admins".to_string()]);
        table.insert(Permission::WatchAllEvents, vec!["admins".to_string()]);
        table.insert(Permission::SubmitAnyJobs, vec!["power-users".to_string()]);
        table.insert(Permission::CancelAnyJobs, vec!["power-users".to_string()]);
        table.insert(
            Permission::ReprioritizeAnyJobs,
            vec!["power-users".to_string()],
        );
        let authorizer: Arc<dyn ActionAuthorizer> = Arc::new(PrincipalAuthorizer::new(table));

        let job_repository: Arc<dyn JobRepository> = self
            .job_repo_override
            .unwrap_or_else(|| self.job_repo.clone());
        let event_store: Arc<dyn EventStore> = self
            .event_store_override
            .unwrap_or_else(|| Arc::new(self.events.clone()));

        let state = AppState::new(
            self.submission,
            self.scheduling,
            self.queue_repo.clone(),
            job_repository,
            event_store,
            Arc::new(FixedSchedulingInfoRepository::new(self.clusters)),
            authorizer,
        );

        let app = api::create_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestHarness {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            queue_repo: self.queue_repo,
            job_repo: self.job_repo,
            events: self.events,
        }
    }
}
