//! Application state shared across request handlers.

use std::sync::Arc;

use crate::auth::ActionAuthorizer;
use crate::compress::CompressorPool;
use crate::config::{SchedulingConfig, SubmissionConfig};
use crate::repository::{EventStore, JobRepository, QueueRepository, SchedulingInfoRepository};

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor. The
/// compressor pool is the only intra-process shared mutable resource; the
/// collaborators behind the trait objects are external systems.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    submission: SubmissionConfig,
    scheduling: SchedulingConfig,
    queue_repository: Arc<dyn QueueRepository>,
    job_repository: Arc<dyn JobRepository>,
    event_store: Arc<dyn EventStore>,
    scheduling_info: Arc<dyn SchedulingInfoRepository>,
    authorizer: Arc<dyn ActionAuthorizer>,
    compressor_pool: CompressorPool,
}

impl AppState {
    pub fn new(
        submission: SubmissionConfig,
        scheduling: SchedulingConfig,
        queue_repository: Arc<dyn QueueRepository>,
        job_repository: Arc<dyn JobRepository>,
        event_store: Arc<dyn EventStore>,
        scheduling_info: Arc<dyn SchedulingInfoRepository>,
        authorizer: Arc<dyn ActionAuthorizer>,
    ) -> Self {
        let compressor_pool = CompressorPool::new(&submission.compressor_pool);
        Self {
            inner: Arc::new(AppStateInner {
                submission,
                scheduling,
                queue_repository,
                job_repository,
                event_store,
                scheduling_info,
                authorizer,
                compressor_pool,
            }),
        }
    }

    pub fn submission_config(&self) -> &SubmissionConfig {
        &self.inner.submission
    }

    pub fn scheduling_config(&self) -> &SchedulingConfig {
        &self.inner.scheduling
    }

    pub fn queue_repository(&self) -> &dyn QueueRepository {
        self.inner.queue_repository.as_ref()
    }

    pub fn job_repository(&self) -> &dyn JobRepository {
        self.inner.job_repository.as_ref()
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.inner.event_store
    }

    pub fn scheduling_info(&self) -> &dyn SchedulingInfoRepository {
        self.inner.scheduling_info.as_ref()
    }

    pub fn authorizer(&self) -> &dyn ActionAuthorizer {
        self.inner.authorizer.as_ref()
    }

    pub fn compressor_pool(&self) -> &CompressorPool {
        &self.inner.compressor_pool
    }
}
