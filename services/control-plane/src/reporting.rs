//! Event emitter: formats lifecycle events and appends them to the event log.
//!
//! Emission is best-effort after the fact. Failures are surfaced to the
//! caller, which decides whether they are fatal for the request; the state
//! mutation they follow is never rolled back.

use convoy_events::{EventError, EventMessage, JobEvent};
use convoy_id::JobId;

use crate::model::Job;
use crate::repository::EventStore;

/// A job together with the reason it failed to persist.
pub struct JobFailure<'a> {
    pub job: &'a Job,
    pub reason: String,
}

/// A submitted job that collided with an earlier `(queue, client_id)`.
pub struct DuplicateSubmission<'a> {
    pub job: &'a Job,
    pub original_job_id: JobId,
}

async fn report(store: &dyn EventStore, events: Vec<EventMessage>) -> Result<(), EventError> {
    if events.is_empty() {
        return Ok(());
    }
    store.report(events).await
}

pub async fn report_submitted(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Submitted { job_id: job.id },
            )
        })
        .collect();
    report(store, events).await
}

pub async fn report_queued(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Queued { job_id: job.id },
            )
        })
        .collect();
    report(store, events).await
}

/// `principal` is empty for system-origin failures.
pub async fn report_failed(
    store: &dyn EventStore,
    principal: &str,
    failures: &[JobFailure<'_>],
) -> Result<(), EventError> {
    let events = failures
        .iter()
        .map(|failure| {
            EventMessage::now(
                &failure.job.queue,
                &failure.job.job_set_id,
                principal,
                JobEvent::Failed {
                    job_id: failure.job.id,
                    reason: failure.reason.clone(),
                },
            )
        })
        .collect();
    report(store, events).await
}

pub async fn report_duplicates(
    store: &dyn EventStore,
    principal: &str,
    duplicates: &[DuplicateSubmission<'_>],
) -> Result<(), EventError> {
    let events = duplicates
        .iter()
        .map(|dup| {
            EventMessage::now(
                &dup.job.queue,
                &dup.job.job_set_id,
                principal,
                JobEvent::DuplicateFound {
                    job_id: dup.job.id,
                    original_job_id: dup.original_job_id,
                },
            )
        })
        .collect();
    report(store, events).await
}

pub async fn report_cancelling(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
    reason: &str,
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Cancelling {
                    job_id: job.id,
                    reason: reason.to_string(),
                },
            )
        })
        .collect();
    report(store, events).await
}

pub async fn report_cancelled(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
    reason: &str,
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Cancelled {
                    job_id: job.id,
                    reason: reason.to_string(),
                },
            )
        })
        .collect();
    report(store, events).await
}

pub async fn report_reprioritizing(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
    new_priority: f64,
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Reprioritizing {
                    job_id: job.id,
                    new_priority,
                },
            )
        })
        .collect();
    report(store, events).await
}

pub async fn report_reprioritized(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
    new_priority: f64,
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Reprioritized {
                    job_id: job.id,
                    new_priority,
                },
            )
        })
        .collect();
    report(store, events).await
}

/// Emitted alongside `Reprioritized` once the new priority is written; the
/// payload carries the job's post-update priority.
pub async fn report_updated(
    store: &dyn EventStore,
    principal: &str,
    jobs: &[Job],
) -> Result<(), EventError> {
    let events = jobs
        .iter()
        .map(|job| {
            EventMessage::now(
                &job.queue,
                &job.job_set_id,
                principal,
                JobEvent::Updated {
                    job_id: job.id,
                    priority: job.priority,
                },
            )
        })
        .collect();
    report(store, events).await
}
