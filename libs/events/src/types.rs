//! Event kind definitions for the job lifecycle.

use convoy_id::JobId;
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event type names as constants.
pub mod event_types {
    pub const JOB_SUBMITTED: &str = "job.submitted";
    pub const JOB_QUEUED: &str = "job.queued";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_DUPLICATE_FOUND: &str = "job.duplicate_found";
    pub const JOB_CANCELLING: &str = "job.cancelling";
    pub const JOB_CANCELLED: &str = "job.cancelled";
    pub const JOB_REPRIORITIZING: &str = "job.reprioritizing";
    pub const JOB_REPRIORITIZED: &str = "job.reprioritized";
    pub const JOB_UPDATED: &str = "job.updated";
}

// =============================================================================
// Event Payloads
// =============================================================================

/// A job lifecycle transition.
///
/// Submission emits `Submitted` before persistence and then exactly one of
/// `Queued`, `DuplicateFound`, or `Failed` per job. Cancellation emits
/// `Cancelling` before the delete and `Cancelled` for the jobs that were
/// actually removed. Reprioritization emits `Reprioritizing` up front, then
/// `Updated` and `Reprioritized` once the new priority is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    Submitted {
        job_id: JobId,
    },
    Queued {
        job_id: JobId,
    },
    Failed {
        job_id: JobId,
        reason: String,
    },
    DuplicateFound {
        job_id: JobId,
        /// The job already registered under the same `(queue, client_id)`.
        original_job_id: JobId,
    },
    Cancelling {
        job_id: JobId,
        reason: String,
    },
    Cancelled {
        job_id: JobId,
        reason: String,
    },
    Reprioritizing {
        job_id: JobId,
        new_priority: f64,
    },
    Reprioritized {
        job_id: JobId,
        new_priority: f64,
    },
    Updated {
        job_id: JobId,
        priority: f64,
    },
}

impl JobEvent {
    /// The canonical event type name for this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Submitted { .. } => event_types::JOB_SUBMITTED,
            JobEvent::Queued { .. } => event_types::JOB_QUEUED,
            JobEvent::Failed { .. } => event_types::JOB_FAILED,
            JobEvent::DuplicateFound { .. } => event_types::JOB_DUPLICATE_FOUND,
            JobEvent::Cancelling { .. } => event_types::JOB_CANCELLING,
            JobEvent::Cancelled { .. } => event_types::JOB_CANCELLED,
            JobEvent::Reprioritizing { .. } => event_types::JOB_REPRIORITIZING,
            JobEvent::Reprioritized { .. } => event_types::JOB_REPRIORITIZED,
            JobEvent::Updated { .. } => event_types::JOB_UPDATED,
        }
    }

    /// The job this event describes.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Submitted { job_id }
            | JobEvent::Queued { job_id }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::DuplicateFound { job_id, .. }
            | JobEvent::Cancelling { job_id, .. }
            | JobEvent::Cancelled { job_id, .. }
            | JobEvent::Reprioritizing { job_id, .. }
            | JobEvent::Reprioritized { job_id, .. }
            | JobEvent::Updated { job_id, .. } => *job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let id = JobId::new();
        assert_eq!(JobEvent::Submitted { job_id: id }.kind(), "job.submitted");
        assert_eq!(
            JobEvent::DuplicateFound {
                job_id: id,
                original_job_id: id
            }
            .kind(),
            "job.duplicate_found"
        );
        assert_eq!(
            JobEvent::Reprioritizing {
                job_id: id,
                new_priority: 1.0
            }
            .kind(),
            "job.reprioritizing"
        );
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let id = JobId::new();
        let json = serde_json::to_value(JobEvent::Queued { job_id: id }).unwrap();
        assert_eq!(json["kind"], "queued");
        assert_eq!(json["job_id"], id.to_string());
    }

    #[test]
    fn test_job_id_accessor() {
        let id = JobId::new();
        let event = JobEvent::Failed {
            job_id: id,
            reason: "boom".to_string(),
        };
        assert_eq!(event.job_id(), id);
    }
}
