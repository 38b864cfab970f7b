//! Event envelope - the common wrapper for all lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobEvent;

/// The event envelope.
///
/// The event stream is sharded by `(queue, job_set_id)`; appends within one
/// shard are ordered. `principal` is the name of the actor that triggered the
/// transition and is empty for system-origin failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// The queue that owns the job.
    pub queue: String,

    /// The job set the event stream is sharded by.
    pub job_set_id: String,

    /// When the transition was observed.
    pub occurred_at: DateTime<Utc>,

    /// Name of the acting principal; empty for system-origin events.
    pub principal: String,

    /// The lifecycle transition.
    pub event: JobEvent,
}

impl EventMessage {
    /// Creates an envelope stamped with the current time.
    pub fn now(
        queue: impl Into<String>,
        job_set_id: impl Into<String>,
        principal: impl Into<String>,
        event: JobEvent,
    ) -> Self {
        Self {
            queue: queue.into(),
            job_set_id: job_set_id.into(),
            occurred_at: Utc::now(),
            principal: principal.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_id::JobId;

    #[test]
    fn test_envelope_construction() {
        let id = JobId::new();
        let msg = EventMessage::now("q1", "js1", "alice", JobEvent::Submitted { job_id: id });
        assert_eq!(msg.queue, "q1");
        assert_eq!(msg.job_set_id, "js1");
        assert_eq!(msg.principal, "alice");
        assert_eq!(msg.event.kind(), "job.submitted");
    }

    #[test]
    fn test_envelope_roundtrip() {
        let msg = EventMessage::now(
            "q1",
            "js1",
            "",
            JobEvent::Failed {
                job_id: JobId::new(),
                reason: "no capacity".to_string(),
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: EventMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
