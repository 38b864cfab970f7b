//! # convoy-events
//!
//! Event type definitions and serialization for the convoy orchestrator.
//!
//! ## Design Principles
//!
//! - Events are immutable records of job lifecycle transitions
//! - The event stream is append-only and sharded by job set
//! - Every event carries the acting principal (empty for system-origin failures)
//! - Events outlive the jobs they describe
//!
//! ## Event Envelope
//!
//! All events share a common envelope with:
//! - The owning queue and job set (the stream shard key)
//! - The time the transition was observed
//! - The acting principal
//!
//! ## Event Kinds
//!
//! Nine lifecycle kinds: `job.submitted`, `job.queued`, `job.failed`,
//! `job.duplicate_found`, `job.cancelling`, `job.cancelled`,
//! `job.reprioritizing`, `job.reprioritized`, and `job.updated`.

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
