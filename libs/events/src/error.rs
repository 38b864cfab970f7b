//! Error types for event emission.

use thiserror::Error;

/// Errors surfaced by an event log implementation.
///
/// Emission failures never roll back the state mutation they follow; callers
/// decide whether the failure is fatal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The event log rejected or failed the append.
    #[error("failed to append events: {0}")]
    Append(String),

    /// The event log is unreachable.
    #[error("event log unavailable: {0}")]
    Unavailable(String),
}
