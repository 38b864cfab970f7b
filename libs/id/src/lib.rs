//! # convoy-id
//!
//! Stable ID types, parsing, and validation for the convoy orchestrator.
//!
//! ## Design Principles
//!
//! - IDs are system-generated; names (queues, job sets) are user-controlled labels
//! - All IDs have a canonical string representation with strict parsing
//! - IDs support roundtrip serialization (parse → format → parse)
//!
//! ## ID Formats
//!
//! Job IDs are bare ULIDs because they cross the wire as plain 26-character
//! Crockford base32 strings and must sort by mint time:
//!
//! - `01HV4Z2WQXKJNM8GPQY6VBKC3D`
//!
//! Internal correlation IDs use a prefixed format, `{prefix}_{ulid}`:
//!
//! - `req_01HV4Z3MXNKPQR9HSTZ7WCLD4E`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
