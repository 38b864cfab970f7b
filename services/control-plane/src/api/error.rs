//! Canonical error codes and the problem-details error type for the façade.
//!
//! Every failure carries one of the canonical codes below; the HTTP status is
//! derived from the code so the transport mapping stays lossless. Batched
//! operations attach structured per-item payloads in `details`.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Per-item error detail payloads are truncated to this many entries.
pub const MAX_RESPONSE_ITEMS: usize = 5;

/// Canonical error codes for the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    PermissionDenied,
    Unavailable,
    Aborted,
    DeadlineExceeded,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Aborted => "aborted",
            ErrorCode::DeadlineExceeded => "deadline-exceeded",
            ErrorCode::Internal => "internal",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Aborted => StatusCode::CONFLICT,
            ErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RFC-7807-style error body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    /// Canonical error code string.
    pub code: String,

    pub title: String,

    pub status: u16,

    pub detail: String,

    pub request_id: String,

    /// Structured per-item payload (submit failures, partial cancellations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    problem: Box<ProblemDetails>,
}

impl ApiError {
    fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        let status = code.http_status();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            code,
            problem: Box::new(ProblemDetails {
                code: code.as_str().to_string(),
                title,
                status: status.as_u16(),
                detail: detail.into(),
                request_id: "unknown".to_string(),
                details: None,
            }),
        }
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, detail)
    }

    pub fn already_exists(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, detail)
    }

    pub fn failed_precondition(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, detail)
    }

    pub fn permission_denied(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, detail)
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, detail)
    }

    pub fn aborted(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Aborted, detail)
    }

    pub fn deadline_exceeded(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeadlineExceeded, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, detail)
    }

    /// Maps an authorization failure: unauthorized becomes permission-denied,
    /// lookup failure becomes unavailable.
    pub fn from_auth(err: crate::auth::AuthError, context: &str) -> Self {
        if err.is_unauthorized() {
            Self::permission_denied(format!("{context}: {err}"))
        } else {
            Self::unavailable(format!("{context}: {err}"))
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.request_id = request_id.into();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.problem.details = Some(details);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn detail(&self) -> &str {
        &self.problem.detail
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.problem.detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        let mut response = (status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
