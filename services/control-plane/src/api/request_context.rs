//! Request-scoped context extracted from HTTP requests.

use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use convoy_id::RequestId;
use sha2::{Digest, Sha256};

use crate::api::error::ApiError;
use crate::auth::Principal;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub principal: Principal,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Whether less than `leeway` remains before the request deadline.
    ///
    /// Requests without a deadline are never close to it.
    pub fn close_to_deadline(&self, leeway: Duration) -> bool {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()) < leeway,
            None => false,
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn principal_from_authorization_header(
    headers: &HeaderMap,
    request_id: &str,
) -> Result<Option<Principal>, ApiError> {
    let Some(auth_value) = header_string(headers, AUTHORIZATION_HEADER) else {
        return Ok(None);
    };

    let auth_value = auth_value.trim();
    let Some(token) = auth_value.strip_prefix("Bearer ") else {
        return Err(
            ApiError::permission_denied("Authorization must be a Bearer token")
                .with_request_id(request_id.to_string()),
        );
    };

    let token = token.trim();
    if token.is_empty() {
        return Err(
            ApiError::permission_denied("Authorization Bearer token cannot be empty")
                .with_request_id(request_id.to_string()),
        );
    }

    // Dev stub:
    // - `user:<name>` or `user:<name>:<g1,g2>` tokens carry a named identity
    //   with optional groups.
    // - other tokens are treated as opaque and mapped to a stable hashed
    //   identity.
    if let Some(rest) = token.strip_prefix("user:") {
        let mut parts = rest.splitn(2, ':');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(ApiError::permission_denied(
                "user token must be in the form 'user:<name>' or 'user:<name>:<groups>'",
            )
            .with_request_id(request_id.to_string()));
        }

        let groups = parts
            .next()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        return Ok(Some(Principal::new(name, groups)));
    }

    // Never persist or log bearer tokens. Derive a stable, non-secret identity.
    let digest = Sha256::digest(token.as_bytes());
    let hex = format!("{:x}", digest);
    let short = hex.get(..32).unwrap_or(&hex);

    Ok(Some(Principal::new(format!("usr_{short}"), Vec::new())))
}

fn deadline_from_headers(
    headers: &HeaderMap,
    request_id: &str,
) -> Result<Option<Instant>, ApiError> {
    let Some(raw) = header_string(headers, REQUEST_TIMEOUT_HEADER) else {
        return Ok(None);
    };

    let millis: u64 = raw.trim().parse().map_err(|_| {
        ApiError::invalid_argument(format!(
            "{REQUEST_TIMEOUT_HEADER} must be a duration in milliseconds"
        ))
        .with_request_id(request_id.to_string())
    })?;

    Ok(Some(Instant::now() + Duration::from_millis(millis)))
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = header_string(&parts.headers, "x-request-id")
            .unwrap_or_else(|| RequestId::new().to_string());

        let principal = principal_from_authorization_header(&parts.headers, &request_id)?
            .unwrap_or_else(Principal::anonymous);

        let deadline = deadline_from_headers(&parts.headers, &request_id)?;

        Ok(Self {
            request_id,
            principal,
            deadline,
        })
    }
}
