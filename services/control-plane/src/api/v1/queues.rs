//! Queue administration endpoints.
//!
//! Create, read, update, delete, and enumerate queues. Batch variants apply
//! the single-queue operation per element and collect the failures; they never
//! abort mid-batch.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::auth::Permission;
use crate::model::{Queue, QueueGrant, QueueVerb};
use crate::repository::QueueRepoError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_queues).post(create_queue))
        .route("/batch", axum::routing::post(create_queues).put(update_queues))
        .route(
            "/{name}",
            get(get_queue).put(update_queue).delete(delete_queue),
        )
        .route("/{name}/info", get(get_queue_info))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct QueueList {
    #[serde(default)]
    pub queues: Vec<Queue>,
}

/// One failed element of a batch create or update.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueFailure {
    pub queue: Queue,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchQueueResponse {
    pub failed_queues: Vec<QueueFailure>,
}

/// A queue plus the job sets currently active on it.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    pub active_job_sets: Vec<String>,
}

/// One element of the queue catalog stream: a queue, or the end marker that
/// always terminates the stream.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStreamMessage {
    Queue(Queue),
    End {},
}

#[derive(Debug, Deserialize)]
pub struct GetQueuesQuery {
    /// Maximum queues to stream; absent or non-positive means unlimited.
    #[serde(default)]
    pub num: Option<i64>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn try_create_queue(
    state: &AppState,
    ctx: &RequestContext,
    mut queue: Queue,
) -> Result<(), ApiError> {
    let request_id = ctx.request_id.clone();

    state
        .authorizer()
        .authorize_action(&ctx.principal, Permission::CreateQueue)
        .await
        .map_err(|e| {
            ApiError::from_auth(e, &format!("error creating queue {}", queue.name))
                .with_request_id(request_id.clone())
        })?;

    // Callers that supply no grants own the queue themselves.
    if queue.permissions.is_empty() {
        queue
            .permissions
            .push(QueueGrant::from_owners(
                vec![ctx.principal.name.clone()],
                Vec::new(),
            ));
    }

    queue.validate().map_err(|e| {
        ApiError::invalid_argument(format!("error validating queue {}: {e}", queue.name))
            .with_request_id(request_id.clone())
    })?;

    match state.queue_repository().create(queue).await {
        Ok(()) => Ok(()),
        Err(QueueRepoError::AlreadyExists(name)) => Err(ApiError::already_exists(format!(
            "error creating queue: queue {name:?} already exists"
        ))
        .with_request_id(request_id)),
        Err(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Failed to create queue");
            Err(ApiError::unavailable(format!("error creating queue: {e}"))
                .with_request_id(request_id))
        }
    }
}

/// Create a new queue.
///
/// POST /v1/queues
pub(crate) async fn create_queue(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(queue): Json<Queue>,
) -> Result<Json<serde_json::Value>, ApiError> {
    try_create_queue(&state, &ctx, queue).await?;
    Ok(Json(serde_json::json!({})))
}

/// Create a queue for each element of the request body and return the
/// failures.
///
/// POST /v1/queues/batch
pub(crate) async fn create_queues(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<QueueList>,
) -> Result<Json<BatchQueueResponse>, ApiError> {
    let mut failed_queues = Vec::new();
    for queue in request.queues {
        if let Err(e) = try_create_queue(&state, &ctx, queue.clone()).await {
            failed_queues.push(QueueFailure {
                queue,
                error: e.to_string(),
            });
        }
    }
    Ok(Json(BatchQueueResponse { failed_queues }))
}

async fn try_update_queue(
    state: &AppState,
    ctx: &RequestContext,
    queue: Queue,
) -> Result<(), ApiError> {
    let request_id = ctx.request_id.clone();

    // Updating uses the same permission as creating.
    state
        .authorizer()
        .authorize_action(&ctx.principal, Permission::CreateQueue)
        .await
        .map_err(|e| {
            ApiError::from_auth(e, &format!("error updating queue {}", queue.name))
                .with_request_id(request_id.clone())
        })?;

    queue.validate().map_err(|e| {
        ApiError::invalid_argument(format!("error validating queue {}: {e}", queue.name))
            .with_request_id(request_id.clone())
    })?;

    match state.queue_repository().update(queue).await {
        Ok(()) => Ok(()),
        Err(QueueRepoError::NotFound(name)) => Err(ApiError::not_found(format!(
            "error updating queue: queue {name:?} does not exist"
        ))
        .with_request_id(request_id)),
        Err(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Failed to update queue");
            Err(ApiError::unavailable(format!("error updating queue: {e}"))
                .with_request_id(request_id))
        }
    }
}

/// Replace a queue record wholesale.
///
/// PUT /v1/queues/{name}
pub(crate) async fn update_queue(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
    Json(queue): Json<Queue>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if queue.name != name {
        return Err(ApiError::invalid_argument(format!(
            "queue name {:?} in body does not match {name:?} in path",
            queue.name
        ))
        .with_request_id(ctx.request_id.clone()));
    }
    try_update_queue(&state, &ctx, queue).await?;
    Ok(Json(serde_json::json!({})))
}

/// Update a queue for each element of the request body and return the
/// failures.
///
/// PUT /v1/queues/batch
pub(crate) async fn update_queues(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<QueueList>,
) -> Result<Json<BatchQueueResponse>, ApiError> {
    let mut failed_queues = Vec::new();
    for queue in request.queues {
        if let Err(e) = try_update_queue(&state, &ctx, queue.clone()).await {
            failed_queues.push(QueueFailure {
                queue,
                error: e.to_string(),
            });
        }
    }
    Ok(Json(BatchQueueResponse { failed_queues }))
}

/// Delete a queue. Refused while any job set is active on it.
///
/// DELETE /v1/queues/{name}
pub(crate) async fn delete_queue(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request_id = ctx.request_id.clone();

    state
        .authorizer()
        .authorize_action(&ctx.principal, Permission::DeleteQueue)
        .await
        .map_err(|e| {
            ApiError::from_auth(e, &format!("error deleting queue {name}"))
                .with_request_id(request_id.clone())
        })?;

    let active = state
        .job_repository()
        .get_queue_active_job_sets(&name)
        .await
        .map_err(|e| {
            ApiError::unavailable(format!(
                "error getting active job sets for queue {name}: {e}"
            ))
            .with_request_id(request_id.clone())
        })?;
    if !active.is_empty() {
        return Err(ApiError::failed_precondition(format!(
            "error deleting queue {name}: queue is not empty"
        ))
        .with_request_id(request_id));
    }

    match state.queue_repository().delete(&name).await {
        Ok(()) => Ok(Json(serde_json::json!({}))),
        Err(QueueRepoError::NotFound(_)) => Err(ApiError::not_found(format!(
            "error deleting queue: queue {name:?} does not exist"
        ))
        .with_request_id(request_id)),
        Err(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Failed to delete queue");
            Err(
                ApiError::unavailable(format!("error deleting queue {name}: {e}"))
                    .with_request_id(request_id),
            )
        }
    }
}

/// Get a single queue record.
///
/// GET /v1/queues/{name}
pub(crate) async fn get_queue(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
) -> Result<Json<Queue>, ApiError> {
    match state.queue_repository().get(&name).await {
        Ok(queue) => Ok(Json(queue)),
        Err(QueueRepoError::NotFound(_)) => Err(ApiError::not_found(format!(
            "queue {name:?} does not exist"
        ))
        .with_request_id(ctx.request_id.clone())),
        Err(e) => Err(
            ApiError::unavailable(format!("error getting queue {name:?}: {e}"))
                .with_request_id(ctx.request_id.clone()),
        ),
    }
}

/// Stream the queue catalog as NDJSON: at most `num` queue messages (when
/// `num` is positive) followed by exactly one end marker. The end marker is
/// sent even for an empty catalog.
///
/// GET /v1/queues?num=N
pub(crate) async fn get_queues(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<GetQueuesQuery>,
) -> Result<Response, ApiError> {
    let request_id = ctx.request_id.clone();

    let queues = state.queue_repository().get_all().await.map_err(|e| {
        ApiError::unavailable(format!("error listing queues: {e}"))
            .with_request_id(request_id.clone())
    })?;

    let limit = match query.num {
        Some(num) if num > 0 => num as usize,
        _ => usize::MAX,
    };

    let mut body = String::new();
    for queue in queues.into_iter().take(limit) {
        let line = serde_json::to_string(&QueueStreamMessage::Queue(queue)).map_err(|e| {
            ApiError::internal(format!("error encoding queue message: {e}"))
                .with_request_id(request_id.clone())
        })?;
        body.push_str(&line);
        body.push('\n');
    }
    let end = serde_json::to_string(&QueueStreamMessage::End {}).map_err(|e| {
        ApiError::internal(format!("error encoding end marker: {e}"))
            .with_request_id(request_id.clone())
    })?;
    body.push_str(&end);
    body.push('\n');

    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}

/// Get a queue together with its active job sets.
///
/// GET /v1/queues/{name}/info
pub(crate) async fn get_queue_info(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(name): Path<String>,
) -> Result<Json<QueueInfo>, ApiError> {
    let request_id = ctx.request_id.clone();

    let queue = match state.queue_repository().get(&name).await {
        Ok(queue) => queue,
        Err(QueueRepoError::NotFound(_)) => {
            return Err(
                ApiError::not_found(format!("queue {name:?} does not exist"))
                    .with_request_id(request_id),
            )
        }
        Err(e) => {
            return Err(
                ApiError::unavailable(format!("error getting queue {name:?}: {e}"))
                    .with_request_id(request_id),
            )
        }
    };

    state
        .authorizer()
        .authorize_queue_action(
            &ctx.principal,
            &queue,
            Permission::WatchAllEvents,
            QueueVerb::Watch,
        )
        .await
        .map_err(|e| {
            ApiError::from_auth(e, &format!("error getting info for queue {name}"))
                .with_request_id(request_id.clone())
        })?;

    let active_job_sets = state
        .job_repository()
        .get_queue_active_job_sets(&name)
        .await
        .map_err(|e| {
            ApiError::unavailable(format!(
                "error getting job sets for queue {name}: {e}"
            ))
            .with_request_id(request_id.clone())
        })?;

    Ok(Json(QueueInfo {
        name,
        active_job_sets,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_message_encoding() {
        let queue = Queue {
            name: "q1".to_string(),
            priority_factor: 1.0,
            permissions: Vec::new(),
            resource_limits: None,
        };
        let line = serde_json::to_string(&QueueStreamMessage::Queue(queue)).unwrap();
        assert!(line.starts_with("{\"queue\":"));

        let end = serde_json::to_string(&QueueStreamMessage::End {}).unwrap();
        assert_eq!(end, "{\"end\":{}}");
    }
}
