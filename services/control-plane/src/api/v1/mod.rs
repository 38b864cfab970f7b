//! API v1 routes.

mod cancel;
mod queues;
mod reprioritize;
mod submit;

use axum::{routing::post, Router};

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/queues", queues::routes())
        .route("/jobs", post(submit::submit_jobs))
        .route("/jobs/cancel", post(cancel::cancel_jobs))
        .route("/jobs/reprioritize", post(reprioritize::reprioritize_jobs))
        .route("/job-sets/cancel", post(cancel::cancel_job_set))
}
