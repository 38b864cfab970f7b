//! Job cancellation API tests.

mod common;

use std::time::Duration;

use common::{mk_job, queue_owned_by, HarnessBuilder};
use convoy_control_plane::config::SubmissionConfig;

const ALICE: &str = "Bearer user:alice";

#[tokio::test]
async fn cancel_by_id_deletes_job_and_emits_event_pair() {
    let harness = HarnessBuilder::new().spawn().await;
    harness.seed_queue(queue_owned_by("q1", "alice")).await;
    let job = mk_job("q1", "js1");
    harness.seed_jobs(&[job.clone()]).await;

    let resp = harness
        .client
        .post(harness.url("/v1/jobs/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({"job_id": job.id.to_string(), "reason": "user requested"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["cancelled_ids"],
        serde_json::json!([job.id.to_string()])
    );

    assert!(harness.job_repo.job(job.id).is_none());
    assert_eq!(
        harness.events.kinds(),
        vec!["job.cancelling", "job.cancelled"]
    );
    let cancelled = harness.events.events().pop().unwrap();
    assert_eq!(cancelled.principal, "alice");
}

#[tokio::test]
async fn cancel_missing_job_is_internal_error() {
    let harness = HarnessBuilder::new().spawn().await;

    let resp = harness
        .client
        .post(harness.url("/v1/jobs/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({"job_id": "01HV4Z2WQXKJNM8GPQY6VBKC3D"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("expected exactly one result"));
}

#[tokio::test]
async fn cancel_requires_addressing_mode() {
    let harness = HarnessBuilder::new().spawn().await;

    let resp = harness
        .client
        .post(harness.url("/v1/jobs/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({"reason": "nothing addressed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn cancel_by_queue_and_set_cancels_all_matching_jobs() {
    let harness = HarnessBuilder::new().spawn().await;
    harness.seed_queue(queue_owned_by("q1", "alice")).await;
    let jobs: Vec<_> = (0..5).map(|_| mk_job("q1", "js1")).collect();
    harness.seed_jobs(&jobs).await;
    // A job in another set stays untouched.
    let other = mk_job("q1", "other-set");
    harness.seed_jobs(&[other.clone()]).await;

    let resp = harness
        .client
        .post(harness.url("/v1/jobs/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({"queue": "q1", "job_set_id": "js1", "reason": "done"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let cancelled = body["cancelled_ids"].as_array().unwrap();
    assert_eq!(cancelled.len(), 5);

    assert_eq!(harness.job_repo.len(), 1);
    assert!(harness.job_repo.job(other.id).is_some());
}

#[tokio::test]
async fn cancel_unauthorized_queue_aborts_whole_operation() {
    let harness = HarnessBuilder::new().spawn().await;
    harness.seed_queue(queue_owned_by("q1", "somebody-else")).await;
    let jobs: Vec<_> = (0..3).map(|_| mk_job("q1", "js1")).collect();
    harness.seed_jobs(&jobs).await;

    let resp = harness
        .client
        .post(harness.url("/v1/jobs/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({"queue": "q1", "job_set_id": "js1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    // Nothing was deleted.
    assert_eq!(harness.job_repo.len(), 3);
}

#[tokio::test]
async fn cancel_job_set_validates_filter_states() {
    let harness = HarnessBuilder::new().spawn().await;
    harness.seed_queue(queue_owned_by("q1", "alice")).await;

    let resp = harness
        .client
        .post(harness.url("/v1/job-sets/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({
            "queue": "q1",
            "job_set_id": "js1",
            "filter": {"states": ["succeeded"]},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("unsupported state"));
}

#[tokio::test]
async fn cancel_job_set_honors_state_filter() {
    let harness = HarnessBuilder::new().spawn().await;
    harness.seed_queue(queue_owned_by("q1", "alice")).await;
    let queued = mk_job("q1", "js1");
    let leased = mk_job("q1", "js1");
    harness.seed_jobs(&[queued.clone(), leased.clone()]).await;
    harness.job_repo.mark_leased(leased.id);

    // Cancel only queued jobs.
    let resp = harness
        .client
        .post(harness.url("/v1/job-sets/cancel"))
        .header("Authorization", ALICE)
        .json(&serde_json::json!({
            "queue": "q1",
            "job_set_id": "js1",
            "filter": {"states": ["queued"]},
            "reason": "queued only",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert!(harness.job_repo.job(queued.id).is_none());
    assert!(harness.job_repo.job(leased.id).is_some());
}

#[tokio::test]
async fn cancel_by_set_returns_partial_result_on_deadline() {
    let submission = SubmissionConfig {
        cancel_jobs_batch_size: 100,
        cancel_deadline_leeway: Duration::from_secs(1),
        ..Default::default()
    };
    let harness = HarnessBuilder::new().submission(submission).spawn().await;
    harness.seed_queue(queue_owned_by("q1", "alice")).await;
    let jobs: Vec<_> = (0..250).map(|_| mk_job("q1", "js1")).collect();
    harness.seed_jobs(&jobs).await;

    // The deadline is already within the leeway when the first batch
    // finishes, so exactly one batch is processed.
    let resp = harness
        .client
        .post(harness.url("/v1/jobs/cancel"))
        .header("Authorization", ALICE)
        .header("x-request-timeout-ms", "500")
        .json(&serde_json::json!({"queue": "q1", "job_set_id": "js1", "reason": "shutdown"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 504);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "deadline-exceeded");

    let cancelled = body["details"]["cancelled_ids"].as_array().unwrap();
    assert_eq!(cancelled.len(), 100);
    // Every reported id was actually deleted.
    for id in cancelled {
        let id = convoy_id::JobId::parse(id.as_str().unwrap()).unwrap();
        assert!(harness.job_repo.job(id).is_none());
    }
    assert_eq!(harness.job_repo.len(), 150);
}
