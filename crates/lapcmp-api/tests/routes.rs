//! Router tests against an in-process runner and a fake upload signer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use lapcmp_api::{create_router, ApiConfig, AppState};
use lapcmp_models::{Manifest, RunState, SignedUpload};
use lapcmp_queue::{AnalysisJob, JobHandler, JobRunner, LocalJobRunner, QueueResult, RunHandle};
use lapcmp_storage::{StorageConfig, StorageResult, UploadSigner};

struct FakeSigner;

#[async_trait]
impl UploadSigner for FakeSigner {
    async fn sign_upload(&self, filename: &str, _content_type: &str) -> StorageResult<SignedUpload> {
        let key = format!("lapcompare/uploads/fixed_{}", filename);
        Ok(SignedUpload {
            bucket: "laps".into(),
            put_url: format!("https://store.invalid/{}?put", key),
            get_url: format!("https://store.invalid/{}?get", key),
            key,
        })
    }
}

/// Finishes immediately, or fails for job payloads on a bucket named "bad".
struct InstantHandler;

#[async_trait]
impl JobHandler for InstantHandler {
    type Error = String;

    async fn handle(&self, job: &AnalysisJob) -> Result<Manifest, String> {
        if job.outputs.bucket == "bad" {
            return Err("insufficient motion data".into());
        }
        Ok(Manifest::new(job.job_id.as_str(), "Analysis complete"))
    }
}

struct CountingRunner {
    inner: LocalJobRunner<InstantHandler>,
    submitted: AtomicUsize,
}

#[async_trait]
impl JobRunner for CountingRunner {
    async fn submit(&self, job: AnalysisJob) -> QueueResult<RunHandle> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(job).await
    }

    async fn poll(&self, handle: &RunHandle) -> QueueResult<RunState> {
        self.inner.poll(handle).await
    }

    async fn cancel(&self, handle: &RunHandle) -> QueueResult<()> {
        self.inner.cancel(handle).await
    }
}

fn app_with_bucket(bucket: &str) -> (Router, Arc<CountingRunner>) {
    let runner = Arc::new(CountingRunner {
        inner: LocalJobRunner::new(InstantHandler),
        submitted: AtomicUsize::new(0),
    });
    let storage = StorageConfig {
        bucket: bucket.into(),
        ..Default::default()
    };
    let state = AppState::new(
        ApiConfig::default(),
        storage,
        Arc::new(FakeSigner),
        Arc::clone(&runner) as Arc<dyn JobRunner>,
    );
    (create_router(state), runner)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn pair_payload() -> Value {
    json!({
        "mode": "pair",
        "lapA": {"bucket": "laps", "key": "lapcompare/uploads/1_a.mp4"},
        "lapB": {"bucket": "laps", "key": "lapcompare/uploads/2_b.mp4"}
    })
}

async fn poll_until_terminal(app: &Router, call_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, "GET", &format!("/jobs/{}", call_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "running" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never left running", call_id);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app_with_bucket("laps");
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_sign_upload_defaults_content_type() {
    let (app, _) = app_with_bucket("laps");
    let (status, body) = send(&app, "POST", "/sign-upload", Some(json!({"filename": "lap.mp4"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bucket"], "laps");
    assert_eq!(body["key"], "lapcompare/uploads/fixed_lap.mp4");
    assert!(body["put_url"].as_str().unwrap().ends_with("?put"));
    assert!(body["get_url"].as_str().unwrap().ends_with("?get"));
}

#[tokio::test]
async fn test_sign_upload_rejects_empty_filename() {
    let (app, _) = app_with_bucket("laps");
    let (status, body) = send(&app, "POST", "/sign-upload", Some(json!({"filename": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_invalid_mode_never_reaches_runner() {
    let (app, runner) = app_with_bucket("laps");
    let (status, body) = send(
        &app,
        "POST",
        "/start-job",
        Some(json!({"mode": "triple", "video": {"bucket": "laps", "key": "v.mp4"}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "mode must be 'pair' or 'segments'");
    assert_eq!(runner.submitted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_incomplete_payload_is_bad_request() {
    let (app, runner) = app_with_bucket("laps");
    let (status, _) = send(&app, "POST", "/start-job", Some(json!({"mode": "pair"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(runner.submitted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_and_poll_to_finished() {
    let (app, runner) = app_with_bucket("laps");
    let (status, started) = send(&app, "POST", "/start-job", Some(pair_payload())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(runner.submitted.load(Ordering::SeqCst), 1);
    let job_id = started["job_id"].as_str().unwrap();
    assert_eq!(
        started["results_prefix"],
        format!("lapcompare/results/{}/", job_id)
    );

    let call_id = started["call_id"].as_str().unwrap();
    let body = poll_until_terminal(&app, call_id).await;
    assert_eq!(body["status"], "finished");
    assert_eq!(body["result"]["job_id"], job_id);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_failed_job_reports_error() {
    let (app, _) = app_with_bucket("bad");
    let (_, started) = send(&app, "POST", "/start-job", Some(pair_payload())).await;

    let body = poll_until_terminal(&app, started["call_id"].as_str().unwrap()).await;
    assert_eq!(body, json!({"status": "failed", "error": "insufficient motion data"}));
}

#[tokio::test]
async fn test_unknown_call_id_is_not_found() {
    let (app, _) = app_with_bucket("laps");
    let (status, body) = send(&app, "GET", "/jobs/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("does-not-exist"));
}
