//! Job start and polling.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use lapcmp_models::{AnalysisRequest, JobId, JobStatusView};
use lapcmp_queue::{AnalysisJob, RunHandle};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub job_id: String,
    pub call_id: String,
    pub results_prefix: String,
}

/// `POST /start-job`
///
/// The payload is validated before anything is submitted, so a bad mode
/// never reaches the runner.
pub async fn start_job(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<Json<StartJobResponse>> {
    let request = AnalysisRequest::from_value(payload)?;

    let job_id = JobId::new();
    let outputs = state.storage.results_target(&job_id);
    let results_prefix = outputs.prefix.clone();
    let mode = request.mode();

    let handle = state
        .runner
        .submit(AnalysisJob::new(job_id.clone(), request, outputs))
        .await?;

    info!(job_id = %job_id, call_id = %handle.call_id, %mode, "Job submitted");
    Ok(Json(StartJobResponse {
        job_id: job_id.to_string(),
        call_id: handle.call_id,
        results_prefix,
    }))
}

/// `GET /jobs/:call_id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let run_state = state.runner.poll(&RunHandle::new(call_id)).await?;
    Ok(Json(JobStatusView::from(run_state)))
}
