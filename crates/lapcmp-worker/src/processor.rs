//! One analysis run: fetch inputs, run the engine, publish the bundle.

use std::path::Path;

use async_trait::async_trait;
use tracing::Instrument;

use lapcmp_media::{analyze_pair, analyze_segments, AnalysisOutcome, EngineConfig, MediaResult};
use lapcmp_models::{AnalysisRequest, Manifest, ObjectLocator};
use lapcmp_queue::{AnalysisJob, JobHandler};
use lapcmp_storage::ObjectStoreClient;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub const LAP_A_FILE: &str = "lapA.mp4";
pub const LAP_B_FILE: &str = "lapB.mp4";
pub const VIDEO_FILE: &str = "video.mp4";

/// Objects to fetch for `request` and the local names they land under.
pub fn input_plan(request: &AnalysisRequest) -> Vec<(&ObjectLocator, &'static str)> {
    match request {
        AnalysisRequest::Pair { lap_a, lap_b } => vec![(lap_a, LAP_A_FILE), (lap_b, LAP_B_FILE)],
        AnalysisRequest::Segments { video, .. } => vec![(video, VIDEO_FILE)],
    }
}

/// Run the engine on inputs already staged in `inputs_dir` by [`input_plan`].
pub async fn run_analysis(
    request: &AnalysisRequest,
    inputs_dir: &Path,
    out_dir: &Path,
    engine: &EngineConfig,
) -> MediaResult<AnalysisOutcome> {
    match request {
        AnalysisRequest::Pair { .. } => {
            analyze_pair(
                inputs_dir.join(LAP_A_FILE),
                inputs_dir.join(LAP_B_FILE),
                out_dir,
                engine,
            )
            .await
        }
        AnalysisRequest::Segments { seg_a, seg_b, .. } => {
            analyze_segments(inputs_dir.join(VIDEO_FILE), *seg_a, *seg_b, out_dir, engine).await
        }
    }
}

/// Executes analysis jobs against the object store.
pub struct AnalysisProcessor {
    storage: ObjectStoreClient,
    config: WorkerConfig,
}

impl AnalysisProcessor {
    pub fn new(storage: ObjectStoreClient, config: WorkerConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one job without the timeout. The scratch directory is removed on return.
    pub async fn process(&self, job: &AnalysisJob) -> WorkerResult<Manifest> {
        let logger = JobLogger::new(&job.job_id, job.mode().as_str());
        let span = logger.create_span();

        async {
            logger.log_start("staging inputs");

            tokio::fs::create_dir_all(&self.config.work_dir).await?;
            let scratch = tempfile::Builder::new()
                .prefix("job-")
                .tempdir_in(&self.config.work_dir)?;

            for (locator, name) in input_plan(&job.request) {
                self.storage
                    .download_to(locator, scratch.path().join(name))
                    .await?;
            }
            logger.log_progress("inputs downloaded");

            let out_dir = scratch.path().join("out");
            let outcome =
                match run_analysis(&job.request, scratch.path(), &out_dir, &self.config.engine)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        logger.log_error(&e.to_string());
                        return Err(WorkerError::from(e));
                    }
                };
            logger.log_progress(&format!("engine wrote {} artifacts", outcome.files.len()));

            let manifest = self
                .storage
                .publish_results(job.job_id.as_str(), &out_dir, &outcome.files, &job.outputs)
                .await?;

            logger.log_completion(&outcome.summary);
            Ok::<_, WorkerError>(manifest)
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl JobHandler for AnalysisProcessor {
    type Error = WorkerError;

    async fn handle(&self, job: &AnalysisJob) -> Result<Manifest, WorkerError> {
        tokio::time::timeout(self.config.job_timeout, self.process(job))
            .await
            .map_err(|_| WorkerError::Timeout(self.config.job_timeout))?
    }
}
