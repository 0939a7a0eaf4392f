//! In-process runner: each job is a tokio task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lapcmp_models::{JobRecord, RunState};

use crate::error::{QueueError, QueueResult};
use crate::job::AnalysisJob;
use crate::runner::{JobHandler, JobRunner, RunHandle};

/// Matches the Redis status TTL default.
const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(86400);

struct LocalRun {
    record: JobRecord,
    task: Option<JoinHandle<()>>,
    /// Set when the record turns terminal
    settled_at: Option<Instant>,
}

impl LocalRun {
    fn settle(&mut self) {
        self.task = None;
        self.settled_at = Some(Instant::now());
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.settled_at.is_some_and(|at| at.elapsed() >= ttl)
    }
}

type Runs = Arc<Mutex<HashMap<String, LocalRun>>>;

/// Runs jobs in the current process.
///
/// Terminal records are evicted once they are older than the status TTL;
/// running jobs are never evicted.
pub struct LocalJobRunner<H: JobHandler> {
    handler: Arc<H>,
    runs: Runs,
    status_ttl: Duration,
}

impl<H: JobHandler> LocalJobRunner<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            runs: Arc::new(Mutex::new(HashMap::new())),
            status_ttl: DEFAULT_STATUS_TTL,
        }
    }

    /// How long finished, failed and cancelled records stay pollable.
    pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
        self.status_ttl = ttl;
        self
    }

    fn evict_expired(&self, runs: &mut HashMap<String, LocalRun>) {
        let before = runs.len();
        runs.retain(|_, run| !run.expired(self.status_ttl));
        let evicted = before - runs.len();
        if evicted > 0 {
            debug!(evicted, remaining = runs.len(), "Evicted expired job records");
        }
    }
}

impl<H: JobHandler> Clone for LocalJobRunner<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            runs: Arc::clone(&self.runs),
            status_ttl: self.status_ttl,
        }
    }
}

#[async_trait]
impl<H: JobHandler> JobRunner for LocalJobRunner<H> {
    async fn submit(&self, job: AnalysisJob) -> QueueResult<RunHandle> {
        let call_id = Uuid::new_v4().to_string();
        let record = JobRecord::new(&call_id, job.job_id.as_str());

        // Hold the lock across spawn so the task cannot finish before its entry exists.
        let mut runs = self.runs.lock().await;
        self.evict_expired(&mut runs);

        let handler = Arc::clone(&self.handler);
        let task_runs = Arc::clone(&self.runs);
        let task_call_id = call_id.clone();
        let task = tokio::spawn(async move {
            let outcome = handler.handle(&job).await;

            let mut runs = task_runs.lock().await;
            let Some(run) = runs.get_mut(&task_call_id) else {
                return;
            };
            if run.record.is_terminal() {
                return;
            }
            match outcome {
                Ok(manifest) => {
                    info!(call_id = %task_call_id, job_id = %job.job_id, "Job finished");
                    run.record.finish(manifest);
                }
                Err(e) => {
                    warn!(call_id = %task_call_id, job_id = %job.job_id, "Job failed: {}", e);
                    run.record.fail(e.to_string());
                }
            }
            run.settle();
        });

        runs.insert(
            call_id.clone(),
            LocalRun {
                record,
                task: Some(task),
                settled_at: None,
            },
        );

        Ok(RunHandle::new(call_id))
    }

    async fn poll(&self, handle: &RunHandle) -> QueueResult<RunState> {
        let mut runs = self.runs.lock().await;
        self.evict_expired(&mut runs);
        runs.get(&handle.call_id)
            .map(|run| run.record.run_state())
            .ok_or_else(|| QueueError::job_not_found(&handle.call_id))
    }

    async fn cancel(&self, handle: &RunHandle) -> QueueResult<()> {
        let mut runs = self.runs.lock().await;
        self.evict_expired(&mut runs);
        let run = runs
            .get_mut(&handle.call_id)
            .ok_or_else(|| QueueError::job_not_found(&handle.call_id))?;

        if run.record.is_terminal() {
            return Ok(());
        }
        if let Some(task) = run.task.take() {
            task.abort();
        }
        run.record.cancel();
        run.settle();
        info!(call_id = %handle.call_id, "Job cancelled");
        Ok(())
    }
}
