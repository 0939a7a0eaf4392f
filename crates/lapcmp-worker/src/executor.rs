//! Job executor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lapcmp_models::{JobRecord, JobStatus, Manifest};
use lapcmp_queue::{JobHandler, JobQueue, QueuedJob, StatusStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::AnalysisProcessor;

/// How often a running job's record is checked for a cancel.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Drive `run` to completion unless `cancelled` reports true first.
///
/// `cancelled` is checked every `every`. On cancel `run` is dropped, which
/// stops its analysis work, and `None` is returned.
pub(crate) async fn until_cancelled<T, F, C, CF>(run: F, mut cancelled: C, every: Duration) -> Option<T>
where
    F: Future<Output = T>,
    C: FnMut() -> CF,
    CF: Future<Output = bool>,
{
    tokio::pin!(run);
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            output = &mut run => return Some(output),
            _ = ticker.tick() => {
                if cancelled().await {
                    return None;
                }
            }
        }
    }
}

/// What to do with a record once its run ends.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Settlement {
    Store,
    /// Cancelled while running; the result is dropped
    Discard,
}

/// Apply a run outcome to the latest stored record.
pub(crate) fn settle(
    record: &mut JobRecord,
    outcome: Result<Manifest, &WorkerError>,
) -> Settlement {
    if record.is_terminal() {
        return Settlement::Discard;
    }
    match outcome {
        Ok(manifest) => record.finish(manifest),
        Err(e) => record.fail(e.to_string()),
    }
    Settlement::Store
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    statuses: StatusStore,
    processor: Arc<AnalysisProcessor>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, processor: AnalysisProcessor) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        let statuses = StatusStore::new(&queue);

        Self {
            config,
            queue: Arc::new(queue),
            statuses,
            processor: Arc::new(processor),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Consume until [`shutdown`](Self::shutdown) is signalled, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;
        match (self.queue.len().await, self.queue.dlq_len().await) {
            (Ok(pending), Ok(dead)) => info!(pending, dead, "Queue ready"),
            (Err(e), _) | (_, Err(e)) => warn!("Could not read queue depth: {}", e),
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Shutdown timeout elapsed with jobs still running");
        }

        info!("Job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available)
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, queued) in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            let processor = Arc::clone(&self.processor);
            let queue = Arc::clone(&self.queue);
            let statuses = self.statuses.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(processor, queue, statuses, message_id, queued).await;
            });
        }

        Ok(())
    }

    async fn execute_job(
        processor: Arc<AnalysisProcessor>,
        queue: Arc<JobQueue>,
        statuses: StatusStore,
        message_id: String,
        queued: QueuedJob,
    ) {
        let call_id = queued.call_id.as_str();
        let job_id = queued.job.job_id.as_str();

        match statuses.get(call_id).await {
            Ok(Some(record)) if record.is_terminal() => {
                info!(call_id, job_id, status = %record.status, "Skipping job");
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(call_id, "Could not read job record: {}", e),
        }

        info!(call_id, job_id, "Executing job");
        let store = &statuses;
        let cancel_requested = move || async move {
            matches!(
                store.get(call_id).await,
                Ok(Some(record)) if record.status == JobStatus::Cancelled
            )
        };
        let Some(result) =
            until_cancelled(processor.handle(&queued.job), cancel_requested, CANCEL_POLL_INTERVAL)
                .await
        else {
            info!(call_id, job_id, "Job cancelled while running, stopped");
            if let Err(e) = queue.ack(&message_id).await {
                error!("Failed to ack job {}: {}", job_id, e);
            }
            return;
        };

        // Re-read: a cancel may have landed while the job ran.
        let mut record = match statuses.get(call_id).await {
            Ok(Some(record)) => record,
            Ok(None) => JobRecord::new(call_id, job_id),
            Err(e) => {
                error!(call_id, "Could not read job record: {}", e);
                JobRecord::new(call_id, job_id)
            }
        };

        match settle(&mut record, result.as_ref().cloned()) {
            Settlement::Discard => {
                info!(call_id, job_id, "Job was cancelled while running, discarding result");
            }
            Settlement::Store => {
                if let Err(e) = statuses.put(&record).await {
                    error!(call_id, "Failed to store job record: {}", e);
                }
            }
        }

        match &result {
            Ok(_) => {
                info!(call_id, job_id, "Job completed successfully");
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!(call_id, job_id, retryable = e.is_retryable(), "Job failed: {}", e);
                if let Err(dlq_err) = queue.dlq(&message_id, &queued, &e.to_string()).await {
                    error!("Failed to move job {} to DLQ: {}", job_id, dlq_err);
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
