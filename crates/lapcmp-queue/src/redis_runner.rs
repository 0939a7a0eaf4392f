//! Runner backed by the Redis stream; a separate worker executes the jobs.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use lapcmp_models::{JobRecord, RunState};

use crate::error::{QueueError, QueueResult};
use crate::job::{AnalysisJob, QueuedJob};
use crate::queue::JobQueue;
use crate::runner::{JobRunner, RunHandle};
use crate::status::StatusStore;

#[derive(Clone)]
pub struct RedisJobRunner {
    queue: JobQueue,
    statuses: StatusStore,
}

impl RedisJobRunner {
    pub fn new(queue: JobQueue) -> Self {
        let statuses = StatusStore::new(&queue);
        Self { queue, statuses }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }
}

#[async_trait]
impl JobRunner for RedisJobRunner {
    async fn submit(&self, job: AnalysisJob) -> QueueResult<RunHandle> {
        let call_id = Uuid::new_v4().to_string();

        // Record first so a fast worker always finds it.
        self.statuses
            .put(&JobRecord::new(&call_id, job.job_id.as_str()))
            .await?;

        let queued = QueuedJob {
            call_id: call_id.clone(),
            job,
        };
        self.queue.enqueue(&queued).await?;

        Ok(RunHandle::new(call_id))
    }

    async fn poll(&self, handle: &RunHandle) -> QueueResult<RunState> {
        self.statuses
            .get(&handle.call_id)
            .await?
            .map(|record| record.run_state())
            .ok_or_else(|| QueueError::job_not_found(&handle.call_id))
    }

    async fn cancel(&self, handle: &RunHandle) -> QueueResult<()> {
        let mut record = self
            .statuses
            .get(&handle.call_id)
            .await?
            .ok_or_else(|| QueueError::job_not_found(&handle.call_id))?;

        if record.is_terminal() {
            return Ok(());
        }
        record.cancel();
        self.statuses.put(&record).await?;
        info!(call_id = %handle.call_id, job_id = %record.job_id, "Job cancelled");
        Ok(())
    }
}
