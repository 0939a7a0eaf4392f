//! Application state.

use std::sync::Arc;

use lapcmp_queue::{JobQueue, JobRunner, LocalJobRunner, QueueConfig, RedisJobRunner};
use lapcmp_storage::{ObjectStoreClient, StorageConfig, UploadSigner};
use lapcmp_worker::{AnalysisProcessor, WorkerConfig};
use tracing::info;

use crate::config::{ApiConfig, RunnerKind};
use crate::error::ApiResult;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    /// Bucket and prefix layout for results
    pub storage: StorageConfig,
    pub signer: Arc<dyn UploadSigner>,
    pub runner: Arc<dyn JobRunner>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        storage: StorageConfig,
        signer: Arc<dyn UploadSigner>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            config,
            storage,
            signer,
            runner,
        }
    }

    /// Build state from environment, wiring the runner chosen in `config`.
    pub async fn from_env(config: ApiConfig) -> ApiResult<Self> {
        let storage_config = StorageConfig::from_env()?;
        let client = ObjectStoreClient::new(storage_config.clone())?;

        let runner: Arc<dyn JobRunner> = match config.runner {
            RunnerKind::Redis => {
                let queue = JobQueue::from_env()?;
                queue.init().await?;
                Arc::new(RedisJobRunner::new(queue))
            }
            RunnerKind::Local => {
                let processor = AnalysisProcessor::new(client.clone(), WorkerConfig::from_env());
                Arc::new(
                    LocalJobRunner::new(processor)
                        .with_status_ttl(QueueConfig::from_env().status_ttl),
                )
            }
        };
        info!(runner = ?config.runner, bucket = %storage_config.bucket, "Application state ready");

        Ok(Self::new(config, storage_config, Arc::new(client), runner))
    }
}
