//! Analysis worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};

use lapcmp_queue::JobQueue;
use lapcmp_storage::ObjectStoreClient;
use lapcmp_worker::{init_tracing, AnalysisProcessor, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting lapcmp-worker");

    if let Err(e) = lapcmp_media::check_ffmpeg().and_then(|_| lapcmp_media::check_ffprobe()) {
        error!("FFmpeg tooling unavailable: {}", e);
        std::process::exit(1);
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let storage = match ObjectStoreClient::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = storage.check_connectivity().await {
        warn!("Object store not reachable yet: {}", e);
    }

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let processor = AnalysisProcessor::new(storage, config.clone());
    let executor = Arc::new(JobExecutor::new(config, queue, processor));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
