use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{DownloadJob, DownloadQueue};

/// Processes one dequeued job. Failures are the handler's to log; the queue
/// moves on either way.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &DownloadJob);
}

/// Starts the one worker that drains `queue`. Jobs run strictly one at a time.
pub fn spawn_worker(queue: Arc<DownloadQueue>, handler: Arc<dyn JobHandler>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let job = queue.peek().await;
            debug!(url = job.source_url(), "Processing download");
            handler.handle(&job).await;
            queue.finish();
        }
    })
}
