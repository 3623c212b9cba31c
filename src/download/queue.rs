use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::identity::{Category, VideoIdentity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub identity: VideoIdentity,
    /// Requested by the AVPro player. The container choice it implies is
    /// already carried by `identity.format`.
    pub avpro: bool,
}

impl DownloadJob {
    pub fn new(identity: VideoIdentity, avpro: bool) -> Self {
        Self { identity, avpro }
    }

    pub fn category(&self) -> Category {
        self.identity.category
    }

    pub fn source_url(&self) -> &str {
        &self.identity.source_url
    }
}

/// FIFO of pending downloads with a single consumer.
///
/// The job being worked on stays at the head until [`DownloadQueue::finish`],
/// so it still counts as queued for deduplication.
#[derive(Debug, Default)]
pub struct DownloadQueue {
    jobs: Mutex<VecDeque<DownloadJob>>,
    notify: Notify,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `job` unless one with the same source URL is already queued.
    pub fn enqueue(&self, job: DownloadJob) -> bool {
        {
            let mut jobs = self.jobs.lock();
            if jobs.iter().any(|queued| queued.source_url() == job.source_url()) {
                info!(url = job.source_url(), "URL is already in the download queue");
                return false;
            }
            debug!(url = job.source_url(), id = %job.identity.stable_id, "Queued download");
            jobs.push_back(job);
        }
        self.notify.notify_one();
        true
    }

    /// Waits for a job and returns a copy of the head without removing it.
    pub async fn peek(&self) -> DownloadJob {
        loop {
            if let Some(job) = self.jobs.lock().front().cloned() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    /// Removes the head job once it has been handled.
    pub fn finish(&self) -> Option<DownloadJob> {
        self.jobs.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<DownloadJob> {
        self.jobs.lock().iter().cloned().collect()
    }
}
