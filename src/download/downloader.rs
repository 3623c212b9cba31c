use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use super::{DownloadJob, JobHandler};
use crate::cache::{temp_file_name, CacheStore};
use crate::config::Config;
use crate::error::DownloadError;
use crate::identity::{Category, VideoFormat};
use crate::ytdl::{ProbeInfo, Ytdl};

/// Attempts for a YouTube download that keeps hitting the bot check.
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub youtube: bool,
    pub py_py_dance: bool,
    pub vr_dancing: bool,
    /// 0 disables the length limit.
    pub youtube_max_secs: u64,
}

impl CachePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            youtube: config.cache_you_tube,
            py_py_dance: config.cache_py_py_dance,
            vr_dancing: config.cache_vr_dancing,
            youtube_max_secs: config.cache_you_tube_max_length_minutes * 60,
        }
    }

    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::YouTube => self.youtube,
            Category::PyPyDance => self.py_py_dance,
            Category::VrDancing => self.vr_dancing,
            Category::Other => false,
        }
    }
}

/// Materializes queued videos into the cache directory.
pub struct VideoDownloader {
    ytdl: Arc<Ytdl>,
    client: reqwest::Client,
    store: Arc<CacheStore>,
    policy: CachePolicy,
}

impl VideoDownloader {
    pub fn new(ytdl: Arc<Ytdl>, client: reqwest::Client, store: Arc<CacheStore>, policy: CachePolicy) -> Self {
        Self {
            ytdl,
            client,
            store,
            policy,
        }
    }

    fn temp_path(&self, format: VideoFormat) -> PathBuf {
        self.store.path_of(&temp_file_name(format))
    }

    /// Downloads `job` and registers the result. `Ok(None)` means the job was skipped.
    pub async fn download(&self, job: &DownloadJob) -> Result<Option<String>, DownloadError> {
        let category = job.category();
        if !self.policy.allows(category) {
            info!(url = job.source_url(), ?category, "Caching disabled for this kind of URL");
            return Ok(None);
        }
        let format = match category {
            Category::YouTube => {
                self.download_youtube(job).await?;
                job.identity.format
            }
            Category::PyPyDance | Category::VrDancing => {
                self.download_direct(job.source_url()).await?;
                VideoFormat::Mp4
            }
            Category::Other => return Ok(None),
        };

        let file_name = format!("{}.{}", job.identity.stable_id, format);
        fs::rename(self.temp_path(format), self.store.path_of(&file_name)).await?;
        self.store.add_or_update(&file_name).await?;
        Ok(Some(file_name))
    }

    async fn download_youtube(&self, job: &DownloadJob) -> Result<(), DownloadError> {
        let url = job.source_url();
        let probe = self.probe(url).await?;
        probe
            .check(self.policy.youtube_max_secs)
            .map_err(DownloadError::Rejected)?;

        let format = job.identity.format;
        let temp_path = self.temp_path(format);
        self.remove_stale_temp(&temp_path).await?;
        info!(url, avpro = job.avpro, %format, "Downloading YouTube video");
        let args = self.ytdl.download_args(&temp_path, &probe.id, format);

        let mut attempt = 1;
        loop {
            let output = self.ytdl.run(&args).await.map_err(DownloadError::Spawn)?;
            if output.status.success() {
                break;
            }
            if output.hit_bot_check() && attempt < MAX_DOWNLOAD_ATTEMPTS {
                warn!(url, attempt, "YouTube bot check during download, retrying");
                attempt += 1;
                self.remove_stale_temp(&temp_path).await?;
                continue;
            }
            return Err(DownloadError::Tool {
                status: output.status.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        if !fs::try_exists(&temp_path).await.unwrap_or(false) {
            return Err(DownloadError::MissingOutput(temp_path));
        }
        Ok(())
    }

    async fn probe(&self, url: &str) -> Result<ProbeInfo, DownloadError> {
        let output = self
            .ytdl
            .run(&self.ytdl.probe_args(url))
            .await
            .map_err(DownloadError::Spawn)?;
        if !output.status.success() {
            return Err(DownloadError::Tool {
                status: output.status.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        ProbeInfo::parse(&output.stdout).map_err(|e| DownloadError::Probe(e.to_string()))
    }

    async fn download_direct(&self, url: &str) -> Result<(), DownloadError> {
        let temp_path = self.temp_path(VideoFormat::Mp4);
        self.remove_stale_temp(&temp_path).await?;
        info!(url, "Downloading video");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let mut file = fs::File::create(&temp_path).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn remove_stale_temp(&self, temp_path: &Path) -> io::Result<()> {
        match fs::remove_file(temp_path).await {
            Ok(()) => {
                warn!(path = %temp_path.display(), "Deleted leftover temp file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl JobHandler for VideoDownloader {
    async fn handle(&self, job: &DownloadJob) {
        match self.download(job).await {
            Ok(Some(file_name)) => info!(url = job.source_url(), file = %file_name, "Video downloaded"),
            Ok(None) => {}
            Err(DownloadError::Rejected(reason)) => {
                info!(url = job.source_url(), %reason, "Not downloading video")
            }
            Err(e) => error!(url = job.source_url(), error = %e, "Failed to download video"),
        }
    }
}
