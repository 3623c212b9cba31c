//! Bulk pre-caching from published file lists.
//!
//! A list is a JSON array such as
//! `[{"fileName":"--QOnlGckhs.mp4","url":"https://example.com/--QOnlGckhs.mp4","lastModified":1631653260,"size":124029113}]`.
//! `fileName` and `url` are required; `lastModified` (unix seconds) and `size` are optional.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::cache::{set_modified, CacheStore};
use crate::error::DownloadError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreCacheFile {
    pub file_name: String,
    pub url: String,
    #[serde(default)]
    pub last_modified: Option<f64>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl PreCacheFile {
    /// `lastModified` as a timestamp. Values that do not fit one are ignored.
    fn modified_time(&self) -> Option<SystemTime> {
        let secs = self.last_modified.filter(|secs| *secs > 0.0)?;
        let modified = Duration::try_from_secs_f64(secs)
            .ok()
            .and_then(|offset| UNIX_EPOCH.checked_add(offset));
        if modified.is_none() {
            warn!(file = %self.file_name, last_modified = secs, "Ignoring invalid lastModified");
        }
        modified
    }

    fn has_safe_name(&self) -> bool {
        !self.file_name.is_empty()
            && !self.file_name.contains(['/', '\\'])
            && self.file_name != "."
            && self.file_name != ".."
    }
}

pub struct PreCacher {
    client: reqwest::Client,
    store: Arc<CacheStore>,
}

impl PreCacher {
    pub fn new(client: reqwest::Client, store: Arc<CacheStore>) -> Self {
        Self { client, store }
    }

    /// Fetches every list and brings the cache in line with it.
    pub async fn run(&self, list_urls: &[String]) {
        for list_url in list_urls {
            let files = match self.fetch_list(list_url).await {
                Ok(files) => files,
                Err(e) => {
                    error!(url = %list_url, error = %e, "Failed to fetch pre-cache list");
                    continue;
                }
            };
            let total = files.len();
            for (index, file) in files.iter().enumerate() {
                if !file.has_safe_name() {
                    warn!(file = %file.file_name, "Skipping pre-cache entry with unsafe file name");
                    continue;
                }
                if !self.needs_download(file).await {
                    continue;
                }
                let percent = index as f64 / total as f64 * 100.0;
                info!(file = %file.file_name, progress = format!("{percent:.2}%"), "Pre-caching");
                if let Err(e) = self.download(file).await {
                    error!(file = %file.file_name, error = %e, "Error downloading pre-cache file");
                }
            }
            info!(url = %list_url, files = total, "Pre-cache list is up to date");
        }
    }

    pub async fn fetch_list(&self, list_url: &str) -> Result<Vec<PreCacheFile>, DownloadError> {
        let response = self.client.get(list_url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// A file is fetched when it is missing or its size or mtime differ from the list.
    pub async fn needs_download(&self, file: &PreCacheFile) -> bool {
        let Ok(metadata) = fs::metadata(self.store.path_of(&file.file_name)).await else {
            return true;
        };
        if file.size.is_some_and(|size| size > 0 && size != metadata.len()) {
            return true;
        }
        match (file.modified_time(), metadata.modified()) {
            (Some(expected), Ok(actual)) => !same_second(expected, actual),
            _ => false,
        }
    }

    async fn download(&self, file: &PreCacheFile) -> Result<(), DownloadError> {
        let response = self.client.get(&file.url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }
        let path = self.store.path_of(&file.file_name);
        let mut out = fs::File::create(&path).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;
        drop(out);

        if let Some(modified) = file.modified_time() {
            set_modified(&path, modified).await?;
        }
        self.store.add_or_update(&file.file_name).await?;
        Ok(())
    }
}

fn same_second(a: SystemTime, b: SystemTime) -> bool {
    let secs = |t: SystemTime| t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    secs(a) == secs(b)
}
