use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::RwLock;
use tokio_stream::wrappers::ReadDirStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::{is_temp_file, CacheEntry};
use crate::error::CacheError;
use crate::identity::VideoFormat;

/// Size-bounded index over the files in the cache directory.
///
/// File modification time doubles as last access time and is the only state
/// the index is rebuilt from.
pub struct CacheStore {
    cache_dir: PathBuf,
    max_bytes: u64,
    index: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Scans `cache_dir` once and indexes every file in it. No eviction runs here.
    pub async fn initialize(cache_dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::new(&cache_dir, e))?;

        let mut index = HashMap::new();
        let read_dir = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| CacheError::new(&cache_dir, e))?;
        let mut entries = ReadDirStream::new(read_dir);
        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(|e| CacheError::new(&cache_dir, e))?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if is_temp_file(&file_name) {
                continue;
            }
            match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => {
                    index.insert(file_name.clone(), entry_from_metadata(file_name, &metadata));
                }
                Ok(_) => {}
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable cache file"),
            }
        }
        info!(dir = %cache_dir.display(), files = index.len(), "Cache index built");

        Ok(Self {
            cache_dir,
            max_bytes,
            index: RwLock::new(index),
        })
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.cache_dir.join(file_name)
    }

    /// Looks up `{stable_id}.{format}`; a webm request falls back to the mp4.
    pub async fn is_cached(&self, stable_id: &str, format: VideoFormat) -> Option<String> {
        let exact = format!("{stable_id}.{format}");
        if self.lookup(&exact).await {
            return Some(exact);
        }
        if format == VideoFormat::Webm {
            let fallback = format!("{stable_id}.{}", VideoFormat::Mp4);
            if self.lookup(&fallback).await {
                return Some(fallback);
            }
        }
        None
    }

    async fn lookup(&self, file_name: &str) -> bool {
        if !self.index.read().await.contains_key(file_name) {
            return false;
        }
        if fs::try_exists(self.path_of(file_name)).await.unwrap_or(false) {
            return true;
        }
        // Re-check under the write lock: a download may have just put the file back.
        let mut index = self.index.write().await;
        if fs::try_exists(self.path_of(file_name)).await.unwrap_or(false) {
            return index.contains_key(file_name);
        }
        debug!(file_name, "Cached file deleted externally");
        index.remove(file_name);
        false
    }

    /// Marks a cache hit so frequently played files survive eviction.
    pub async fn touch(&self, file_name: &str) -> Result<(), CacheError> {
        let path = self.path_of(file_name);
        let now = SystemTime::now();
        set_modified(&path, now)
            .await
            .map_err(|e| CacheError::new(&path, e))?;
        if let Some(entry) = self.index.write().await.get_mut(file_name) {
            entry.last_modified = DateTime::<Utc>::from(now);
        }
        Ok(())
    }

    /// Re-stats `file_name`, upserts its entry and evicts down to budget.
    pub async fn add_or_update(&self, file_name: &str) -> Result<(), CacheError> {
        let path = self.path_of(file_name);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| CacheError::new(&path, e))?;

        let mut index = self.index.write().await;
        index.insert(
            file_name.to_string(),
            entry_from_metadata(file_name.to_string(), &metadata),
        );
        self.evict(&mut index).await;
        Ok(())
    }

    async fn evict(&self, index: &mut HashMap<String, CacheEntry>) {
        if self.max_bytes == 0 {
            return;
        }
        let mut total: u64 = index.values().map(|entry| entry.size_bytes).sum();
        if total < self.max_bytes {
            return;
        }

        let mut oldest: Vec<CacheEntry> = index.values().cloned().collect();
        oldest.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });

        for entry in oldest {
            if total < self.max_bytes {
                break;
            }
            let path = self.path_of(&entry.file_name);
            match fs::remove_file(&path).await {
                Ok(()) => info!(file = %entry.file_name, size = entry.size_bytes, "Evicted cached video"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete evicted file"),
            }
            index.remove(&entry.file_name);
            total = total.saturating_sub(entry.size_bytes);
        }
    }

    pub async fn total_bytes(&self) -> u64 {
        self.index.read().await.values().map(|e| e.size_bytes).sum()
    }

    pub async fn entry(&self, file_name: &str) -> Option<CacheEntry> {
        self.index.read().await.get(file_name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}

fn entry_from_metadata(file_name: String, metadata: &std::fs::Metadata) -> CacheEntry {
    let last_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    CacheEntry {
        file_name,
        size_bytes: metadata.len(),
        last_modified,
    }
}

pub(crate) async fn set_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    let file = file.into_std().await;
    tokio::task::spawn_blocking(move || file.set_modified(time))
        .await
        .map_err(io::Error::other)?
}
