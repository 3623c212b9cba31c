use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info, warn};

use super::Ytdl;
use crate::cache::{ResolveKey, ResolvedUrlCache};
use crate::error::ResolveError;
use crate::identity::{Category, VideoIdentity};

/// How often a waiting resolution checks whether a concurrent caller finished first.
pub const RACE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Turns source URLs into short-lived playable URLs via yt-dlp.
///
/// Successful results are memoized per `(source_url, avpro)` for the cache's TTL.
/// Concurrent calls for the same key race; as soon as one of them stores a
/// result, the others kill their own yt-dlp process and return that result.
pub struct UrlResolver {
    ytdl: Arc<Ytdl>,
    cache: ResolvedUrlCache,
    poll_interval: Duration,
    youtube_delay: Duration,
}

impl UrlResolver {
    pub fn new(ytdl: Arc<Ytdl>, cache: ResolvedUrlCache) -> Self {
        Self {
            ytdl,
            cache,
            poll_interval: RACE_POLL_INTERVAL,
            youtube_delay: Duration::ZERO,
        }
    }

    /// Waits this long before answering a fresh YouTube resolution.
    pub fn with_youtube_delay(mut self, delay: Duration) -> Self {
        self.youtube_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn cache(&self) -> &ResolvedUrlCache {
        &self.cache
    }

    pub async fn resolve_identity(&self, identity: &VideoIdentity, avpro: bool) -> Result<String, ResolveError> {
        self.resolve(&identity.source_url, identity.category, avpro).await
    }

    pub async fn resolve(&self, source_url: &str, category: Category, avpro: bool) -> Result<String, ResolveError> {
        self.cache.purge_expired();
        let key = ResolveKey::new(source_url, avpro);
        if let Some(url) = self.cache.get(&key) {
            info!(url = source_url, "Returning cached URL resolution");
            return Ok(url);
        }

        if category == Category::YouTube && source_url.contains("results?") {
            return Err(ResolveError::SearchPage);
        }

        let args = self.ytdl.resolve_args(source_url, category, avpro);
        info!(?args, "Started yt-dlp");
        let mut running = self.ytdl.spawn(&args).map_err(ResolveError::Spawn)?;

        let status = loop {
            match timeout(self.poll_interval, running.child.wait()).await {
                Ok(status) => break status.map_err(ResolveError::Spawn)?,
                Err(_) => {
                    if let Some(url) = self.cache.get(&key) {
                        info!(url = source_url, "Another request resolved this URL first, dropping our yt-dlp run");
                        running.kill().await;
                        return Ok(url);
                    }
                }
            }
        };
        let output = running.finish(status).await;

        if !output.status.success() {
            if let Some(url) = self.cache.get(&key) {
                info!(url = source_url, "Another request succeeded while we failed, returning its result");
                return Ok(url);
            }
            let stderr = output.stderr.trim().to_string();
            if output.hit_bot_check() {
                error!(url = source_url, "yt-dlp hit YouTube's bot check; export browser cookies to fix this");
                return Err(ResolveError::BotCheck(stderr));
            }
            warn!(url = source_url, status = %output.status, stderr, "yt-dlp failed to resolve URL");
            return Err(ResolveError::Tool {
                status: output.status.to_string(),
                stderr,
            });
        }

        let resolved = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(ResolveError::EmptyOutput)?;

        if category == Category::YouTube && !self.youtube_delay.is_zero() {
            info!(delay = ?self.youtube_delay, "Delaying YouTube URL response");
            tokio::time::sleep(self.youtube_delay).await;
        }

        let winner = self.cache.insert_or_adopt(key, resolved);
        info!(url = source_url, resolved = %winner, "Resolved URL");
        Ok(winner)
    }
}
