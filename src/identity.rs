//! Maps incoming video URLs to stable cache identities.

use std::fmt;
use std::sync::LazyLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use url::Url;

use crate::config::Config;
use crate::error::ClassifyError;

const YOUTUBE_HOSTS: [&str; 3] = ["youtube.com", "www.youtube.com", "youtu.be"];
const YOUTUBE_ID_LEN: usize = 11;

static YOUTUBE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:youtube\.com/(?:[^/\n\s]+/\S+/|(?:v|e(?:mbed)?)/|live/|\S*?[?&]v=)|youtu\.be/)([a-zA-Z0-9_-]{11})",
    )
    .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    YouTube,
    PyPyDance,
    VrDancing,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    Mp4,
    Webm,
}

impl VideoFormat {
    pub fn extension(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIdentity {
    pub source_url: String,
    pub category: Category,
    pub stable_id: String,
    pub format: VideoFormat,
}

impl VideoIdentity {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stable_id, self.format)
    }
}

/// Classifies URLs. Only PyPyDance index URLs need network access.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    client: reqwest::Client,
    py_py_dance_prefixes: Vec<String>,
    vr_dancing_prefixes: Vec<String>,
}

impl IdentityResolver {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            py_py_dance_prefixes: config.py_py_dance_prefixes.clone(),
            vr_dancing_prefixes: config.vr_dancing_prefixes.clone(),
        }
    }

    /// Category of a URL, decided without any I/O.
    pub fn category_of(&self, url: &str) -> Category {
        if starts_with_any(url, &self.py_py_dance_prefixes) {
            Category::PyPyDance
        } else if starts_with_any(url, &self.vr_dancing_prefixes) {
            Category::VrDancing
        } else if is_youtube_url(url) {
            Category::YouTube
        } else {
            Category::Other
        }
    }

    pub async fn classify(&self, raw_url: &str, avpro: bool) -> Result<VideoIdentity, ClassifyError> {
        let url = raw_url.trim();
        let category = self.category_of(url);
        let (source_url, stable_id) = match category {
            Category::PyPyDance => self.follow_index_redirect(url).await?,
            Category::YouTube => {
                let id = youtube_video_id(url).ok_or_else(|| {
                    error!(url, "Failed to parse video ID from YouTube URL");
                    ClassifyError::NoVideoId(url.to_string())
                })?;
                (url.to_string(), id)
            }
            Category::VrDancing | Category::Other => (url.to_string(), hash_url(url)),
        };
        let format = if category == Category::YouTube && avpro {
            VideoFormat::Webm
        } else {
            VideoFormat::Mp4
        };
        debug!(url, ?category, stable_id, %format, "Classified URL");
        Ok(VideoIdentity {
            source_url,
            category,
            stable_id,
            format,
        })
    }

    /// Index URLs redirect to the real file; its name is the video id.
    async fn follow_index_redirect(&self, url: &str) -> Result<(String, String), ClassifyError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|source| {
                error!(url, %source, "Failed to get video ID from PyPyDance URL");
                ClassifyError::Redirect {
                    url: url.to_string(),
                    source,
                }
            })?;
        let target = response.url();
        let id = target
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|file_name| file_name.split('.').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                error!(url, target = %target, "Failed to get video ID from PyPyDance URL");
                ClassifyError::UnparsableTarget(target.to_string())
            })?;
        Ok((target.to_string(), id))
    }
}

fn starts_with_any(url: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
}

pub fn is_youtube_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| YOUTUBE_HOSTS.contains(&host)))
        .unwrap_or(false)
}

/// Extracts the 11 character video id from a YouTube URL.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let id = match YOUTUBE_ID.captures(url) {
        Some(captures) => captures.get(1)?.as_str().to_string(),
        None => shorts_id(url)?,
    };
    Some(id.chars().take(YOUTUBE_ID_LEN).collect())
}

fn shorts_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    if segments.next()? != "shorts" {
        return None;
    }
    segments
        .next_back()
        .filter(|last| !last.is_empty())
        .map(str::to_string)
}

/// URL-safe, unpadded base64 of the SHA-256 digest of `url`.
pub fn hash_url(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(url.as_bytes()))
}
