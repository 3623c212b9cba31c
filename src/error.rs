use std::io;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

use crate::ytdl::ProbeRejection;

/// The URL could not be mapped to a stable identity; caching is bypassed.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("no YouTube video id in {0}")]
    NoVideoId(String),
    #[error("redirect lookup failed for {url}: {source}")]
    Redirect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("cannot derive a video id from redirect target {0}")]
    UnparsableTarget(String),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("URL is a search query, cannot get video URL")]
    SearchPage,
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] io::Error),
    #[error("yt-dlp blocked by bot check: {0}")]
    BotCheck(String),
    #[error("yt-dlp exited with {status}: {stderr}")]
    Tool { status: String, stderr: String },
    #[error("yt-dlp returned no URL")]
    EmptyOutput,
}

impl ResolveError {
    /// Text returned to the client as the diagnostic body.
    pub fn diagnostic(&self) -> String {
        match self {
            ResolveError::BotCheck(stderr) => stderr.clone(),
            ResolveError::Tool { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("origin answered {0}")]
    Status(StatusCode),
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] io::Error),
    #[error("yt-dlp exited with {status}: {stderr}")]
    Tool { status: String, stderr: String },
    #[error("probe output unreadable: {0}")]
    Probe(String),
    #[error("not caching video: {0}")]
    Rejected(ProbeRejection),
    #[error("download produced no file at {0}")]
    MissingOutput(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Error, Debug)]
#[error("cache I/O on {path}: {source}")]
pub struct CacheError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl CacheError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}
