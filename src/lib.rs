//! A local caching proxy for video URLs.
//!
//! `/api/getvideo?url=...` answers with a playable URL: a local file when the
//! video is cached, otherwise a fresh yt-dlp resolution, after which the video
//! is queued for download into a size-bounded cache directory.

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod identity;
pub mod precache;
pub mod proxy;
pub mod ytdl;
