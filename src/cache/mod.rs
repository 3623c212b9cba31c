mod disk_cache;
mod memory_cache;

pub use disk_cache::*;
pub use memory_cache::*;

use chrono::{DateTime, Utc};

use crate::identity::VideoFormat;

/// In-flight downloads are written to `_download.{ext}` before being renamed into place.
pub const TEMP_FILE_STEM: &str = "_download";

pub fn temp_file_name(format: VideoFormat) -> String {
    format!("{TEMP_FILE_STEM}.{format}")
}

pub fn is_temp_file(file_name: &str) -> bool {
    file_name
        .strip_prefix(TEMP_FILE_STEM)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub file_name: String,
    pub size_bytes: u64,
    /// File mtime, refreshed on every hit.
    pub last_modified: DateTime<Utc>,
}
