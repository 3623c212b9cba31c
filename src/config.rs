use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "Config.json";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub listen_address: SocketAddr,
    /// Prefix of the URLs handed back for cached files.
    pub web_server_url: String,
    pub ytdl_path: PathBuf,
    pub ytdl_additional_args: String,
    pub ytdl_use_cookies: bool,
    pub ytdl_cookies_path: PathBuf,
    pub ytdl_dub_language: String,
    pub ytdl_delay_seconds: u64,
    pub cached_asset_path: PathBuf,
    pub cache_max_size_gb: f64,
    pub cache_you_tube: bool,
    pub cache_py_py_dance: bool,
    pub cache_vr_dancing: bool,
    /// Longest YouTube video to download, 0 for no limit.
    pub cache_you_tube_max_length_minutes: u64,
    pub blocked_urls: Vec<String>,
    pub blocked_placeholder_url: String,
    pub cache_bypass_prefixes: Vec<String>,
    pub py_py_dance_prefixes: Vec<String>,
    pub vr_dancing_prefixes: Vec<String>,
    pub pre_cache_urls: Vec<String>,
    pub max_connections: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], 9696)),
            web_server_url: "http://localhost:9696/".to_string(),
            ytdl_path: PathBuf::from("yt-dlp"),
            ytdl_additional_args: String::new(),
            ytdl_use_cookies: false,
            ytdl_cookies_path: PathBuf::from("youtube_cookies.txt"),
            ytdl_dub_language: String::new(),
            ytdl_delay_seconds: 0,
            cached_asset_path: PathBuf::from("CachedAssets"),
            cache_max_size_gb: 0.0,
            cache_you_tube: true,
            cache_py_py_dance: true,
            cache_vr_dancing: true,
            cache_you_tube_max_length_minutes: 120,
            blocked_urls: vec!["https://na2.vrdancing.club/sampleurl.mp4".to_string()],
            blocked_placeholder_url: "https://ellyvr.dev/blocked.mp4".to_string(),
            cache_bypass_prefixes: vec![
                "https://themightygym-europe.ams3.cdn.digitaloceanspaces.com".to_string(),
            ],
            py_py_dance_prefixes: vec![
                "http://jd.pypy.moe/api/v1/videos/".to_string(),
                "https://jd.pypy.moe/api/v1/videos/".to_string(),
            ],
            vr_dancing_prefixes: vec![
                "https://na2.vrdancing.club".to_string(),
                "https://eu2.vrdancing.club".to_string(),
            ],
            pre_cache_urls: Vec::new(),
            max_connections: 100,
        }
    }
}

impl Config {
    /// Loads the config file, writing defaults when it does not exist yet.
    ///
    /// An existing file is saved back after parsing so keys added in newer
    /// versions show up with their defaults.
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        info!(path = %path.display(), "Loading config");
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Config::default()
        };
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Cache budget in bytes; 0 means eviction is disabled.
    pub fn cache_max_bytes(&self) -> u64 {
        if self.cache_max_size_gb <= 0.0 {
            0
        } else {
            (self.cache_max_size_gb * BYTES_PER_GB) as u64
        }
    }

    pub fn additional_args(&self) -> Vec<String> {
        self.ytdl_additional_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Cookie file to pass to yt-dlp, if cookies are enabled and the file looks usable.
    pub fn cookies_file(&self) -> Option<PathBuf> {
        if !self.ytdl_use_cookies {
            return None;
        }
        let contents = std::fs::read_to_string(&self.ytdl_cookies_path).ok()?;
        contents
            .contains("youtube.com")
            .then(|| self.ytdl_cookies_path.clone())
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        self.blocked_urls.iter().any(|blocked| blocked == url)
    }

    pub fn bypasses_cache(&self, url: &str) -> bool {
        self.cache_bypass_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }

    pub fn cached_file_url(&self, file_name: &str) -> String {
        format!("{}{}", self.web_server_url, file_name)
    }
}
