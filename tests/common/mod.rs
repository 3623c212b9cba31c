#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use video_cacher::cache::{CacheStore, ResolvedUrlCache};
use video_cacher::config::Config;
use video_cacher::download::DownloadQueue;
use video_cacher::identity::IdentityResolver;
use video_cacher::proxy::AppState;
use video_cacher::ytdl::{UrlResolver, Ytdl};

pub const WEB_SERVER_URL: &str = "http://localhost:9696/";

/// A shell script standing in for yt-dlp. Every invocation appends its
/// arguments to `calls.log`; `$DIR` points at the script's scratch directory.
pub struct FakeYtdl {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl FakeYtdl {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yt-dlp");
        let script = format!(
            "#!/bin/sh\nDIR='{}'\necho \"$*\" >> \"$DIR/calls.log\"\n{}\n",
            dir.path().display(),
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    /// Prints `url` for every call.
    pub fn resolving_to(url: &str) -> Self {
        Self::new(&format!("echo '{url}'"))
    }

    pub fn failing_with(stderr: &str) -> Self {
        let quoted = stderr.replace('\'', r"'\''");
        Self::new(&format!("echo '{quoted}' >&2\nexit 1"))
    }

    pub fn ytdl(&self) -> Arc<Ytdl> {
        Arc::new(Ytdl::new(&self.path))
    }

    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn resolver(ytdl: Arc<Ytdl>) -> UrlResolver {
    UrlResolver::new(ytdl, ResolvedUrlCache::default()).with_poll_interval(Duration::from_millis(20))
}

pub fn test_config(cache_dir: &Path) -> Config {
    Config {
        web_server_url: WEB_SERVER_URL.to_string(),
        cached_asset_path: cache_dir.to_path_buf(),
        ..Config::default()
    }
}

pub async fn app_state(config: Config, ytdl: Arc<Ytdl>) -> Arc<AppState> {
    let store = CacheStore::initialize(&config.cached_asset_path, config.cache_max_bytes())
        .await
        .unwrap();
    Arc::new(AppState {
        identities: IdentityResolver::new(reqwest::Client::new(), &config),
        config: Arc::new(config),
        store: Arc::new(store),
        resolver: resolver(ytdl),
        queue: Arc::new(DownloadQueue::new()),
    })
}

/// Writes `len` bytes to `dir/name` and backdates its mtime by `age_secs`.
pub fn write_aged(dir: &Path, name: &str, len: usize, age_secs: u64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; len]).unwrap();
    let mtime = std::time::SystemTime::now() - Duration::from_secs(age_secs);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
    path
}

pub async fn body_text(response: hyper::Response<video_cacher::proxy::ProxyBody>) -> String {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
