use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use video_cacher::cache::{CacheStore, ResolvedUrlCache};
use video_cacher::config::{Config, DEFAULT_CONFIG_FILE};
use video_cacher::download::{spawn_worker, CachePolicy, DownloadQueue, VideoDownloader};
use video_cacher::identity::IdentityResolver;
use video_cacher::precache::PreCacher;
use video_cacher::proxy::{AppState, ProxyServer};
use video_cacher::ytdl::{UrlResolver, Ytdl};

const USER_AGENT: &str = concat!("VRCVideoCacher/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Parser)]
#[command(version, about = "Caching proxy for VR video players")]
struct Args {
    /// Path to the JSON config file, created with defaults if missing
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Arc::new(Config::load_or_create(&args.config)?);

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")?;
    let ytdl = Arc::new(Ytdl::from_config(&config));
    let store = Arc::new(
        CacheStore::initialize(&config.cached_asset_path, config.cache_max_bytes())
            .await
            .context("initializing cache directory")?,
    );

    let resolver = UrlResolver::new(ytdl.clone(), ResolvedUrlCache::default())
        .with_youtube_delay(Duration::from_secs(config.ytdl_delay_seconds));
    let queue = Arc::new(DownloadQueue::new());
    let downloader = VideoDownloader::new(
        ytdl.clone(),
        client.clone(),
        store.clone(),
        CachePolicy::from_config(&config),
    );
    let _worker = spawn_worker(queue.clone(), Arc::new(downloader));

    if !config.pre_cache_urls.is_empty() {
        let precacher = PreCacher::new(client.clone(), store.clone());
        let lists = config.pre_cache_urls.clone();
        tokio::spawn(async move { precacher.run(&lists).await });
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        identities: IdentityResolver::new(client, &config),
        store,
        resolver,
        queue,
    });

    let server = ProxyServer::new(config.listen_address, state, config.max_connections);
    server
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Bye");
    Ok(())
}
