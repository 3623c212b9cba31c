//! Wrapper around the yt-dlp command line.
//!
//! Three invocation modes are used: `--get-url` to resolve a playable URL,
//! `-j` to probe a YouTube video before downloading, and `-o` to download
//! into the cache's temp file.

mod probe;
mod resolve;

pub use probe::*;
pub use resolve::*;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::identity::{Category, VideoFormat};

/// yt-dlp's message when YouTube wants proof the client is not a bot.
pub const BOT_CHECK_SIGNATURE: &str = "Sign in to confirm you";

const RESOLVE_FORMAT: &str =
    "(mp4/best)[vcodec!=av01][vcodec!=vp9.2][height<=?1080][height>=?64][width>=?64][protocol^=http]";
const RESOLVE_FORMAT_AVPRO: &str = "(mp4/best)[height<=?1080][height>=?64][width>=?64]";
const DOWNLOAD_FORMAT_MP4: &str = "bv*[height<=1080][vcodec~='^(avc|h264)']+ba[ext=m4a]/bv*[height<=1080][vcodec!=av01][vcodec!=vp9.2][protocol^=http]";
const DOWNLOAD_FORMAT_WEBM: &str =
    "bv*[height<=1080][vcodec~='^(vp9|vp09)']+ba[ext=webm]/bv*[height<=1080][vcodec!=av01]+ba";
const IMPERSONATE: &str = "--impersonate=safari";
const PLAYER_CLIENT: &str = "--extractor-args=youtube:player_client=web";

#[derive(Debug, Clone)]
pub struct Ytdl {
    path: PathBuf,
    additional_args: Vec<String>,
    cookies: Option<PathBuf>,
    dub_language: Option<String>,
}

impl Ytdl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            additional_args: Vec::new(),
            cookies: None,
            dub_language: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let dub_language = Some(config.ytdl_dub_language.trim())
            .filter(|lang| !lang.is_empty())
            .map(str::to_string);
        Self {
            path: config.ytdl_path.clone(),
            additional_args: config.additional_args(),
            cookies: config.cookies_file(),
            dub_language,
        }
    }

    pub fn with_cookies(mut self, cookies: impl Into<PathBuf>) -> Self {
        self.cookies = Some(cookies.into());
        self
    }

    /// Arguments for `--get-url`. Cookies are only sent to YouTube.
    pub fn resolve_args(&self, url: &str, category: Category, avpro: bool) -> Vec<String> {
        let youtube = category == Category::YouTube;
        let base = if avpro { RESOLVE_FORMAT_AVPRO } else { RESOLVE_FORMAT };
        let format = match &self.dub_language {
            Some(lang) => format!("{base}[language={lang}]/{base}"),
            None => base.to_string(),
        };

        let mut args = vec![
            "--encoding".to_string(),
            "utf-8".to_string(),
            "-f".to_string(),
            format,
        ];
        if avpro && youtube {
            args.push(IMPERSONATE.to_string());
            args.push(PLAYER_CLIENT.to_string());
        }
        args.push("--no-playlist".to_string());
        args.push("--no-warnings".to_string());
        if youtube {
            self.push_cookies(&mut args);
        }
        args.extend(self.additional_args.iter().cloned());
        args.push("--get-url".to_string());
        args.push(url.to_string());
        args
    }

    pub fn probe_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--encoding".to_string(),
            "utf-8".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        self.push_cookies(&mut args);
        args.extend(self.additional_args.iter().cloned());
        args.push("-j".to_string());
        args.push(url.to_string());
        args
    }

    pub fn download_args(&self, output: &Path, video_id: &str, format: VideoFormat) -> Vec<String> {
        let mut args = vec![
            "-q".to_string(),
            "-o".to_string(),
            output.display().to_string(),
            "-f".to_string(),
        ];
        match format {
            VideoFormat::Mp4 => args.push(DOWNLOAD_FORMAT_MP4.to_string()),
            VideoFormat::Webm => {
                args.push(DOWNLOAD_FORMAT_WEBM.to_string());
                args.push(IMPERSONATE.to_string());
                args.push(PLAYER_CLIENT.to_string());
            }
        }
        args.push("--no-playlist".to_string());
        args.push("--remux-video".to_string());
        args.push(format.extension().to_string());
        args.push("--no-progress".to_string());
        self.push_cookies(&mut args);
        args.extend(self.additional_args.iter().cloned());
        args.push("--".to_string());
        args.push(video_id.to_string());
        args
    }

    fn push_cookies(&self, args: &mut Vec<String>) {
        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
    }

    /// Starts yt-dlp with piped output. The child is killed if dropped.
    pub fn spawn(&self, args: &[String]) -> std::io::Result<RunningTool> {
        let mut child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        Ok(RunningTool {
            child,
            stdout,
            stderr,
        })
    }

    /// Runs yt-dlp to completion.
    pub async fn run(&self, args: &[String]) -> std::io::Result<ToolOutput> {
        let mut running = self.spawn(args)?;
        let status = running.child.wait().await?;
        Ok(running.finish(status).await)
    }
}

/// A spawned yt-dlp process whose output is being collected in the background.
pub struct RunningTool {
    pub child: Child,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl RunningTool {
    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "Failed to kill yt-dlp process");
        }
    }

    pub async fn finish(self, status: ExitStatus) -> ToolOutput {
        ToolOutput {
            status,
            stdout: self.stdout.await.unwrap_or_default(),
            stderr: self.stderr.await.unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn hit_bot_check(&self) -> bool {
        self.stderr.contains(BOT_CHECK_SIGNATURE) || self.stdout.contains(BOT_CHECK_SIGNATURE)
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut raw = Vec::new();
            if pipe.read_to_end(&mut raw).await.is_ok() {
                text = String::from_utf8_lossy(&raw).into_owned();
            }
        }
        text
    })
}
