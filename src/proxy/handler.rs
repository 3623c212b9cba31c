use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use url::form_urlencoded;

use super::{serve_cached_file, ProxyBody};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::download::{DownloadJob, DownloadQueue};
use crate::identity::{Category, IdentityResolver};
use crate::ytdl::UrlResolver;

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: Arc<Config>,
    pub identities: IdentityResolver,
    pub store: Arc<CacheStore>,
    pub resolver: UrlResolver,
    pub queue: Arc<DownloadQueue>,
}

pub type SharedState = Arc<AppState>;

pub async fn handle_request(
    req: Request<Incoming>,
    state: SharedState,
    semaphore: Arc<Semaphore>,
) -> Result<Response<ProxyBody>, Infallible> {
    let Ok(_permit) = semaphore.acquire().await else {
        return Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, "shutting down"));
    };

    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Ok(text_response(StatusCode::METHOD_NOT_ALLOWED, ""));
    }

    let path = req.uri().path();
    if path == "/api/getvideo" {
        // Only GET may resolve and queue.
        if req.method() != Method::GET {
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "");
            response.headers_mut().insert(ALLOW, HeaderValue::from_static("GET"));
            return Ok(response);
        }
        let query = GetVideoQuery::parse(req.uri().query().unwrap_or_default());
        let Some(url) = query.url else {
            return Ok(text_response(StatusCode::BAD_REQUEST, "missing url parameter"));
        };
        return Ok(get_video(&state, &url, query.avpro).await);
    }

    let file_name = path.trim_start_matches('/');
    Ok(serve_cached_file(&state.store, file_name, req.headers()).await)
}

#[derive(Debug, Default, PartialEq)]
pub struct GetVideoQuery {
    pub url: Option<String>,
    pub avpro: bool,
}

impl GetVideoQuery {
    pub fn parse(query: &str) -> Self {
        let mut parsed = GetVideoQuery::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "url" => parsed.url = Some(value.into_owned()),
                "avpro" => parsed.avpro = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }
        parsed
    }
}

/// `GET /api/getvideo`: answers with a playable URL as plain text.
///
/// Cache hits return the local file URL. Misses are resolved through yt-dlp
/// and queued for download after the answer is built.
pub async fn get_video(state: &AppState, raw_url: &str, avpro: bool) -> Response<ProxyBody> {
    let url = raw_url.trim();
    let config = &state.config;

    if config.is_blocked(url) {
        info!(url, "URL is blocked, answering with placeholder");
        return text_response(StatusCode::OK, config.blocked_placeholder_url.clone());
    }

    let identity = match state.identities.classify(url, avpro).await {
        Ok(identity) => Some(identity),
        Err(e) => {
            info!(url, error = %e, "Failed to get video info, bypassing cache");
            None
        }
    };

    if let Some(identity) = &identity {
        if let Some(file_name) = state.store.is_cached(&identity.stable_id, identity.format).await {
            if let Err(e) = state.store.touch(&file_name).await {
                warn!(file = %file_name, error = %e, "Failed to refresh cached file time");
            }
            let cached_url = config.cached_file_url(&file_name);
            info!(url = %cached_url, "Responding with cached URL");
            return text_response(StatusCode::OK, cached_url);
        }
    }

    let will_cache = identity.is_some() && !config.bypasses_cache(url);
    let (source_url, category) = match &identity {
        Some(identity) => (identity.source_url.as_str(), identity.category),
        None => (url, state.identities.category_of(url)),
    };

    match state.resolver.resolve(source_url, category, avpro).await {
        Ok(resolved) => {
            info!(url = %resolved, "Responding with URL");
            if let Some(identity) = identity.filter(|_| will_cache) {
                state.queue.enqueue(DownloadJob::new(identity, avpro));
            }
            text_response(StatusCode::OK, resolved)
        }
        Err(e) if category == Category::YouTube => {
            warn!(url, error = %e, "Failed to resolve YouTube URL");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, e.diagnostic())
        }
        Err(e) => {
            warn!(url, error = %e, "Failed to resolve URL, client falls back to the original");
            text_response(StatusCode::OK, String::new())
        }
    }
}

pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<ProxyBody> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub(crate) fn full(body: impl Into<Bytes>) -> ProxyBody {
    Full::new(body.into()).map_err(|never| match never {}).boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_decodes_url_and_flag() {
        let query = GetVideoQuery::parse("url=https%3A%2F%2Fyoutu.be%2FGoSo8YOKSAE%3Ft%3D1&avpro=True");
        assert_eq!(query.url.as_deref(), Some("https://youtu.be/GoSo8YOKSAE?t=1"));
        assert!(query.avpro);

        let query = GetVideoQuery::parse("avpro=false");
        assert_eq!(query, GetVideoQuery::default());
    }
}
