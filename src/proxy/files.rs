use futures_util::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use hyper::{Response, StatusCode};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{text_response, ProxyBody, CHUNK_SIZE};
use crate::cache::{is_temp_file, CacheStore};

/// Parses a single `bytes=start-end` or `bytes=start-` range against a file of `len` bytes.
///
/// Returns `Err(())` for ranges that cannot be satisfied.
pub fn parse_range(header: &str, len: u64) -> Option<Result<(u64, u64), ()>> {
    let ranges = header.trim().strip_prefix("bytes=")?;
    let (start, end) = ranges.split_once('-')?;
    let range = if start.is_empty() {
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 || len == 0 {
            return Some(Err(()));
        }
        (len.saturating_sub(suffix), len - 1)
    } else {
        let start: u64 = start.parse().ok()?;
        let end = if end.is_empty() {
            len.saturating_sub(1)
        } else {
            end.parse::<u64>().ok()?.min(len.saturating_sub(1))
        };
        if start >= len || end < start {
            return Some(Err(()));
        }
        (start, end)
    };
    Some(Ok(range))
}

fn content_type(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

fn is_servable(file_name: &str) -> bool {
    !file_name.is_empty()
        && !is_temp_file(file_name)
        && file_name != ".."
        && file_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Serves a file from the cache directory, honoring a single byte range.
pub async fn serve_cached_file(store: &CacheStore, file_name: &str, headers: &HeaderMap) -> Response<ProxyBody> {
    if !is_servable(file_name) {
        return text_response(StatusCode::NOT_FOUND, "not found");
    }
    let path = store.path_of(file_name);
    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(_) => return text_response(StatusCode::NOT_FOUND, "not found"),
    };
    let len = match file.metadata().await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => return text_response(StatusCode::NOT_FOUND, "not found"),
    };

    let range = headers
        .get(RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| parse_range(h, len));

    let (status, start, end) = match range {
        None => (StatusCode::OK, 0, len.saturating_sub(1)),
        Some(Ok((start, end))) => (StatusCode::PARTIAL_CONTENT, start, end),
        Some(Err(())) => {
            let mut response = text_response(StatusCode::RANGE_NOT_SATISFIABLE, "");
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{len}")) {
                response.headers_mut().insert(CONTENT_RANGE, value);
            }
            return response;
        }
    };
    let body_len = if len == 0 { 0 } else { end - start + 1 };

    if start > 0 {
        if let Err(e) = file.seek(SeekFrom::Start(start)).await {
            debug!(file = file_name, error = %e, "Seek failed");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        }
    }
    let stream = ReaderStream::with_capacity(file.take(body_len), CHUNK_SIZE).map_ok(Frame::data);
    let mut response = Response::new(BodyExt::boxed_unsync(StreamBody::new(stream)));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(file_name)));
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    if status == StatusCode::PARTIAL_CONTENT {
        if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{len}")) {
            headers.insert(CONTENT_RANGE, value);
        }
    }
    response
}
