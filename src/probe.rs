//! The initial, unranged request that discovers what is being downloaded.

use log::{info, warn};
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH};
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{DownloadError, Result};
use crate::utils::{get_filename_from_content_disposition, get_filename_from_url, sanitize_filename};

/// What the server told us about the resource.
///
/// `response` is the still-unread body of the probe request; it becomes the
/// byte source of the first segment.
#[derive(Debug)]
pub struct Metadata {
    pub filename: String,
    pub total_size: Option<u64>,
    pub accepts_ranges: bool,
    pub response: Response,
}

pub async fn probe(client: &Client, url: &Url, cancel: &CancellationToken) -> Result<Metadata> {
    let request = client.get(url.clone());
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        response = request.send() => response?,
    };

    if !response.status().is_success() {
        return Err(DownloadError::ProbeStatus {
            status: response.status(),
        });
    }

    let headers = response.headers();
    let filename = suggested_filename(headers, url);
    let total_size = content_length(headers);
    let ranges = accepts_ranges(headers);
    let metadata = Metadata {
        filename,
        total_size,
        accepts_ranges: ranges,
        response,
    };
    info!(
        "probed {}: name={} size={:?} ranges={}",
        url, metadata.filename, metadata.total_size, metadata.accepts_ranges
    );
    Ok(metadata)
}

/// `Content-Length` as a number; absent or garbled means unknown.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_LENGTH)?;
    match value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(len) => Some(len),
        None => {
            warn!("ignoring unparseable content-length {:?}", value);
            None
        }
    }
}

pub fn accepts_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .is_some_and(|v| !v.is_empty() && !v.eq_ignore_ascii_case("none"))
}

pub fn suggested_filename(headers: &HeaderMap, url: &Url) -> String {
    let hinted = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(get_filename_from_content_disposition);
    let name = match hinted {
        Some(name) => name,
        None => {
            warn!("no filename hint from server, using url path");
            get_filename_from_url(url)
        }
    };
    sanitize_filename(&name)
}
