use futures::{Stream, StreamExt};
use log::debug;
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{DownloadError, Result};
use crate::plan::Segment;
use crate::probe::content_length;
use crate::progress::{ProgressEvent, ProgressSender};

/// Where a segment's bytes come from.
pub enum ByteSource {
    /// A response whose body starts at the segment's first byte, e.g. the probe.
    Open(Response),
    /// Issue a fresh ranged GET for the segment.
    Ranged { client: Client, url: Url },
}

/// Downloads one segment into `path` at `segment.start`.
///
/// Exactly `segment.len()` bytes are written; a short stream is an error and
/// anything past the segment end is left unread. Each worker opens its own
/// handle, and segments never overlap, so no file lock is needed.
pub async fn download_segment(
    segment: Segment,
    source: ByteSource,
    path: &Path,
    progress: ProgressSender,
    cancel: &CancellationToken,
) -> Result<u64> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadError::Cancelled),
        written = fetch_segment(segment, source, path, &progress) => written,
    }
}

async fn fetch_segment(
    segment: Segment,
    source: ByteSource,
    path: &Path,
    progress: &ProgressSender,
) -> Result<u64> {
    if segment.is_empty() {
        report(progress, segment.id, 0, 0).await;
        return Ok(0);
    }

    let response = match source {
        ByteSource::Open(response) => response,
        ByteSource::Ranged { client, url } => ranged_request(&client, &url, &segment).await?,
    };

    let written = copy_stream(
        response.bytes_stream(),
        path,
        segment.id,
        segment.start,
        Some(segment.len()),
        progress,
    )
    .await?;
    debug!("segment {} done, {} bytes", segment.id, written);
    Ok(written)
}

async fn ranged_request(client: &Client, url: &Url, segment: &Segment) -> Result<Response> {
    debug!("segment {} requesting {}", segment.id, segment.range_header());
    let response = client
        .get(url.clone())
        .header(RANGE, segment.range_header())
        .send()
        .await?;

    match response.status() {
        StatusCode::PARTIAL_CONTENT => {}
        StatusCode::OK => return Err(DownloadError::RangeIgnored { segment: segment.id }),
        status => {
            return Err(DownloadError::Status {
                segment: segment.id,
                status,
            })
        }
    }

    let announced = content_length(response.headers())
        .filter(|len| *len > 0)
        .unwrap_or_else(|| segment.len());
    if announced != segment.len() {
        return Err(DownloadError::LengthMismatch {
            segment: segment.id,
            announced,
            expected: segment.len(),
        });
    }
    Ok(response)
}

/// Downloads a whole body as segment 1, used when ranged concurrency is unavailable.
///
/// With no usable content-length the body is copied until the server closes it.
pub async fn download_whole(
    response: Response,
    path: &Path,
    progress: ProgressSender,
    cancel: &CancellationToken,
) -> Result<u64> {
    let expected = content_length(response.headers());
    let copy = copy_stream(response.bytes_stream(), path, 1, 0, expected, &progress);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadError::Cancelled),
        written = copy => written,
    }
}

/// Writes `stream` into `path` starting at `start`, reporting after every chunk.
///
/// With `expected` set, stops after that many bytes and fails if the stream
/// ends first.
async fn copy_stream<S, B, E>(
    stream: S,
    path: &Path,
    segment_id: usize,
    start: u64,
    expected: Option<u64>,
    progress: &ProgressSender,
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    DownloadError: From<E>,
{
    // Never truncate: other workers may already have written their extents.
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await?;
    file.seek(SeekFrom::Start(start)).await?;

    let mut stream = std::pin::pin!(stream);
    let segment_len = expected.unwrap_or(0);
    let mut written: u64 = 0;
    report(progress, segment_id, written, segment_len).await;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        let mut data: &[u8] = chunk.as_ref();
        if let Some(limit) = expected {
            let remaining = usize::try_from(limit - written).unwrap_or(usize::MAX);
            if data.len() > remaining {
                data = &data[..remaining];
            }
        }

        if !data.is_empty() {
            file.write_all(data).await?;
            written += data.len() as u64;
        }
        report(progress, segment_id, written, segment_len).await;

        if expected.is_some_and(|limit| written >= limit) {
            break;
        }
    }
    file.flush().await?;

    match expected {
        Some(limit) if written < limit => Err(DownloadError::Truncated {
            segment: segment_id,
            received: written,
            expected: limit,
        }),
        _ => Ok(written),
    }
}

async fn report(progress: &ProgressSender, segment_id: usize, transferred: u64, segment_len: u64) {
    let event = ProgressEvent {
        segment_id,
        transferred,
        segment_len,
    };
    // The display going away must not stop the transfer.
    if progress.send(event).await.is_err() {
        debug!("progress receiver dropped, segment {} continues", segment_id);
    }
}
