use indicatif::HumanBytes;
use log::info;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::downloader::{download_segment, download_whole, ByteSource};
use crate::error::Result;
use crate::plan::{plan, DownloadPlan};
use crate::probe::probe;
use crate::progress::{self, status_bar, ProgressAggregator, ProgressSender, ProgressTable};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Requested number of concurrent segments, at least 1.
    pub connections: usize,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub segments: usize,
    pub elapsed: Duration,
    /// Last state shown by the status display.
    pub progress: ProgressTable,
}

/// Probes `url`, then downloads it over one or more connections into `options.output_dir`.
///
/// The first error from any segment aborts the whole download; the output file
/// is left as it is.
pub async fn run_download(
    client: &Client,
    url: &Url,
    options: &DownloadOptions,
    cancel: &CancellationToken,
) -> Result<DownloadReport> {
    let started = Instant::now();
    println!("Fetching metadata...");
    let meta = probe(client, url, cancel).await?;

    if !options.output_dir.exists() {
        fs::create_dir_all(&options.output_dir).await?;
    }
    let path = options.output_dir.join(&meta.filename);
    println!(
        "Downloading {}: {}",
        meta.filename,
        HumanBytes(meta.total_size.unwrap_or(0))
    );

    let segment_plan = match meta.total_size {
        Some(size) if size > 0 && meta.accepts_ranges => {
            // No point in more connections than bytes.
            let connections = usize::try_from(size)
                .map_or(options.connections, |size| options.connections.min(size))
                .max(1);
            (connections > 1).then(|| plan(size, connections))
        }
        _ => None,
    };
    let segments = segment_plan.as_ref().map_or(1, |p| p.segments.len());

    // Ready before any worker can send.
    let (tx, rx) = progress::channel();
    let aggregator = ProgressAggregator::new(segments, status_bar(), started).spawn(rx);

    let result = match segment_plan {
        Some(plan) => download_segments(client, url, plan, meta.response, &path, tx, cancel).await,
        None => {
            info!("downloading {} over a single connection", url);
            download_whole(meta.response, &path, tx, cancel).await
        }
    };
    let bytes_written = match result {
        Ok(written) => written,
        Err(e) => {
            aggregator.abort();
            return Err(e);
        }
    };

    // Every sender is gone now, so the aggregator drains and finishes.
    let progress = aggregator.await?;
    Ok(DownloadReport {
        path,
        bytes_written,
        segments,
        elapsed: started.elapsed(),
        progress,
    })
}

/// Runs one task per segment; the first segment reuses the probe response.
async fn download_segments(
    client: &Client,
    url: &Url,
    plan: DownloadPlan,
    first: Response,
    path: &Path,
    progress: ProgressSender,
    cancel: &CancellationToken,
) -> Result<u64> {
    info!(
        "splitting {} bytes into {} segments",
        plan.total_size,
        plan.segments.len()
    );

    let mut workers = JoinSet::new();
    let mut first = Some(first);
    for segment in plan.segments {
        let source = match first.take() {
            Some(response) => ByteSource::Open(response),
            None => ByteSource::Ranged {
                client: client.clone(),
                url: url.clone(),
            },
        };
        let path = path.to_path_buf();
        let progress = progress.clone();
        let cancel = cancel.clone();
        workers.spawn(async move { download_segment(segment, source, &path, progress, &cancel).await });
    }
    drop(progress);

    // Returning early drops the set, which aborts the remaining workers.
    let mut written = 0;
    while let Some(joined) = workers.join_next().await {
        written += joined??;
    }
    Ok(written)
}
