mod commands;
mod downloader;
mod error;
mod plan;
mod probe;
mod progress;
mod utils;

#[cfg(test)]
mod test_server;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::HumanBytes;
use log::{debug, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::commands::{DownloadOptions, DownloadReport};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the resource to download
    #[arg(index = 1)]
    url: Url,

    /// Number of concurrent connections, each fetching one segment
    #[arg(short = 'n', long = "connections", default_value_t = 1)]
    connections: usize,

    /// Directory to save the downloaded file
    #[arg(short = 'd', long = "dir", default_value = ".")]
    download_dir: PathBuf,

    /// TCP connect timeout in seconds
    #[arg(long = "connect-timeout", default_value_t = 10)]
    connect_timeout: u64,
}

impl From<&Args> for DownloadOptions {
    fn from(args: &Args) -> Self {
        Self {
            connections: args.connections.max(1),
            output_dir: args.download_dir.clone(),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        println!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fdm/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(args.connect_timeout))
            .build()
            .context("failed to build HTTP client")?;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => {
                    warn!("termination requested, cancelling download");
                    trigger.cancel();
                }
                Err(e) => warn!("signal handling unavailable: {:#}", e),
            }
        });

        let options = DownloadOptions::from(&args);
        let report = crate::commands::run_download(&client, &args.url, &options, &cancel)
            .await
            .with_context(|| format!("failed to download {}", args.url))?;

        debug!(
            "final status after {:.2?}:\n{}",
            report.elapsed,
            report.progress.render()
        );
        println!("{}", saved_message(&report));
        Ok(())
    })
}

/// Last line of a successful run; the aggregator has already printed the timing.
fn saved_message(report: &DownloadReport) -> String {
    format!(
        "Saved {} ({}, {} segments)",
        report.path.display(),
        HumanBytes(report.bytes_written),
        report.segments
    )
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    #[cfg(unix)]
    {
        let mut term = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        let mut hup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
        tokio::select! {
            res = &mut ctrl_c => res.context("failed to listen for ctrl-c")?,
            _ = term.recv() => {},
            _ = hup.recv() => {},
        }
        return Ok(());
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for ctrl-c")
    }
}
