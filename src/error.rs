//! Error type shared by every stage of a download.
//!
//! Any of these aborts the whole run; nothing is retried per segment.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    /// Request could not be built or the transport failed.
    #[error("could not do request: {0}")]
    Http(#[from] reqwest::Error),

    /// The metadata request itself was refused.
    #[error("metadata request: server answered {status}")]
    ProbeStatus { status: reqwest::StatusCode },

    #[error("segment {segment}: server answered {status}")]
    Status {
        segment: usize,
        status: reqwest::StatusCode,
    },

    /// The server replied with the full body to a ranged request.
    #[error("segment {segment}: server ignored the range request")]
    RangeIgnored { segment: usize },

    #[error("segment {segment}: server announced {announced} bytes, expected {expected}")]
    LengthMismatch {
        segment: usize,
        announced: u64,
        expected: u64,
    },

    #[error("segment {segment}: stream ended after {received} of {expected} bytes")]
    Truncated {
        segment: usize,
        received: u64,
        expected: u64,
    },

    #[error("could not write to file: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
