use std::fmt;
use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the download engine.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("unable to retrieve file size: {0}")]
    SizeUnavailable(String),

    #[error("segment {index} failed: {source}")]
    SegmentFetch {
        index: usize,
        #[source]
        source: SegmentFailure,
    },

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DownloadError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DownloadError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn segment(index: usize, source: SegmentFailure) -> Self {
        DownloadError::SegmentFetch { index, source }
    }
}

/// Why a single segment could not be fetched.
#[derive(Error, Debug)]
pub enum SegmentFailure {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("stream ended after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("server sent more than the {expected} requested bytes")]
    Overflow { expected: u64 },

    #[error("writing part file failed: {0}")]
    Write(#[from] io::Error),

    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// The phase of a job in which it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Probe,
    Fetch,
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Probe => "size probe",
            Stage::Fetch => "fetch",
            Stage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// A failed job: the stage it stopped in and the underlying cause.
#[derive(Error, Debug)]
#[error("{stage} failed")]
pub struct JobError {
    pub stage: Stage,
    #[source]
    pub source: DownloadError,
}

impl JobError {
    pub fn new(stage: Stage, source: DownloadError) -> Self {
        Self { stage, source }
    }
}
