use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::DownloadError;
use crate::utils::part_path;

/// A download job as configured by the caller.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: Url,
    pub output: PathBuf,
    pub threads: usize,
    pub resume: bool,
}

impl DownloadTask {
    pub fn new(url: &str, output: PathBuf, threads: usize, resume: bool) -> Result<Self, DownloadError> {
        let url = Url::parse(url).map_err(|e| DownloadError::InvalidConfig(format!("invalid url {url}: {e}")))?;
        if threads == 0 {
            return Err(DownloadError::InvalidConfig("thread count must be at least 1".into()));
        }
        if output.file_name().is_none() {
            return Err(DownloadError::InvalidConfig(format!(
                "output path {} has no file name",
                output.display()
            )));
        }

        Ok(Self {
            url,
            output,
            threads,
            resume,
        })
    }

    pub fn output_dir(&self) -> &Path {
        self.output.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn part_path(&self, index: usize) -> PathBuf {
        part_path(&self.output, index)
    }
}

/// One planned byte range. `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub part_path: PathBuf,
}

impl Segment {
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// A task whose size has been probed and whose segments are fixed.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub total_size: u64,
    pub segments: Vec<Segment>,
}

impl DownloadPlan {
    pub fn part_paths(&self) -> Vec<PathBuf> {
        self.segments.iter().map(|s| s.part_path.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    SizeProbed,
    Planned,
    Downloading,
    Merging,
    Done,
    Failed,
}

impl JobState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Init, SizeProbed)
                | (SizeProbed, Planned)
                | (Planned, Downloading)
                | (Downloading, Merging)
                | (Merging, Done)
                | (Init, Failed)
                | (Downloading, Failed)
                | (Merging, Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
