//! # fastfetch
//!
//! Segmented HTTP downloader. A resource is probed for its length, split
//! into byte ranges fetched concurrently into `.part<N>` files, and the parts
//! are concatenated into the final file once every range has arrived.
//!
//! Part files double as the resume checkpoint: with resume enabled a worker
//! requests only the bytes past the current size of its part file.

pub mod downloader;
pub mod error;
pub mod merger;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod reporter;
pub mod state;
pub mod utils;
pub mod worker;

pub use downloader::{DownloadReport, Downloader, DownloaderOptions};
pub use error::{DownloadError, JobError, SegmentFailure, Stage};
pub use state::{DownloadPlan, DownloadTask, JobState, Segment};
