use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DownloadError, JobError, SegmentFailure, Stage};
use crate::merger::merge_parts;
use crate::planner::plan_segments;
use crate::probe::probe_size;
use crate::progress::Progress;
use crate::reporter::{progress_bar, SpeedReporter, REPORT_INTERVAL};
use crate::state::{DownloadPlan, DownloadTask, JobState};
use crate::worker::{fetch_segment, rate_limiter, ArcRateLimiter, FetchContext};

#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    /// Global throughput cap in bytes per second, shared by all workers.
    pub rate_limit: Option<u32>,
    pub show_progress: bool,
    pub report_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            rate_limit: None,
            show_progress: true,
            report_interval: REPORT_INTERVAL,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of a successful job.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub total_size: u64,
    pub segments: usize,
    /// Bytes fetched over the network by this run (excludes resumed bytes).
    pub fetched: u64,
}

pub struct Downloader {
    client: Client,
    rate_limiter: Option<ArcRateLimiter>,
    options: DownloaderOptions,
}

struct Job {
    state: JobState,
}

impl Job {
    fn new() -> Self {
        Self { state: JobState::Init }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(self.state.can_advance_to(next), "illegal transition {} -> {}", self.state, next);
        debug!(from = %self.state, to = %next, "job state");
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, source: DownloadError) -> JobError {
        self.advance(JobState::Failed);
        error!(%stage, error = %source, "download failed");
        JobError::new(stage, source)
    }
}

impl Downloader {
    pub fn new(options: DownloaderOptions) -> Self {
        let client = Client::builder()
            .user_agent(concat!("fastfetch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(options.connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        let rate_limiter = options.rate_limit.and_then(rate_limiter);
        Self {
            client,
            rate_limiter,
            options,
        }
    }

    pub fn plan(&self, task: &DownloadTask, total_size: u64) -> DownloadPlan {
        let segments = plan_segments(total_size, task.threads, |i| task.part_path(i));
        DownloadPlan {
            total_size,
            segments,
        }
    }

    /// Runs a job to completion: probe, plan, fetch every segment, merge.
    ///
    /// Part files are left on disk whenever the job fails so it can be
    /// resumed later. Firing `cancel` stops all workers and fails the job.
    pub async fn download(&self, task: &DownloadTask, cancel: CancellationToken) -> Result<DownloadReport, JobError> {
        let mut job = Job::new();

        let dir = task.output_dir();
        if let Err(e) = fs::create_dir_all(dir).await {
            return Err(job.fail(Stage::Setup, DownloadError::fs(dir, e)));
        }

        let total_size = match probe_size(&self.client, &task.url).await {
            Ok(size) => size,
            Err(e) => return Err(job.fail(Stage::Probe, e)),
        };
        job.advance(JobState::SizeProbed);

        let plan = self.plan(task, total_size);
        job.advance(JobState::Planned);
        info!(url = %task.url, total_size, segments = plan.segments.len(), resume = task.resume, "download planned");

        job.advance(JobState::Downloading);
        let progress = Arc::new(Progress::new(plan.segments.len(), total_size));
        let bar = progress_bar(total_size, self.options.show_progress);
        let reporter_stop = cancel.child_token();
        let reporter = SpeedReporter::new(progress.clone(), bar.clone(), self.options.report_interval).spawn(reporter_stop.clone());

        let ctx = FetchContext {
            client: self.client.clone(),
            url: task.url.clone(),
            total_size,
            resume: task.resume,
            progress: progress.clone(),
            rate_limiter: self.rate_limiter.clone(),
            cancel: cancel.clone(),
        };

        let mut handles = Vec::with_capacity(plan.segments.len());
        for segment in plan.segments.iter().cloned() {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move { fetch_segment(&ctx, &segment).await }));
        }

        // Siblings keep running after a failure; all of them are joined
        // before anything else happens.
        let mut fetched = 0u64;
        let mut first_error = None;
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(DownloadError::segment(index, SegmentFailure::Aborted(e.to_string()))),
            };
            match result {
                Ok(received) => fetched += received,
                Err(e) => {
                    warn!(index, error = %e, "segment did not complete");
                    first_error.get_or_insert(e);
                }
            }
        }

        reporter_stop.cancel();
        if let Err(e) = reporter.await {
            warn!(error = %e, "speed reporter panicked");
        }

        if let Some(e) = first_error {
            bar.abandon();
            return Err(job.fail(Stage::Fetch, e));
        }
        bar.finish_with_message("Download finished");

        job.advance(JobState::Merging);
        if let Err(e) = merge_parts(&plan.part_paths(), &task.output).await {
            return Err(job.fail(Stage::Merge, e));
        }
        job.advance(JobState::Done);

        Ok(DownloadReport {
            path: task.output.clone(),
            total_size,
            segments: plan.segments.len(),
            fetched,
        })
    }
}
