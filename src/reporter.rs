use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::progress::Progress;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

const MIB: f64 = 1024.0 * 1024.0;

pub fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(5));
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message("Speed: 0.00 MiB/s");
    pb
}

pub fn mib_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 / secs / MIB
}

/// Samples the shared counters on a fixed cadence and renders throughput.
pub struct SpeedReporter {
    progress: Arc<Progress>,
    bar: ProgressBar,
    interval: Duration,
}

impl SpeedReporter {
    pub fn new(progress: Arc<Progress>, bar: ProgressBar, interval: Duration) -> Self {
        Self { progress, bar, interval }
    }

    pub fn spawn(self, stop: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(stop))
    }

    /// Runs until the aggregate reaches the known total or `stop` fires.
    /// Returns the last sampled byte count.
    ///
    /// The rate only counts bytes fetched over the network; bytes recovered
    /// from part files move the position but never show up as speed.
    pub async fn run(self, stop: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut previous_fetched = self.progress.fetched();
        let mut sampled_at = Instant::now();
        self.bar.set_position(self.progress.downloaded());

        while !self.progress.is_complete() {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = self.progress.fetched();
            let rate = mib_per_sec(fetched.saturating_sub(previous_fetched), sampled_at.elapsed());
            sampled_at = Instant::now();
            previous_fetched = fetched;

            self.bar.set_position(self.progress.downloaded());
            self.bar.set_message(format!("Speed: {:.2} MiB/s", rate));
        }

        let downloaded = self.progress.downloaded();
        debug!(downloaded, "speed reporter stopped");
        downloaded
    }
}
