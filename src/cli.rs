use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use fastfetch::utils::{default_output_dir, get_filename_from_url};
use fastfetch::{DownloadTask, DownloaderOptions};
use url::Url;

const BANNER: &str = r"
    ______           __     ______     __       __
   / ____/___ ______/ /_   / ____/__  / /______/ /_
  / /_  / __ `/ ___/ __/  / /_  / _ \/ __/ ___/ __ \
 / __/ / /_/ (__  ) /_   / __/ /  __/ /_/ /__/ / / /
/_/    \__,_/____/\__/  /_/    \___/\__/\___/_/ /_/

    FastFetch multi-threaded downloader
";

/// Multi-threaded HTTP downloader with resumable segments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File URL to download
    pub url: String,

    /// Output directory (default: ~/Downloads/FastFetch_Downloader)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output file name (default: file name from the URL)
    #[arg(short = 'f', long)]
    pub filename: Option<String>,

    /// Number of concurrent segments
    #[arg(short = 't', long, default_value_t = 16, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Resume from existing part files
    #[arg(short = 'r', long)]
    pub resume: bool,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(long)]
    pub rate_limit: Option<u32>,

    /// Hide the live progress line
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Do not print the banner
    #[arg(long)]
    pub no_banner: bool,
}

impl Args {
    pub fn to_task(&self) -> Result<DownloadTask> {
        let dir = match &self.output {
            Some(dir) if dir.is_relative() => std::env::current_dir()?.join(dir),
            Some(dir) => dir.clone(),
            None => default_output_dir(),
        };

        let filename = match &self.filename {
            Some(name) => name.clone(),
            None => get_filename_from_url(&Url::parse(&self.url)?),
        };

        Ok(DownloadTask::new(&self.url, dir.join(filename), self.threads as usize, self.resume)?)
    }

    pub fn options(&self) -> DownloaderOptions {
        DownloaderOptions {
            rate_limit: self.rate_limit,
            show_progress: !self.quiet,
            ..DownloaderOptions::default()
        }
    }
}

pub fn print_banner() {
    println!("{}", BANNER);
}
