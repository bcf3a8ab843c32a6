mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use fastfetch::{Downloader, Stage};
use indicatif::HumanBytes;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{print_banner, Args};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    if !args.no_banner {
        print_banner();
    }

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|rt| rt.block_on(run(args)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Download failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let task = args.to_task()?;
    let downloader = Downloader::new(args.options());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("Downloading to: {}\n", task.output.display());

    match downloader.download(&task, cancel).await {
        Ok(report) => {
            println!(
                "Download completed successfully: {} ({})",
                report.path.display(),
                HumanBytes(report.total_size)
            );
            Ok(())
        }
        Err(e) => {
            if e.stage == Stage::Fetch {
                eprintln!("Part files were kept; rerun with --resume to continue.");
            }
            Err(e.into())
        }
    }
}
