use anyhow::{Context, Result};
use clap::Parser;
use reddit_ingest::{init_tracing_once, load_config, IngestOptions, SubredditIngest};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser)]
#[command(name = "reddit-ingest")]
#[command(about = "Append new posts and comments of one subreddit to a CSV table on a fixed interval")]
#[command(version)]
struct Cli {
    /// TOML config file with an [ingest] table
    #[arg(short, long, env = "INGEST_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Run a single pass and exit with its outcome
    #[arg(long)]
    once: bool,

    /// Override the configured interval between passes, in seconds
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Show a progress bar while walking
    #[arg(long)]
    progress: bool,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing_once();

    match run() {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let file = load_config(&cli.config).context("loading ingest configuration")?;

    let mut opts = IngestOptions::default().merge_file(&file).with_progress(cli.progress);
    if let Some(secs) = cli.interval_secs {
        opts = opts.with_interval(Duration::from_secs(secs));
    }
    let ingest = SubredditIngest::from_options(opts);

    if cli.once {
        return Ok(if pass(&ingest) { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let every = ingest.options().interval;
    tracing::info!(interval_secs = every.as_secs(), "scheduler started; interrupt to stop");
    loop {
        let started = Instant::now();
        pass(&ingest);
        std::thread::sleep(every.saturating_sub(started.elapsed()));
    }
}

/// One scheduled tick. A failed run is logged and retried on the next tick.
fn pass(ingest: &SubredditIngest) -> bool {
    tracing::info!("starting ingestion pass");
    match ingest.run_once() {
        Ok(report) => {
            tracing::info!(
                subreddit = %report.subreddit,
                posts = report.new_posts,
                comments = report.new_comments,
                ledger = report.ledger_size,
                rate_waits = report.rate_waits,
                output = %report.output.display(),
                "ingestion pass completed"
            );
            true
        }
        Err(failure) => {
            tracing::warn!(stage = %failure.stage, "ingestion pass failed; will retry next tick");
            false
        }
    }
}
