mod batch;
mod cli;
mod config;
mod delivery;
mod error;
mod server;
mod store;
mod stream;
mod supervisor;
mod transcripts;
mod ui;

use std::path::Path;
use std::pin::pin;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use batch::{Batch, BatchRunner, JobFile};
use cli::{Cli, Command, LogsCommand};
use config::BenchConfig;
use delivery::HttpCollector;
use stream::{Transcript, event_stream};
use transcripts::TranscriptDir;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, matches!(cli.command, Command::Serve { .. }));

    let config = BenchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            server::serve(config, &bind).await
        }
        Command::Run {
            file,
            batch,
            device,
            verbosity,
            no_upload,
        } => {
            let mut jobs = JobFile::load(&file)
                .with_context(|| format!("failed to read jobs from {}", file.display()))?;
            jobs.batch = batch.or(jobs.batch);
            jobs.device = device.or(jobs.device);
            jobs.verbosity = verbosity.or(jobs.verbosity);
            run_batch(&config, jobs, no_upload).await
        }
        Command::Logs { command } => logs(&config.logs_dir, command),
        Command::Tasks => {
            let mut tasks = server::POPULAR_TASKS.to_vec();
            tasks.sort_unstable();
            for task in tasks {
                println!("{task}");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, serving: bool) {
    let default = match (verbose, serving) {
        (true, _) => "pocketbench=debug",
        (false, true) => "pocketbench=info",
        (false, false) => "warn",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

/// Runs a batch in the foreground, mirroring the stream to the terminal.
async fn run_batch(config: &BenchConfig, jobs: JobFile, no_upload: bool) -> Result<()> {
    let (jobs, params) = jobs.into_parts()?;
    let batch = Batch::new(jobs, params);
    let total = batch.jobs().len();
    let transcript = Transcript::open(&config.logs_dir, &batch.transcript_name())?;
    info!(path = %transcript.path().display(), "writing transcript");

    let mut runner: BatchRunner<HttpCollector> = BatchRunner::from_config(config);
    if !no_upload {
        if let Some(collector) = HttpCollector::from_config(&config.collector)? {
            info!(collector = %collector.endpoint(), "results will be delivered");
            runner = runner.with_collector(collector);
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping batch");
            interrupt.cancel();
        }
    });

    let progress = ui::BatchProgress::start(total);
    let mut messages = pin!(event_stream(runner.run(batch, cancel), transcript));
    let mut saved = 0;
    while let Some(msg) = messages.next().await {
        if msg.path.is_some() {
            saved += 1;
        }
        progress.show(&msg);
    }
    progress.finish(saved, total);
    Ok(())
}

fn logs(logs_dir: &Path, command: LogsCommand) -> Result<()> {
    let dir = TranscriptDir::new(logs_dir);
    match command {
        LogsCommand::List => {
            for entry in dir.list()? {
                println!("{}  {:>10}  {}", entry.date, entry.size, entry.filename);
            }
        }
        LogsCommand::Show { filename } => {
            print!("{}", dir.read(&filename)?);
        }
        LogsCommand::Delete { filename } => {
            dir.delete(&filename)?;
            println!("Deleted {filename}");
        }
    }
    Ok(())
}
