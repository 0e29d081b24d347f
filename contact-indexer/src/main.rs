use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use contact_indexer::{exit_code, Dependencies, IndexingError, Settings};
use contact_indexer_pipeline::JsonLinesSource;
use contact_indexer_shared::RunStatus;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "contact-indexer")]
#[command(about = "Archive and bulk-index a JSON-lines file of contact records", long_about = None)]
struct Cli {
    /// JSON-lines file to ingest
    input: PathBuf,

    /// Write the run report to this file instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,

    /// Records per batch (overrides INGEST_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Worker pool multiplier (overrides INGEST_WORKER_MULTIPLIER)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(e) => {
            error!(error = %e, "Contact indexer failed");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> Result<RunStatus, IndexingError> {
    let mut settings = Settings::from_env()?;
    if let Some(batch_size) = cli.batch_size {
        settings.pipeline.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        settings.pipeline.worker_multiplier = workers;
    }

    let source = JsonLinesSource::open(&cli.input).await?;
    let deps = Dependencies::new(&settings).await?;

    let cancel = deps.coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling run");
            cancel.cancel();
        }
    });

    info!(input = %cli.input.display(), "Starting contact indexer");
    let report = deps.coordinator.run(source).await;

    let elapsed = report.ended_at - report.started_at;
    info!(
        run_id = %report.run_id,
        status = ?report.status,
        elapsed_ms = elapsed.num_milliseconds(),
        dead_letters = report.dead_letters.len(),
        "Run complete"
    );

    let json = serde_json::to_string_pretty(&report)?;
    match &cli.report {
        Some(path) => {
            tokio::fs::write(path, json).await?;
            info!(path = %path.display(), "Run report written");
        }
        None => println!("{json}"),
    }

    Ok(report.status)
}
