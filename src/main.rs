//! Command-line interface for table-mirror
//!
//! # Usage Examples
//!
//! ```bash
//! # Mirror all mappings, two at a time, recording each run
//! table-mirror run --config mappings.yaml \
//!   --source-uri "host=10.0.0.5 user=mirror password=secret" \
//!   --target-uri "host=10.0.0.6 user=mirror password=secret" \
//!   --parallel 2 --ledger-dir .table-mirror-runs
//!
//! # See what a run would change
//! table-mirror run --config mappings.yaml --dry-run --table public.orders
//!
//! # Show the latest recorded run of each mapping
//! table-mirror status --ledger-dir .table-mirror-runs
//! ```
//!
//! Connection strings can also come from `SOURCE_URI` and `TARGET_URI`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use run_ledger::{FilesystemLedger, RunLedger, RunRecord};
use std::path::PathBuf;
use table_mirror::{load_mapping_groups, run_mappings, summarize, ConnectionOpts, MirrorOpts};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "table-mirror")]
#[command(about = "Mirror source tables into target tables")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every mapping in the mapping file
    Run {
        /// Mapping file (.json, .yaml or .yml)
        #[arg(long, value_name = "PATH")]
        config: PathBuf,

        #[command(flatten)]
        connection: ConnectionOpts,

        #[command(flatten)]
        mirror: MirrorOpts,
    },

    /// Show recorded runs
    Status {
        /// Directory the runs were recorded in
        #[arg(long, value_name = "DIR", default_value = ".table-mirror-runs")]
        ledger_dir: PathBuf,

        /// Only show this mapping, e.g. "public.orders -> mirror.orders"
        #[arg(long)]
        mapping: Option<String>,

        /// Print the full records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            connection,
            mirror,
        } => run_reconcile(config, connection, mirror).await,
        Commands::Status {
            ledger_dir,
            mapping,
            json,
        } => run_status(ledger_dir, mapping, json).await,
    }
}

async fn run_reconcile(
    config: PathBuf,
    connection: ConnectionOpts,
    mirror: MirrorOpts,
) -> anyhow::Result<()> {
    let groups = load_mapping_groups(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next chunk boundary");
            on_signal.cancel();
        }
    });

    let reports = run_mappings(&groups, &connection, &mirror, cancel).await?;
    for report in &reports {
        println!("{}", summarize(report));
    }

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} mapping runs failed", reports.len());
    }
    Ok(())
}

async fn run_status(
    ledger_dir: PathBuf,
    mapping: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let ledger = FilesystemLedger::new(&ledger_dir);
    let records: Vec<RunRecord> = match mapping {
        Some(label) => ledger.latest(&label).await?.into_iter().collect(),
        None => ledger.latest_per_mapping().await?,
    };

    if records.is_empty() {
        println!("No runs recorded in {}", ledger_dir.display());
        return Ok(());
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize run records")?
        );
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {}  {}",
            record
                .recorded_at
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            record.run_id,
            summarize(&record.report)
        );
    }
    Ok(())
}
