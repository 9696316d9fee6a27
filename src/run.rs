//! Drives reconciliation of every configured mapping.

use anyhow::{bail, Context};
use futures::stream::{self, StreamExt};
use mirror_core::{QualifiedName, TableMapping};
use reconcile::{ReconcileError, Reconciler, RunOptions, RunOutcome, RunReport};
use run_ledger::{LedgerStorage, RunRecord};
use table_mirror_postgresql::{new_postgresql_client, PgTable};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{ConnectionOpts, MappingGroup, MirrorOpts};

/// One mapping together with the databases it reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorJob {
    pub source_database: String,
    pub target_database: String,
    pub mapping: TableMapping,
}

/// Flatten `groups` into jobs, keeping only mappings that touch one of
/// `tables` when any are given.
pub fn select_jobs(groups: &[MappingGroup], tables: &[String]) -> anyhow::Result<Vec<MirrorJob>> {
    let filter = tables
        .iter()
        .map(|t| QualifiedName::parse(t).with_context(|| format!("Invalid --table value '{t}'")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let jobs: Vec<MirrorJob> = groups
        .iter()
        .flat_map(|group| {
            group.tables_for_changes.iter().map(|mapping| MirrorJob {
                source_database: group.source_database.clone(),
                target_database: group.target_database().to_string(),
                mapping: mapping.clone(),
            })
        })
        .filter(|job| {
            filter.is_empty()
                || filter
                    .iter()
                    .any(|t| *t == job.mapping.source() || *t == job.mapping.target())
        })
        .collect();

    if jobs.is_empty() {
        if filter.is_empty() {
            bail!("The mapping file contains no tables");
        }
        bail!("No mapping matches --table {}", tables.join(", "));
    }
    Ok(jobs)
}

async fn open_tables(
    job: &MirrorJob,
    connection: &ConnectionOpts,
) -> reconcile::Result<(PgTable, PgTable)> {
    let source_client =
        new_postgresql_client(&connection.source_uri, Some(&job.source_database)).await?;
    let target_client =
        new_postgresql_client(&connection.target_uri, Some(&job.target_database)).await?;

    let keys = job.mapping.primary_key.clone();
    let source = PgTable::open(source_client, job.mapping.source(), keys.clone()).await?;
    let target = PgTable::open(target_client, job.mapping.target(), keys).await?;
    Ok((source, target))
}

/// Reconcile one mapping on its own connections.
async fn run_job(
    job: MirrorJob,
    connection: &ConnectionOpts,
    options: RunOptions,
    cancel: CancellationToken,
) -> RunReport {
    let label = job.mapping.label();
    if cancel.is_cancelled() {
        return RunReport::failed(label, options.dry_run, ReconcileError::Cancelled);
    }

    match open_tables(&job, connection).await {
        Ok((source, target)) => {
            Reconciler::new(&job.mapping, &source, &target, options)
                .with_cancellation(cancel)
                .run()
                .await
        }
        Err(e) => {
            warn!("Could not start reconciliation of {label}: {e}");
            RunReport::failed(label, options.dry_run, e)
        }
    }
}

/// Run every selected mapping, `opts.parallel` at a time, recording each
/// report in the ledger as soon as its run ends. Reports come back in
/// mapping-file order.
pub async fn run_mappings(
    groups: &[MappingGroup],
    connection: &ConnectionOpts,
    opts: &MirrorOpts,
    cancel: CancellationToken,
) -> anyhow::Result<Vec<RunReport>> {
    let options = opts.run_options();
    options.validate()?;
    let jobs = select_jobs(groups, &opts.tables)?;
    let ledger = LedgerStorage::from_dir(opts.ledger_dir.clone()).open();

    info!(
        "Reconciling {} mappings, {} at a time{}",
        jobs.len(),
        opts.parallel.max(1),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let ledger = ledger.as_ref();
    let reports: Vec<RunReport> = stream::iter(jobs)
        .map(|job| {
            let run = run_job(job, connection, options.clone(), cancel.clone());
            async move {
                let report = run.await;
                if let Err(e) = ledger.record(&RunRecord::new(report.clone())).await {
                    warn!("Failed to record run of {}: {e:#}", report.mapping);
                }
                report
            }
        })
        .buffered(opts.parallel.max(1))
        .collect()
        .await;

    Ok(reports)
}

/// One line per report, for the terminal.
pub fn summarize(report: &RunReport) -> String {
    let c = &report.counts;
    let status = match &report.outcome {
        RunOutcome::Success => "ok".to_string(),
        RunOutcome::Running => "running".to_string(),
        RunOutcome::Failure { kind, message } => format!("failed ({kind}): {message}"),
    };
    format!(
        "{}: {status}; read={} inserted={} updated={} unchanged={} deleted={} duplicates={}{}",
        report.mapping,
        c.read,
        c.inserted,
        c.updated,
        c.unchanged,
        c.deleted,
        c.duplicates,
        if report.dry_run { " [dry run]" } else { "" }
    )
}
