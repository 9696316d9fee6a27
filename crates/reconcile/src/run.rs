//! One reconciliation run for one table mapping.
//!
//! ```text
//! Init ──► Streaming ──► Completed ──► Done
//!              │              │
//!              └──► Failed ◄──┘ (cleanup failure)
//! ```
//!
//! Streaming reads the source in key order, classifies each row, and writes
//! chunks of `chunk_size` source rows in one transaction each. Cleanup of
//! orphan rows only starts once streaming completed without error.

use crate::cleanup::remove_orphans;
use crate::detector::{ChangeDetector, Classification, NoOpReason};
use crate::error::{ErrorKind, ReconcileError, Result};
use crate::lookup::{select_lookup, StrategyKind};
use crate::plan::MergePlan;
use crate::stream::SourceStream;
use crate::table::{SourceTable, TargetTable};
use crate::writer::MergeWriter;
use chrono::{DateTime, Utc};
use mirror_core::{KeyProjection, TableMapping};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const DEFAULT_PAGE_SIZE: usize = 5000;
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Tuning knobs for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Rows per source page and per target page
    pub page_size: usize,
    /// Source rows per write transaction
    pub chunk_size: usize,
    pub strategy: StrategyKind,
    /// Classify and count without writing or deleting
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: StrategyKind::Auto,
            dry_run: false,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ReconcileError::Configuration(
                "page size must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ReconcileError::Configuration(
                "chunk size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Streaming,
    Failed,
    Completed,
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Running,
    Success,
    Failure { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Source rows read
    pub read: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub duplicates: u64,
    pub skipped_empty: u64,
    /// Orphans deleted, or that would be deleted in a dry run
    pub deleted: u64,
}

/// Summary of one run, suitable for logs and the run ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// `source -> target`
    pub mapping: String,
    pub state: RunState,
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    pub chunks_committed: u64,
    /// Up to 20 duplicate source keys, rendered for humans
    pub duplicate_keys: Vec<String>,
    /// Lookup strategy actually used
    pub strategy: Option<String>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(mapping: impl Into<String>, dry_run: bool) -> Self {
        Self {
            mapping: mapping.into(),
            state: RunState::Init,
            outcome: RunOutcome::Running,
            counts: RunCounts::default(),
            chunks_committed: 0,
            duplicate_keys: Vec::new(),
            strategy: None,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Report for a run that failed before reconciliation started, such as
    /// when a table could not be opened.
    pub fn failed(mapping: impl Into<String>, dry_run: bool, error: ReconcileError) -> Self {
        let mut report = Self::new(mapping, dry_run);
        report.finish(Err(error));
        report
    }

    fn finish(&mut self, result: Result<()>) {
        self.finished_at = Some(Utc::now());
        match result {
            Ok(()) => {
                self.state = RunState::Done;
                self.outcome = RunOutcome::Success;
            }
            Err(e) => {
                self.state = RunState::Failed;
                self.outcome = RunOutcome::Failure {
                    kind: e.kind(),
                    message: e.to_string(),
                };
            }
        }
    }
}

/// Drives one mapping from `Init` to `Done` or `Failed`.
pub struct Reconciler<'a, S: SourceTable, T: TargetTable> {
    mapping: &'a TableMapping,
    source: &'a S,
    target: &'a T,
    options: RunOptions,
    cancel: CancellationToken,
}

impl<'a, S: SourceTable, T: TargetTable> Reconciler<'a, S, T> {
    pub fn new(mapping: &'a TableMapping, source: &'a S, target: &'a T, options: RunOptions) -> Self {
        Self {
            mapping,
            source,
            target,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop at the next chunk boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run to completion. Failures are reported, not returned.
    pub async fn run(self) -> RunReport {
        let mut report = RunReport::new(self.mapping.label(), self.options.dry_run);
        info!(
            dry_run = self.options.dry_run,
            "Starting reconciliation of {}",
            report.mapping
        );

        let result = self.execute(&mut report).await;
        if let Err(e) = &result {
            error!("Reconciliation of {} failed: {e}", report.mapping);
        }
        report.finish(result);

        let c = &report.counts;
        info!(
            read = c.read,
            inserted = c.inserted,
            updated = c.updated,
            unchanged = c.unchanged,
            duplicates = c.duplicates,
            deleted = c.deleted,
            chunks = report.chunks_committed,
            "Finished reconciliation of {} in state {:?}",
            report.mapping,
            report.state
        );
        report
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        self.options.validate()?;

        let source_schema = self.source.describe().await?;
        let target_schema = self.target.describe().await?;
        let plan = Arc::new(MergePlan::build(self.mapping, &source_schema, &target_schema)?);

        let keys = &self.mapping.primary_key;
        let source_projection = KeyProjection::new(source_schema.layout(), keys)?;
        let target_projection = KeyProjection::new(target_schema.layout(), keys)?;

        let lookup = select_lookup(
            self.options.strategy,
            self.target,
            target_projection,
            self.options.page_size,
        )
        .await?;
        let mut detector = ChangeDetector::new(
            lookup,
            source_projection.clone(),
            plan.update_columns.clone(),
            self.mapping.last_modified_column.clone(),
        );
        report.strategy = Some(detector.lookup_name().to_string());

        let mut stream = SourceStream::new(self.source, source_projection, self.options.page_size);
        let mut writer = MergeWriter::new(
            self.target.writer(&plan).await?,
            plan.clone(),
            self.options.dry_run,
        );

        report.state = RunState::Streaming;
        let streamed = self
            .stream(&mut stream, &mut detector, &mut writer, report)
            .await;

        report.counts.duplicates = detector.duplicates().count;
        report.duplicate_keys = detector
            .duplicates()
            .samples
            .iter()
            .map(ToString::to_string)
            .collect();
        streamed?;

        report.state = RunState::Completed;
        info!(
            pages = stream.pages_read(),
            "Streaming of {} completed",
            report.mapping
        );

        let (processed, _) = detector.into_processed();
        let mut backend = writer.into_inner();
        report.counts.deleted = remove_orphans(
            self.target,
            &mut backend,
            &processed,
            self.options.page_size,
            self.options.dry_run,
        )
        .await?;
        Ok(())
    }

    async fn stream(
        &self,
        stream: &mut SourceStream<'_, S>,
        detector: &mut ChangeDetector<'_>,
        writer: &mut MergeWriter<T::Writer>,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut chunk = Vec::with_capacity(self.options.chunk_size);
        let mut rows_in_chunk = 0usize;

        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        while let Some(row) = stream.next_row().await? {
            report.counts.read += 1;
            rows_in_chunk += 1;

            match detector.classify(row).await? {
                Classification::NoOp(NoOpReason::Unchanged) => report.counts.unchanged += 1,
                Classification::NoOp(NoOpReason::Empty) => report.counts.skipped_empty += 1,
                Classification::NoOp(NoOpReason::DuplicateKey) => {}
                change => chunk.push(change),
            }

            if rows_in_chunk == self.options.chunk_size {
                self.flush(&mut chunk, writer, report).await?;
                rows_in_chunk = 0;
                if self.cancel.is_cancelled() {
                    return Err(ReconcileError::Cancelled);
                }
            }
        }

        if rows_in_chunk > 0 {
            self.flush(&mut chunk, writer, report).await?;
        }
        Ok(())
    }

    async fn flush(
        &self,
        chunk: &mut Vec<Classification>,
        writer: &mut MergeWriter<T::Writer>,
        report: &mut RunReport,
    ) -> Result<()> {
        let outcome = writer.write_chunk(chunk).await?;
        chunk.clear();
        report.counts.inserted += outcome.inserted;
        report.counts.updated += outcome.updated;
        if outcome.committed {
            report.chunks_committed += 1;
        }
        Ok(())
    }
}
