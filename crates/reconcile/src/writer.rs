//! Chunk-at-a-time transactional merge writer.

use crate::detector::Classification;
use crate::error::Result;
use crate::plan::MergePlan;
use crate::table::TargetWriter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows written by one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub inserted: u64,
    pub updated: u64,
    /// Whether a transaction was committed for this chunk
    pub committed: bool,
}

/// Applies classified chunks through a backend [`TargetWriter`].
///
/// Each chunk is one transaction: any failure rolls the whole chunk back.
/// When the plan has an identity column, explicit identity insertion is
/// enabled before the first upsert and disabled again after the last one,
/// whether or not the upserts succeeded.
pub struct MergeWriter<W: TargetWriter> {
    writer: W,
    plan: Arc<MergePlan>,
    dry_run: bool,
}

impl<W: TargetWriter> MergeWriter<W> {
    pub fn new(writer: W, plan: Arc<MergePlan>, dry_run: bool) -> Self {
        Self {
            writer,
            plan,
            dry_run,
        }
    }

    /// Write every insert and update in `chunk`; no-ops are skipped.
    pub async fn write_chunk(&mut self, chunk: &[Classification]) -> Result<ChunkOutcome> {
        let mut outcome = ChunkOutcome::default();
        for change in chunk {
            match change {
                Classification::Insert(_) => outcome.inserted += 1,
                Classification::Update(_) => outcome.updated += 1,
                Classification::NoOp(_) => {}
            }
        }

        if self.dry_run || outcome.inserted + outcome.updated == 0 {
            return Ok(outcome);
        }

        self.writer.begin().await?;
        let applied = self.apply(chunk).await;
        let finished = match applied {
            Ok(()) => self.writer.commit().await,
            Err(e) => Err(e),
        };

        match finished {
            Ok(()) => {
                debug!(
                    inserted = outcome.inserted,
                    updated = outcome.updated,
                    "Committed chunk into {}",
                    self.plan.target
                );
                outcome.committed = true;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = self.writer.rollback().await {
                    warn!("Rollback of chunk into {} failed: {rollback}", self.plan.target);
                }
                Err(e)
            }
        }
    }

    async fn apply(&mut self, chunk: &[Classification]) -> Result<()> {
        let toggle = self.plan.needs_identity_insert();
        if toggle {
            if let Err(e) = self.writer.set_identity_insert(true).await {
                self.disable_identity_insert().await;
                return Err(e);
            }
        }

        let mut result = Ok(());
        for change in chunk {
            let row = match change {
                Classification::Insert(row) | Classification::Update(row) => row,
                Classification::NoOp(_) => continue,
            };
            if let Err(e) = self.writer.upsert(row).await {
                result = Err(e);
                break;
            }
        }

        if toggle {
            if result.is_ok() {
                self.writer.set_identity_insert(false).await?;
            } else {
                self.disable_identity_insert().await;
            }
        }
        result
    }

    /// Best-effort disable on a failure path; the original error wins.
    async fn disable_identity_insert(&mut self) {
        if let Err(e) = self.writer.set_identity_insert(false).await {
            warn!(
                "Failed to disable identity insert on {}: {e}",
                self.plan.target
            );
        }
    }

    /// Give back the backend writer, e.g. for cleanup deletes.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
