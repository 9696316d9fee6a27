//! Orphan removal after a completed run.

use crate::error::{ReconcileError, Result};
use crate::table::{TargetTable, TargetWriter};
use crate::tracker::ProcessedKeySet;
use mirror_core::PrimaryKey;
use tracing::{debug, info, warn};

/// Delete every target row whose key was never seen from the source.
///
/// Walks target keys page by page and deletes the orphans of each page in
/// its own transaction. In dry-run mode orphans are only counted. Any
/// failure comes back as [`ReconcileError::Cleanup`].
pub async fn remove_orphans<T: TargetTable, W: TargetWriter>(
    target: &T,
    writer: &mut W,
    processed: &ProcessedKeySet,
    page_size: usize,
    dry_run: bool,
) -> Result<u64> {
    scan(target, writer, processed, page_size, dry_run)
        .await
        .map_err(|e| ReconcileError::Cleanup(Box::new(e)))
}

async fn scan<T: TargetTable, W: TargetWriter>(
    target: &T,
    writer: &mut W,
    processed: &ProcessedKeySet,
    page_size: usize,
    dry_run: bool,
) -> Result<u64> {
    let mut deleted = 0u64;
    let mut after: Option<PrimaryKey> = None;

    loop {
        let keys = target.fetch_keys(after.as_ref(), page_size).await?;
        let short = keys.len() < page_size;
        after = keys.last().cloned();

        let orphans: Vec<&PrimaryKey> = keys.iter().filter(|k| !processed.contains(k)).collect();
        if !orphans.is_empty() {
            if dry_run {
                deleted += orphans.len() as u64;
            } else {
                deleted += delete_page(writer, &orphans).await?;
            }
            debug!(orphans = orphans.len(), "Processed cleanup page");
        }

        if short {
            break;
        }
    }

    if dry_run {
        info!("Dry run: {deleted} orphan rows would be deleted");
    } else {
        info!("Deleted {deleted} orphan rows");
    }
    Ok(deleted)
}

async fn delete_page<W: TargetWriter>(writer: &mut W, orphans: &[&PrimaryKey]) -> Result<u64> {
    writer.begin().await?;

    let mut deleted = 0;
    let mut result = Ok(());
    for key in orphans {
        match writer.delete(key).await {
            Ok(n) => deleted += n,
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    let finished = match result {
        Ok(()) => writer.commit().await,
        Err(e) => Err(e),
    };
    match finished {
        Ok(()) => Ok(deleted),
        Err(e) => {
            rollback(writer).await;
            Err(e)
        }
    }
}

async fn rollback<W: TargetWriter>(writer: &mut W) {
    if let Err(e) = writer.rollback().await {
        warn!("Rollback of cleanup page failed: {e}");
    }
}
