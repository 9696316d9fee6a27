//! Ledger trait and the no-op implementation.

use anyhow::Result;
use async_trait::async_trait;

use crate::RunRecord;

/// Storage for run records.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Persist `record`.
    async fn record(&self, record: &RunRecord) -> Result<()>;

    /// Most recent record for the mapping labelled `mapping`.
    ///
    /// Returns None if that mapping never ran.
    async fn latest(&self, mapping: &str) -> Result<Option<RunRecord>>;

    /// Most recent record of every mapping, ordered by mapping label.
    async fn latest_per_mapping(&self) -> Result<Vec<RunRecord>>;
}

/// Ledger that keeps nothing.
pub struct NullLedger;

#[async_trait]
impl RunLedger for NullLedger {
    async fn record(&self, _record: &RunRecord) -> Result<()> {
        Ok(())
    }

    async fn latest(&self, _mapping: &str) -> Result<Option<RunRecord>> {
        Ok(None)
    }

    async fn latest_per_mapping(&self) -> Result<Vec<RunRecord>> {
        Ok(Vec::new())
    }
}
