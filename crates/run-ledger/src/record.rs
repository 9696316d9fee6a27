//! Stored form of a finished run.

use chrono::{DateTime, Utc};
use reconcile::RunReport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ledger entry.
///
/// # File Format
///
/// ```json
/// {
///     "run_id": "0b8e6a9e-2f8c-4b8f-9a4e-1c1f0f3f5a11",
///     "recorded_at": "2024-01-01T00:00:00Z",
///     "report": {
///         "mapping": "src.orders -> dst.orders",
///         "state": "done",
///         "outcome": { "status": "success" },
///         ...
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub report: RunReport,
}

impl RunRecord {
    pub fn new(report: RunReport) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            report,
        }
    }

    /// Mapping label the report was produced for.
    pub fn mapping(&self) -> &str {
        &self.report.mapping
    }
}
