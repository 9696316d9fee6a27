//! Row classification against the target.

use crate::error::Result;
use crate::lookup::TargetLookup;
use crate::tracker::ProcessedKeySet;
use mirror_core::{Identifier, KeyProjection, PrimaryKey, Row};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum duplicate keys kept verbatim for the run report.
pub const DUPLICATE_SAMPLE_LIMIT: usize = 20;

/// Why a source row needs no write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    Empty,
    Unchanged,
    DuplicateKey,
}

/// Outcome of comparing one source row with the target.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Insert(Row),
    Update(Row),
    NoOp(NoOpReason),
}

impl Classification {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert(_) | Self::Update(_))
    }
}

/// Duplicate source keys seen during a run.
#[derive(Debug, Default, Clone)]
pub struct DuplicateLog {
    pub count: u64,
    pub samples: Vec<PrimaryKey>,
}

impl DuplicateLog {
    fn record(&mut self, key: PrimaryKey) {
        self.count += 1;
        if self.samples.len() < DUPLICATE_SAMPLE_LIMIT {
            self.samples.push(key);
        }
    }
}

/// Classifies source rows as inserts, updates or no-ops.
///
/// Owns the run's [`ProcessedKeySet`]; every key it classifies is recorded
/// there before the target is consulted.
pub struct ChangeDetector<'a> {
    lookup: Box<dyn TargetLookup + 'a>,
    projection: KeyProjection,
    compare_columns: Vec<Identifier>,
    last_modified: Option<Identifier>,
    processed: ProcessedKeySet,
    duplicates: DuplicateLog,
}

impl<'a> ChangeDetector<'a> {
    /// `compare_columns` are the non-key source columns; `projection` is
    /// built over the source layout.
    pub fn new(
        lookup: Box<dyn TargetLookup + 'a>,
        projection: KeyProjection,
        compare_columns: Vec<Identifier>,
        last_modified: Option<Identifier>,
    ) -> Self {
        Self {
            lookup,
            projection,
            compare_columns,
            last_modified,
            processed: ProcessedKeySet::new(),
            duplicates: DuplicateLog::default(),
        }
    }

    pub async fn classify(&mut self, row: Row) -> Result<Classification> {
        if row.is_empty() {
            return Ok(Classification::NoOp(NoOpReason::Empty));
        }

        let key = self.projection.project(&row)?;
        if !self.processed.insert(key.clone()) {
            warn!("Duplicate source key {key}, row skipped");
            self.duplicates.record(key);
            return Ok(Classification::NoOp(NoOpReason::DuplicateKey));
        }

        let existing = self.lookup.take(&key).await?;

        match existing {
            None => Ok(Classification::Insert(row)),
            Some(target) if self.has_changes(&row, &target) => Ok(Classification::Update(row)),
            Some(_) => Ok(Classification::NoOp(NoOpReason::Unchanged)),
        }
    }

    fn has_changes(&self, source: &Row, target: &Row) -> bool {
        let differs = self
            .compare_columns
            .iter()
            .any(|column| source.get(column.as_str()) != target.get(column.as_str()));
        differs || self.is_newer(source, target)
    }

    fn is_newer(&self, source: &Row, target: &Row) -> bool {
        let Some(column) = &self.last_modified else {
            return false;
        };
        match (source.get(column.as_str()), target.get(column.as_str())) {
            (Some(s), Some(t)) => s.is_newer_than(t).unwrap_or(false),
            _ => false,
        }
    }

    pub fn processed(&self) -> &ProcessedKeySet {
        &self.processed
    }

    pub fn duplicates(&self) -> &DuplicateLog {
        &self.duplicates
    }

    pub fn lookup_name(&self) -> &'static str {
        self.lookup.name()
    }

    /// Hand over the processed keys for orphan cleanup.
    pub fn into_processed(self) -> (ProcessedKeySet, DuplicateLog) {
        (self.processed, self.duplicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::PointLookup;
    use crate::memory::MemoryTable;
    use mirror_core::{RowLayout, Value};
    use std::sync::Arc;

    fn layout() -> Arc<RowLayout> {
        RowLayout::from_names(&["id", "val", "updated"]).unwrap()
    }

    fn row(id: i64, val: &str, updated: i64) -> Row {
        Row::new(layout(), vec![id.into(), val.into(), updated.into()]).unwrap()
    }

    async fn target() -> MemoryTable {
        let table =
            MemoryTable::from_names("public.t", &["id", "val", "updated"], &["id"]).unwrap();
        table.seed(vec![2.into(), "old".into(), 10.into()]).await.unwrap();
        table.seed(vec![3.into(), "same".into(), 10.into()]).await.unwrap();
        table
    }

    fn detector<'a>(table: &'a MemoryTable, last_modified: Option<&str>) -> ChangeDetector<'a> {
        let layout = layout();
        ChangeDetector::new(
            Box::new(PointLookup::new(table)),
            KeyProjection::from_names(&layout, &["id"]).unwrap(),
            vec![Identifier::parse("val").unwrap()],
            last_modified.map(|c| Identifier::parse(c).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_classifies_insert_update_noop() {
        let table = target().await;
        let mut detector = detector(&table, None);

        assert!(matches!(
            detector.classify(row(1, "a", 0)).await.unwrap(),
            Classification::Insert(_)
        ));
        assert!(matches!(
            detector.classify(row(2, "b", 10)).await.unwrap(),
            Classification::Update(_)
        ));
        assert_eq!(
            detector.classify(row(3, "same", 10)).await.unwrap(),
            Classification::NoOp(NoOpReason::Unchanged)
        );
        assert_eq!(detector.processed().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_key_recorded() {
        let table = target().await;
        let mut detector = detector(&table, None);

        detector.classify(row(5, "a", 0)).await.unwrap();
        let second = detector.classify(row(5, "b", 0)).await.unwrap();

        assert_eq!(second, Classification::NoOp(NoOpReason::DuplicateKey));
        assert_eq!(detector.duplicates().count, 1);
        assert_eq!(
            detector.duplicates().samples,
            vec![PrimaryKey::from(Value::Int(5))]
        );
    }

    #[tokio::test]
    async fn test_newer_last_modified_forces_update() {
        let table = target().await;

        // "updated" is not compared, so only the override can trigger
        let mut plain = detector(&table, None);
        assert_eq!(
            plain.classify(row(3, "same", 11)).await.unwrap(),
            Classification::NoOp(NoOpReason::Unchanged)
        );

        let mut with_override = detector(&table, Some("updated"));
        assert!(matches!(
            with_override.classify(row(3, "same", 11)).await.unwrap(),
            Classification::Update(_)
        ));
    }

    #[tokio::test]
    async fn test_older_last_modified_does_not_force_update() {
        let table = target().await;
        let mut detector = detector(&table, Some("updated"));
        assert_eq!(
            detector.classify(row(3, "same", 9)).await.unwrap(),
            Classification::NoOp(NoOpReason::Unchanged)
        );
    }

    #[tokio::test]
    async fn test_null_key_is_data_shape_error() {
        let table = target().await;
        let mut detector = detector(&table, None);
        let bad = Row::new(layout(), vec![Value::Null, "a".into(), 0.into()]).unwrap();
        assert!(detector.classify(bad).await.is_err());
    }
}
