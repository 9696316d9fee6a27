//! Backend traits for source and target tables.
//!
//! The engine is written against these traits only. A backend binds one
//! physical table together with the mapping's key columns, so paged reads
//! and key-only reads come back ascending by those columns in declared
//! order, matching the ordering of [`PrimaryKey`].

use crate::error::Result;
use crate::plan::MergePlan;
use async_trait::async_trait;
use mirror_core::{PrimaryKey, Row, TableSchema};

/// Ordered, paged reads of a whole table.
#[async_trait]
pub trait SourceTable: Send + Sync {
    /// Column shape of the table as it exists right now.
    async fn describe(&self) -> Result<TableSchema>;

    /// Up to `limit` rows with keys strictly greater than `after`, ascending.
    ///
    /// A page shorter than `limit` means there are no further rows.
    async fn fetch_page(&self, after: Option<&PrimaryKey>, limit: usize) -> Result<Vec<Row>>;

    /// Up to `limit` rows with keys greater than or equal to `from`,
    /// ascending. Rows sharing `from` come first.
    async fn fetch_page_from(&self, from: &PrimaryKey, limit: usize) -> Result<Vec<Row>>;
}

/// A table the engine reads from and writes to.
#[async_trait]
pub trait TargetTable: SourceTable {
    type Writer: TargetWriter;

    /// The row stored under `key`, if any.
    async fn fetch_row(&self, key: &PrimaryKey) -> Result<Option<Row>>;

    /// Key-only variant of [`SourceTable::fetch_page`].
    async fn fetch_keys(&self, after: Option<&PrimaryKey>, limit: usize)
        -> Result<Vec<PrimaryKey>>;

    /// Approximate row count, used to pick a lookup strategy.
    async fn estimate_rows(&self) -> Result<u64>;

    /// A writer whose statements are prepared from `plan`.
    async fn writer(&self, plan: &MergePlan) -> Result<Self::Writer>;
}

/// Transactional write access to a target table.
///
/// Callers always pair `begin` with exactly one of `commit` or `rollback`,
/// and every `set_identity_insert(true)` with a `set_identity_insert(false)`
/// inside the same transaction.
#[async_trait]
pub trait TargetWriter: Send {
    async fn begin(&mut self) -> Result<()>;

    /// Allow or forbid explicit values for the plan's identity column.
    async fn set_identity_insert(&mut self, enabled: bool) -> Result<()>;

    /// Insert `row` or update the row sharing its key.
    async fn upsert(&mut self, row: &Row) -> Result<()>;

    /// Delete the row under `key`, returning the number of rows removed.
    async fn delete(&mut self, key: &PrimaryKey) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
