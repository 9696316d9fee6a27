//! In-memory table backend.
//!
//! Implements both table traits over a `BTreeMap` so the engine can be
//! exercised without a database. Clones share state, which lets a test keep
//! a handle for inspection while the engine owns another. Transactions are
//! modelled with a snapshot taken at `begin` and restored on `rollback`.
//! Identity columns declared [`IdentityKind::Always`] reject explicit values
//! unless identity insertion is enabled, like a real database would.

use crate::error::{ReconcileError, Result};
use crate::plan::MergePlan;
use crate::table::{SourceTable, TargetTable, TargetWriter};
use async_trait::async_trait;
use chrono::Utc;
use mirror_core::{
    ColumnSchema, CoreError, Identifier, IdentityKind, KeyProjection, PrimaryKey, QualifiedName,
    Row, TableSchema, Value,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<PrimaryKey, Row>,
    snapshot: Option<BTreeMap<PrimaryKey, Row>>,
    identity_insert: bool,
    identity_toggles: Vec<bool>,
    fail_upsert_on: Option<PrimaryKey>,
    fail_deletes: bool,
    page_fetches: u64,
    commits: u64,
}

/// A table held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: Arc<TableSchema>,
    projection: KeyProjection,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTable {
    pub fn new(schema: TableSchema, key_columns: &[Identifier]) -> std::result::Result<Self, CoreError> {
        let projection = KeyProjection::new(schema.layout(), key_columns)?;
        Ok(Self {
            schema: Arc::new(schema),
            projection,
            state: Arc::new(Mutex::new(MemoryState::default())),
        })
    }

    /// Table of untyped `text` columns.
    pub fn from_names(
        name: &str,
        columns: &[&str],
        key_columns: &[&str],
    ) -> std::result::Result<Self, CoreError> {
        let typed: Vec<(&str, &str)> = columns.iter().map(|c| (*c, "text")).collect();
        Self::from_typed(name, &typed, key_columns)
    }

    /// Table with declared column types, given as `(name, type)` pairs.
    pub fn from_typed(
        name: &str,
        columns: &[(&str, &str)],
        key_columns: &[&str],
    ) -> std::result::Result<Self, CoreError> {
        let columns = columns
            .iter()
            .map(|(c, t)| Ok(ColumnSchema::new(Identifier::parse(*c)?, *t)))
            .collect::<std::result::Result<Vec<_>, CoreError>>()?;
        let schema = TableSchema::new(QualifiedName::parse(name)?, columns)?;
        let keys = key_columns
            .iter()
            .map(|k| Identifier::parse(*k))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(schema, &keys)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Store a row directly, bypassing transactions and identity rules.
    pub async fn seed(&self, values: Vec<Value>) -> std::result::Result<(), CoreError> {
        let row = Row::new(self.schema.layout().clone(), values)?;
        let key = self.projection.project(&row)?;
        self.state.lock().await.rows.insert(key, row);
        Ok(())
    }

    pub async fn rows(&self) -> Vec<Row> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    pub async fn keys(&self) -> Vec<PrimaryKey> {
        self.state.lock().await.rows.keys().cloned().collect()
    }

    pub async fn get(&self, key: &PrimaryKey) -> Option<Row> {
        self.state.lock().await.rows.get(key).cloned()
    }

    pub async fn identity_insert_enabled(&self) -> bool {
        self.state.lock().await.identity_insert
    }

    /// Every `set_identity_insert` call, in order.
    pub async fn identity_toggles(&self) -> Vec<bool> {
        self.state.lock().await.identity_toggles.clone()
    }

    /// Make upserts of `key` fail with an I/O error.
    pub async fn fail_upsert_on(&self, key: PrimaryKey) {
        self.state.lock().await.fail_upsert_on = Some(key);
    }

    /// Make every delete fail with an I/O error.
    pub async fn fail_deletes(&self) {
        self.state.lock().await.fail_deletes = true;
    }

    pub async fn page_fetches(&self) -> u64 {
        self.state.lock().await.page_fetches
    }

    pub async fn commits(&self) -> u64 {
        self.state.lock().await.commits
    }

    fn page<T>(
        rows: &BTreeMap<PrimaryKey, Row>,
        start: Bound<PrimaryKey>,
        limit: usize,
        f: impl Fn(&PrimaryKey, &Row) -> T,
    ) -> Vec<T> {
        rows.range((start, Bound::Unbounded))
            .take(limit)
            .map(|(k, r)| f(k, r))
            .collect()
    }
}

#[async_trait]
impl SourceTable for MemoryTable {
    async fn describe(&self) -> Result<TableSchema> {
        Ok(self.schema.as_ref().clone())
    }

    async fn fetch_page(&self, after: Option<&PrimaryKey>, limit: usize) -> Result<Vec<Row>> {
        let mut state = self.state.lock().await;
        state.page_fetches += 1;
        Ok(Self::page(&state.rows, excluded(after), limit, |_, row| row.clone()))
    }

    async fn fetch_page_from(&self, from: &PrimaryKey, limit: usize) -> Result<Vec<Row>> {
        let mut state = self.state.lock().await;
        state.page_fetches += 1;
        Ok(Self::page(
            &state.rows,
            Bound::Included(from.clone()),
            limit,
            |_, row| row.clone(),
        ))
    }
}

fn excluded(after: Option<&PrimaryKey>) -> Bound<PrimaryKey> {
    after.map_or(Bound::Unbounded, |key| Bound::Excluded(key.clone()))
}

#[async_trait]
impl TargetTable for MemoryTable {
    type Writer = MemoryWriter;

    async fn fetch_row(&self, key: &PrimaryKey) -> Result<Option<Row>> {
        Ok(self.state.lock().await.rows.get(key).cloned())
    }

    async fn fetch_keys(
        &self,
        after: Option<&PrimaryKey>,
        limit: usize,
    ) -> Result<Vec<PrimaryKey>> {
        let state = self.state.lock().await;
        Ok(Self::page(&state.rows, excluded(after), limit, |key, _| key.clone()))
    }

    async fn estimate_rows(&self) -> Result<u64> {
        Ok(self.state.lock().await.rows.len() as u64)
    }

    async fn writer(&self, plan: &MergePlan) -> Result<MemoryWriter> {
        Ok(MemoryWriter {
            table: self.clone(),
            plan: plan.clone(),
        })
    }
}

/// Writer over a [`MemoryTable`].
#[derive(Debug)]
pub struct MemoryWriter {
    table: MemoryTable,
    plan: MergePlan,
}

impl MemoryWriter {
    fn merged_row(&self, source: &Row, existing: Option<&Row>) -> Result<Row> {
        let now = Value::Timestamp(Utc::now());
        let is_insert = existing.is_none();
        let layout = self.table.schema.layout();

        let values = layout
            .columns()
            .iter()
            .map(|column| {
                let previous = || {
                    existing
                        .and_then(|row| row.get(column.as_str()))
                        .cloned()
                        .unwrap_or(Value::Null)
                };
                if self.plan.created_at.as_ref() == Some(column) {
                    if is_insert {
                        now.clone()
                    } else {
                        previous()
                    }
                } else if self.plan.modified_at.as_ref() == Some(column) {
                    if is_insert {
                        Value::Null
                    } else {
                        now.clone()
                    }
                } else {
                    source
                        .get(column.as_str())
                        .cloned()
                        .unwrap_or_else(previous)
                }
            })
            .collect();

        Ok(Row::new(layout.clone(), values)?)
    }
}

#[async_trait]
impl TargetWriter for MemoryWriter {
    async fn begin(&mut self) -> Result<()> {
        let mut state = self.table.state.lock().await;
        if state.snapshot.is_some() {
            return Err(ReconcileError::io("begin", "transaction already open"));
        }
        state.snapshot = Some(state.rows.clone());
        Ok(())
    }

    async fn set_identity_insert(&mut self, enabled: bool) -> Result<()> {
        let mut state = self.table.state.lock().await;
        state.identity_insert = enabled;
        state.identity_toggles.push(enabled);
        Ok(())
    }

    async fn upsert(&mut self, row: &Row) -> Result<()> {
        let key = self.table.projection.project(row)?;
        let merged = {
            let state = self.table.state.lock().await;
            if state.fail_upsert_on.as_ref() == Some(&key) {
                return Err(ReconcileError::io("upsert", format!("injected failure at {key}")));
            }

            let existing = state.rows.get(&key);
            if let Some(identity) = self.table.schema.identity_column() {
                let explicit = row
                    .get(identity.name.as_str())
                    .is_some_and(|v| !v.is_null());
                if identity.identity == Some(IdentityKind::Always)
                    && existing.is_none()
                    && explicit
                    && !state.identity_insert
                {
                    return Err(ReconcileError::io(
                        "upsert",
                        format!(
                            "cannot insert explicit value into identity column '{}'",
                            identity.name
                        ),
                    ));
                }
            }

            self.merged_row(row, existing)?
        };

        self.table.state.lock().await.rows.insert(key, merged);
        Ok(())
    }

    async fn delete(&mut self, key: &PrimaryKey) -> Result<u64> {
        let mut state = self.table.state.lock().await;
        if state.fail_deletes {
            return Err(ReconcileError::io("delete", format!("injected failure at {key}")));
        }
        Ok(state.rows.remove(key).map_or(0, |_| 1))
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.table.state.lock().await;
        if state.snapshot.take().is_none() {
            return Err(ReconcileError::io("commit", "no open transaction"));
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.table.state.lock().await;
        match state.snapshot.take() {
            Some(rows) => {
                state.rows = rows;
                Ok(())
            }
            None => Err(ReconcileError::io("rollback", "no open transaction")),
        }
    }
}
