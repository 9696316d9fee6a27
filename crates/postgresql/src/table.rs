//! [`SourceTable`] and [`TargetTable`] over a PostgreSQL table.

use crate::client::SharedClient;
use crate::schema::{describe_table, estimate_rows};
use crate::sql::{ReadStatements, WriteStatements};
use crate::value::{convert_row, PgParam};
use crate::writer::PgTargetWriter;
use async_trait::async_trait;
use mirror_core::{Identifier, PrimaryKey, QualifiedName, Row, TableSchema};
use reconcile::{MergePlan, ReconcileError, Result, SourceTable, TargetTable};
use tokio_postgres::types::ToSql;
use tracing::debug;

/// One table bound to its key columns.
pub struct PgTable {
    client: SharedClient,
    schema: TableSchema,
    key_columns: Vec<Identifier>,
    statements: ReadStatements,
}

impl PgTable {
    /// Load the table's schema and render its read statements.
    pub async fn open(
        client: SharedClient,
        name: QualifiedName,
        key_columns: Vec<Identifier>,
    ) -> Result<Self> {
        let schema = {
            let guard = client.lock().await;
            describe_table(&guard, &name).await?
        };
        let statements = ReadStatements::render(&schema, &key_columns)?;
        debug!("Opened {name} keyed by {key_columns:?}");

        Ok(Self {
            client,
            schema,
            key_columns,
            statements,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn key_columns(&self) -> &[Identifier] {
        &self.key_columns
    }

    fn check_key(&self, key: &PrimaryKey) -> Result<()> {
        if key.values().len() != self.key_columns.len() {
            return Err(ReconcileError::DataShape(format!(
                "key {key} does not match the {} key columns of {}",
                self.key_columns.len(),
                self.schema.name
            )));
        }
        Ok(())
    }

    /// Run `sql` with the cursor key, if any, and the page limit bound.
    async fn query_page(
        &self,
        sql: &str,
        cursor: Option<&PrimaryKey>,
        limit: usize,
    ) -> Result<Vec<tokio_postgres::Row>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let cursor: Vec<PgParam<'_>> = match cursor {
            Some(key) => {
                self.check_key(key)?;
                key.values().iter().map(PgParam).collect()
            }
            None => Vec::new(),
        };
        let mut params: Vec<&(dyn ToSql + Sync)> =
            cursor.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        params.push(&limit);

        let client = self.client.lock().await;
        client
            .query(sql, &params)
            .await
            .map_err(|e| ReconcileError::io(format!("read page of {}", self.schema.name), e))
    }

    fn to_row(&self, row: &tokio_postgres::Row) -> Result<Row> {
        Ok(Row::new(self.schema.layout().clone(), convert_row(row)?)?)
    }
}

#[async_trait]
impl SourceTable for PgTable {
    async fn describe(&self) -> Result<TableSchema> {
        Ok(self.schema.clone())
    }

    async fn fetch_page(&self, after: Option<&PrimaryKey>, limit: usize) -> Result<Vec<Row>> {
        let sql = match after {
            Some(_) => &self.statements.page_after,
            None => &self.statements.page_first,
        };
        let rows = self.query_page(sql, after, limit).await?;
        rows.iter().map(|row| self.to_row(row)).collect()
    }

    async fn fetch_page_from(&self, from: &PrimaryKey, limit: usize) -> Result<Vec<Row>> {
        let rows = self
            .query_page(&self.statements.page_from, Some(from), limit)
            .await?;
        rows.iter().map(|row| self.to_row(row)).collect()
    }
}

#[async_trait]
impl TargetTable for PgTable {
    type Writer = PgTargetWriter;

    async fn fetch_row(&self, key: &PrimaryKey) -> Result<Option<Row>> {
        self.check_key(key)?;
        let bound: Vec<PgParam<'_>> = key.values().iter().map(PgParam).collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let row = {
            let client = self.client.lock().await;
            client
                .query_opt(self.statements.by_key.as_str(), &params)
                .await
                .map_err(|e| ReconcileError::io(format!("look up {key} in {}", self.schema.name), e))?
        };
        row.as_ref().map(|row| self.to_row(row)).transpose()
    }

    async fn fetch_keys(
        &self,
        after: Option<&PrimaryKey>,
        limit: usize,
    ) -> Result<Vec<PrimaryKey>> {
        let sql = match after {
            Some(_) => &self.statements.keys_after,
            None => &self.statements.keys_first,
        };
        let rows = self.query_page(sql, after, limit).await?;
        rows.iter()
            .map(|row| Ok(PrimaryKey::new(convert_row(row)?)))
            .collect()
    }

    async fn estimate_rows(&self) -> Result<u64> {
        let client = self.client.lock().await;
        estimate_rows(&client, &self.schema.name).await
    }

    async fn writer(&self, plan: &MergePlan) -> Result<PgTargetWriter> {
        let statements = WriteStatements::render(plan, &self.schema)?;
        Ok(PgTargetWriter::new(
            self.client.clone(),
            plan.clone(),
            statements,
        ))
    }
}
