//! Transactional writer for a PostgreSQL target table.

use crate::client::SharedClient;
use crate::sql::WriteStatements;
use crate::value::PgParam;
use async_trait::async_trait;
use mirror_core::{PrimaryKey, Row, Value};
use reconcile::{MergePlan, ReconcileError, Result, TargetWriter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Statement};
use tracing::debug;

/// Holds the shared connection locked for the lifetime of a transaction.
///
/// While identity insert is enabled, merges use the `OVERRIDING SYSTEM
/// VALUE` form so explicit values reach `GENERATED ALWAYS` columns.
/// Disabling it moves the column's sequence past the highest stored value,
/// so later generated values do not collide with copied ones.
pub struct PgTargetWriter {
    client: SharedClient,
    plan: MergePlan,
    statements: Arc<WriteStatements>,
    tx: Option<OwnedMutexGuard<Client>>,
    prepared: HashMap<String, Statement>,
    identity_insert: bool,
}

impl PgTargetWriter {
    pub fn new(client: SharedClient, plan: MergePlan, statements: WriteStatements) -> Self {
        Self {
            client,
            plan,
            statements: Arc::new(statements),
            tx: None,
            prepared: HashMap::new(),
            identity_insert: false,
        }
    }

    fn transaction(&self, operation: &str) -> Result<&Client> {
        self.tx
            .as_deref()
            .ok_or_else(|| ReconcileError::io(operation, "no open transaction"))
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        if let Some(statement) = self.prepared.get(sql) {
            return Ok(statement.clone());
        }
        let statement = self
            .transaction("prepare")?
            .prepare(sql)
            .await
            .map_err(|e| ReconcileError::io(format!("prepare statement for {}", self.plan.target), e))?;
        self.prepared.insert(sql.to_string(), statement.clone());
        Ok(statement)
    }

    async fn finish(&mut self, command: &str) -> Result<()> {
        let guard = self
            .tx
            .take()
            .ok_or_else(|| ReconcileError::io(command, "no open transaction"))?;
        guard
            .batch_execute(command)
            .await
            .map_err(|e| ReconcileError::io(command, e))
    }
}

#[async_trait]
impl TargetWriter for PgTargetWriter {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(ReconcileError::io("begin", "transaction already open"));
        }
        let guard = Arc::clone(&self.client).lock_owned().await;
        guard
            .batch_execute("BEGIN")
            .await
            .map_err(|e| ReconcileError::io("begin", e))?;
        self.tx = Some(guard);
        Ok(())
    }

    async fn set_identity_insert(&mut self, enabled: bool) -> Result<()> {
        let was_enabled = std::mem::replace(&mut self.identity_insert, enabled);
        if enabled || !was_enabled {
            return Ok(());
        }

        let (Some(identity), Some(sql)) = (&self.plan.identity, &self.statements.resync_identity)
        else {
            return Ok(());
        };
        let table = self.plan.target.quoted();
        let column = identity.name.as_str().to_string();
        let sql = sql.clone();
        let statement = self.prepare(&sql).await?;
        self.transaction("resync identity")?
            .execute(&statement, &[&table, &column])
            .await
            .map_err(|e| ReconcileError::io(format!("resync identity of {}", self.plan.target), e))?;
        debug!("Resynced identity sequence of {}.{column}", self.plan.target);
        Ok(())
    }

    async fn upsert(&mut self, row: &Row) -> Result<()> {
        let statements = Arc::clone(&self.statements);
        let sql = match (&statements.merge_overriding, self.identity_insert) {
            (Some(overriding), true) => overriding,
            _ => &statements.merge,
        };
        let statement = self.prepare(sql).await?;

        let values = self
            .plan
            .insert_columns
            .iter()
            .map(|column| {
                row.get(column.as_str()).ok_or_else(|| {
                    ReconcileError::DataShape(format!("row has no column '{column}'"))
                })
            })
            .collect::<Result<Vec<&Value>>>()?;
        let bound: Vec<PgParam<'_>> = values.into_iter().map(PgParam).collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        self.transaction("upsert")?
            .execute(&statement, &params)
            .await
            .map_err(|e| ReconcileError::io(format!("merge into {}", self.plan.target), e))?;
        Ok(())
    }

    async fn delete(&mut self, key: &PrimaryKey) -> Result<u64> {
        let statements = Arc::clone(&self.statements);
        let statement = self.prepare(&statements.delete).await?;

        let bound: Vec<PgParam<'_>> = key.values().iter().map(PgParam).collect();
        let params: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        self.transaction("delete")?
            .execute(&statement, &params)
            .await
            .map_err(|e| ReconcileError::io(format!("delete {key} from {}", self.plan.target), e))
    }

    async fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.identity_insert = false;
        self.finish("ROLLBACK").await
    }
}
