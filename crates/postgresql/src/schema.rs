//! Catalog queries.

use mirror_core::{ColumnSchema, Identifier, IdentityKind, QualifiedName, TableSchema};
use reconcile::{ReconcileError, Result};
use tokio_postgres::Client;
use tracing::debug;

const DESCRIBE_SQL: &str = "
    SELECT a.attname::text,
           format_type(a.atttypid, a.atttypmod),
           NOT a.attnotnull,
           a.attidentity::text
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relname = $2
      AND c.relkind IN ('r', 'p')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
";

const ESTIMATE_SQL: &str = "
    SELECT c.reltuples::bigint
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2
";

/// Columns of `name` in physical order.
pub async fn describe_table(client: &Client, name: &QualifiedName) -> Result<TableSchema> {
    let rows = client
        .query(DESCRIBE_SQL, &[&name.schema.as_str(), &name.table.as_str()])
        .await
        .map_err(|e| ReconcileError::io(format!("describe {name}"), e))?;

    if rows.is_empty() {
        return Err(ReconcileError::Configuration(format!(
            "table {name} does not exist"
        )));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let column_name: String = row.get(0);
        let data_type: String = row.get(1);
        let nullable: bool = row.get(2);
        let identity: String = row.get(3);

        let mut column = ColumnSchema::new(Identifier::parse(column_name)?, data_type);
        column.nullable = nullable;
        column.identity = match identity.as_str() {
            "a" => Some(IdentityKind::Always),
            "d" => Some(IdentityKind::ByDefault),
            _ => None,
        };
        columns.push(column);
    }

    debug!("Described {name} with {} columns", columns.len());
    Ok(TableSchema::new(name.clone(), columns)?)
}

/// Planner row estimate; `u64::MAX` when the table was never analyzed.
pub async fn estimate_rows(client: &Client, name: &QualifiedName) -> Result<u64> {
    let row = client
        .query_opt(ESTIMATE_SQL, &[&name.schema.as_str(), &name.table.as_str()])
        .await
        .map_err(|e| ReconcileError::io(format!("estimate rows of {name}"), e))?
        .ok_or_else(|| ReconcileError::Configuration(format!("table {name} does not exist")))?;

    let estimate: i64 = row.get(0);
    Ok(u64::try_from(estimate).unwrap_or(u64::MAX))
}
