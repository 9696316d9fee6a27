//! Statement templates, rendered once per table.
//!
//! Only allow-listed identifiers and catalog type names are spliced into
//! statement text. Every row value is a bound parameter.

use mirror_core::{Identifier, IdentityKind, TableSchema};
use reconcile::{MergePlan, ReconcileError, Result};
use tracing::warn;

/// Whether a `format_type` name sorts by collation.
fn is_collatable(data_type: &str) -> bool {
    let t = data_type.to_ascii_lowercase();
    !t.ends_with("[]") && (t == "text" || t == "name" || t.starts_with("character"))
}

/// Key column as it appears in `ORDER BY` and keyset predicates.
///
/// `citext` compares case-insensitively even under `"C"`, so it is cast to
/// `text` first.
fn order_key(key: &Identifier, data_type: &str) -> String {
    if data_type.eq_ignore_ascii_case("citext") {
        format!("{}::text COLLATE \"C\"", key.quoted())
    } else if is_collatable(data_type) {
        format!("{} COLLATE \"C\"", key.quoted())
    } else {
        key.quoted()
    }
}

/// Reject catalog type names that could not have come from `format_type`.
fn checked_type(data_type: &str) -> Result<&str> {
    let valid = !data_type.is_empty()
        && data_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || " _(),[].\"".contains(c));
    if valid {
        Ok(data_type)
    } else {
        Err(ReconcileError::Configuration(format!(
            "unsupported column type '{data_type}'"
        )))
    }
}

fn column_list(columns: &[Identifier]) -> String {
    columns
        .iter()
        .map(Identifier::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"k1" = $1 AND "k2" = $2`
fn key_equals(keys: &[Identifier]) -> String {
    keys.iter()
        .enumerate()
        .map(|(i, k)| format!("{} = ${}", k.quoted(), i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Read statements for one table, ordered by its key columns.
///
/// Text keys compare under the `"C"` collation so the server's order is
/// plain byte order, which is how keys order in memory.
#[derive(Debug, Clone)]
pub struct ReadStatements {
    pub page_first: String,
    pub page_after: String,
    /// Like `page_after` but including the cursor key
    pub page_from: String,
    pub by_key: String,
    pub keys_first: String,
    pub keys_after: String,
}

impl ReadStatements {
    pub fn render(schema: &TableSchema, keys: &[Identifier]) -> Result<Self> {
        let table = schema.name.quoted();
        let columns = column_list(schema.layout().columns());

        let mut ordered = Vec::with_capacity(keys.len());
        for key in keys {
            let column = schema.column(key.as_str()).ok_or_else(|| {
                ReconcileError::Configuration(format!(
                    "primary key column '{key}' not found in {}",
                    schema.name
                ))
            })?;
            ordered.push(order_key(key, &column.data_type));
        }
        let order_by = ordered.join(", ");
        let cursor = (1..=keys.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let after = format!("({order_by}) > ({cursor})");
        let from = format!("({order_by}) >= ({cursor})");
        let next = keys.len() + 1;
        let key_columns = column_list(keys);

        Ok(Self {
            page_first: format!("SELECT {columns} FROM {table} ORDER BY {order_by} LIMIT $1"),
            page_after: format!(
                "SELECT {columns} FROM {table} WHERE {after} ORDER BY {order_by} LIMIT ${next}"
            ),
            page_from: format!(
                "SELECT {columns} FROM {table} WHERE {from} ORDER BY {order_by} LIMIT ${next}"
            ),
            by_key: format!("SELECT {columns} FROM {table} WHERE {}", key_equals(keys)),
            keys_first: format!(
                "SELECT {key_columns} FROM {table} ORDER BY {order_by} LIMIT $1"
            ),
            keys_after: format!(
                "SELECT {key_columns} FROM {table} WHERE {after} ORDER BY {order_by} LIMIT ${next}"
            ),
        })
    }
}

/// Write statements derived from a [`MergePlan`].
#[derive(Debug, Clone)]
pub struct WriteStatements {
    pub merge: String,
    /// Variant of `merge` that supplies values for a `GENERATED ALWAYS`
    /// identity column
    pub merge_overriding: Option<String>,
    pub delete: String,
    /// Moves the identity sequence past the highest stored value; binds the
    /// quoted table name and the raw column name
    pub resync_identity: Option<String>,
}

impl WriteStatements {
    pub fn render(plan: &MergePlan, target: &TableSchema) -> Result<Self> {
        let table = plan.target.quoted();

        let mut casts = Vec::with_capacity(plan.insert_columns.len());
        for (i, column) in plan.insert_columns.iter().enumerate() {
            let schema = target.column(column.as_str()).ok_or_else(|| {
                ReconcileError::Configuration(format!(
                    "column '{column}' not found in {}",
                    plan.target
                ))
            })?;
            casts.push(format!(
                "${}::{} AS {}",
                i + 1,
                checked_type(&schema.data_type)?,
                column.quoted()
            ));
        }

        let on = plan
            .key_columns
            .iter()
            .map(|k| format!("target.{0} = source.{0}", k.quoted()))
            .collect::<Vec<_>>()
            .join(" AND ");

        let always_identity = plan
            .identity
            .as_ref()
            .filter(|identity| identity.kind == IdentityKind::Always);

        let mut sets: Vec<String> = Vec::with_capacity(plan.update_columns.len() + 1);
        for column in &plan.update_columns {
            if always_identity.is_some_and(|identity| &identity.name == column) {
                warn!(
                    "Identity column {column} of {} is never updated in place",
                    plan.target
                );
                continue;
            }
            sets.push(format!("{0} = source.{0}", column.quoted()));
        }
        if let Some(modified_at) = &plan.modified_at {
            sets.push(format!("{} = now()", modified_at.quoted()));
        }

        let mut insert_columns: Vec<String> =
            plan.insert_columns.iter().map(Identifier::quoted).collect();
        let mut insert_values: Vec<String> = plan
            .insert_columns
            .iter()
            .map(|c| format!("source.{}", c.quoted()))
            .collect();
        if let Some(created_at) = &plan.created_at {
            insert_columns.push(created_at.quoted());
            insert_values.push("now()".to_string());
        }

        let matched = if sets.is_empty() {
            String::new()
        } else {
            format!(" WHEN MATCHED THEN UPDATE SET {}", sets.join(", "))
        };
        let merge_with = |overriding: &str| {
            format!(
                "MERGE INTO {table} AS target USING (SELECT {}) AS source ON {on}{matched} \
                 WHEN NOT MATCHED THEN INSERT ({}) {overriding}VALUES ({})",
                casts.join(", "),
                insert_columns.join(", "),
                insert_values.join(", ")
            )
        };

        let resync_identity = plan.identity.as_ref().map(|identity| {
            format!(
                "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX({}), 0) + 1, false) FROM {table}",
                identity.name.quoted()
            )
        });

        Ok(Self {
            merge: merge_with(""),
            merge_overriding: always_identity.map(|_| merge_with("OVERRIDING SYSTEM VALUE ")),
            delete: format!("DELETE FROM {table} WHERE {}", key_equals(&plan.key_columns)),
            resync_identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::{ColumnSchema, QualifiedName, TableMapping};

    fn column(name: &str, data_type: &str) -> ColumnSchema {
        ColumnSchema::new(Identifier::parse(name).unwrap(), data_type)
    }

    fn ident(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    fn schemas() -> (TableSchema, TableSchema) {
        let source = TableSchema::new(
            QualifiedName::parse("src.orders").unwrap(),
            vec![
                column("id", "bigint"),
                column("code", "character varying(20)"),
                column("amount", "numeric(10,2)"),
            ],
        )
        .unwrap();
        let target = TableSchema::new(
            QualifiedName::parse("dst.orders").unwrap(),
            vec![
                column("id", "bigint"),
                column("code", "character varying(20)"),
                column("amount", "numeric(10,2)"),
                column("created_at", "timestamp with time zone"),
                column("modified_at", "timestamp with time zone"),
            ],
        )
        .unwrap();
        (source, target)
    }

    fn plan(source: &TableSchema, target: &TableSchema, keys: &[&str]) -> MergePlan {
        let mapping = TableMapping::new(
            source.name.clone(),
            target.name.clone(),
            keys.iter().map(|k| ident(k)).collect(),
        );
        MergePlan::build(&mapping, source, target).unwrap()
    }

    #[test]
    fn test_read_statements_use_keyset_paging() {
        let (source, _) = schemas();
        let read = ReadStatements::render(&source, &[ident("code"), ident("id")]).unwrap();

        assert_eq!(
            read.page_first,
            "SELECT \"id\", \"code\", \"amount\" FROM \"src\".\"orders\" \
             ORDER BY \"code\" COLLATE \"C\", \"id\" LIMIT $1"
        );
        assert_eq!(
            read.page_after,
            "SELECT \"id\", \"code\", \"amount\" FROM \"src\".\"orders\" \
             WHERE (\"code\" COLLATE \"C\", \"id\") > ($1, $2) \
             ORDER BY \"code\" COLLATE \"C\", \"id\" LIMIT $3"
        );
        assert_eq!(
            read.page_from,
            "SELECT \"id\", \"code\", \"amount\" FROM \"src\".\"orders\" \
             WHERE (\"code\" COLLATE \"C\", \"id\") >= ($1, $2) \
             ORDER BY \"code\" COLLATE \"C\", \"id\" LIMIT $3"
        );
        assert_eq!(
            read.by_key,
            "SELECT \"id\", \"code\", \"amount\" FROM \"src\".\"orders\" \
             WHERE \"code\" = $1 AND \"id\" = $2"
        );
        assert_eq!(
            read.keys_first,
            "SELECT \"code\", \"id\" FROM \"src\".\"orders\" \
             ORDER BY \"code\" COLLATE \"C\", \"id\" LIMIT $1"
        );
    }

    #[test]
    fn test_merge_stamps_audit_columns() {
        let (source, target) = schemas();
        let write = WriteStatements::render(&plan(&source, &target, &["id"]), &target).unwrap();

        assert_eq!(
            write.merge,
            "MERGE INTO \"dst\".\"orders\" AS target USING (SELECT $1::bigint AS \"id\", \
             $2::character varying(20) AS \"code\", $3::numeric(10,2) AS \"amount\") AS source \
             ON target.\"id\" = source.\"id\" \
             WHEN MATCHED THEN UPDATE SET \"code\" = source.\"code\", \"amount\" = source.\"amount\", \
             \"modified_at\" = now() \
             WHEN NOT MATCHED THEN INSERT (\"id\", \"code\", \"amount\", \"created_at\") \
             VALUES (source.\"id\", source.\"code\", source.\"amount\", now())"
        );
        assert_eq!(write.delete, "DELETE FROM \"dst\".\"orders\" WHERE \"id\" = $1");
        assert!(write.merge_overriding.is_none());
        assert!(write.resync_identity.is_none());
    }

    #[test]
    fn test_always_identity_gets_overriding_variant() {
        let (source, mut target) = schemas();
        target.columns[0].identity = Some(IdentityKind::Always);
        let write = WriteStatements::render(&plan(&source, &target, &["id"]), &target).unwrap();

        let overriding = write.merge_overriding.unwrap();
        assert!(overriding.contains("INSERT (\"id\", \"code\", \"amount\", \"created_at\") OVERRIDING SYSTEM VALUE VALUES"));
        assert_eq!(
            write.resync_identity.unwrap(),
            "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX(\"id\"), 0) + 1, false) \
             FROM \"dst\".\"orders\""
        );
    }

    #[test]
    fn test_keys_only_table_has_no_matched_branch() {
        let source = TableSchema::new(
            QualifiedName::parse("src.tags").unwrap(),
            vec![column("tag", "text")],
        )
        .unwrap();
        let target = TableSchema::new(
            QualifiedName::parse("dst.tags").unwrap(),
            vec![column("tag", "text")],
        )
        .unwrap();
        let write = WriteStatements::render(&plan(&source, &target, &["tag"]), &target).unwrap();
        assert!(!write.merge.contains("WHEN MATCHED"));
    }

    #[test]
    fn test_suspicious_type_names_rejected() {
        assert!(checked_type("integer").is_ok());
        assert!(checked_type("\"MyEnum\"").is_ok());
        assert!(checked_type("text; DROP TABLE x").is_err());
        assert!(checked_type("").is_err());
    }

    #[test]
    fn test_collatable_types() {
        assert!(is_collatable("text"));
        assert!(is_collatable("character varying(20)"));
        assert!(is_collatable("character(3)"));
        assert!(!is_collatable("text[]"));
        assert!(!is_collatable("bigint"));
        assert!(!is_collatable("uuid"));
        assert!(!is_collatable("citext"));
    }

    #[test]
    fn test_citext_key_orders_as_bytes() {
        let schema = TableSchema::new(
            QualifiedName::parse("src.users").unwrap(),
            vec![column("email", "citext"), column("name", "text")],
        )
        .unwrap();
        let read = ReadStatements::render(&schema, &[ident("email")]).unwrap();

        assert_eq!(
            read.page_after,
            "SELECT \"email\", \"name\" FROM \"src\".\"users\" \
             WHERE (\"email\"::text COLLATE \"C\") > ($1) \
             ORDER BY \"email\"::text COLLATE \"C\" LIMIT $2"
        );
    }
}
