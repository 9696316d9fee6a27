//! Per-mapping write plan, resolved once at run start.

use crate::error::{ReconcileError, Result};
use mirror_core::{Identifier, IdentityKind, QualifiedName, TableMapping, TableSchema};
use std::collections::BTreeSet;

/// Identity column the writer must open up for explicit values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityColumn {
    pub name: Identifier,
    pub kind: IdentityKind,
}

/// Everything a backend needs to render its merge and delete statements.
///
/// Built from the mapping and the two discovered schemas. Only structural
/// identifiers end up in here; row values are bound at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub target: QualifiedName,
    /// Match columns, in declared key order
    pub key_columns: Vec<Identifier>,
    /// Columns taken from the source row, in source order
    pub insert_columns: Vec<Identifier>,
    /// Non-key insert columns, overwritten on match
    pub update_columns: Vec<Identifier>,
    /// Stamped with the current time on insert
    pub created_at: Option<Identifier>,
    /// Stamped with the current time on update
    pub modified_at: Option<Identifier>,
    pub identity: Option<IdentityColumn>,
}

impl MergePlan {
    /// Validate `mapping` against both schemas and derive the plan.
    ///
    /// Audit columns only count when the target has them and the source does
    /// not. Every remaining target column must come from the source and
    /// every source column must exist in the target with a type of the same
    /// [`ValueFamily`](mirror_core::ValueFamily).
    pub fn build(
        mapping: &TableMapping,
        source: &TableSchema,
        target: &TableSchema,
    ) -> Result<Self> {
        mapping.validate()?;

        for key in &mapping.primary_key {
            for (side, schema) in [("source", source), ("target", target)] {
                if !schema.has_column(key.as_str()) {
                    return Err(ReconcileError::Configuration(format!(
                        "primary key column '{key}' not found in {side} table {}",
                        schema.name
                    )));
                }
            }
        }

        let audit = |column: &Option<Identifier>| {
            column
                .as_ref()
                .filter(|c| target.has_column(c.as_str()) && !source.has_column(c.as_str()))
                .cloned()
        };
        let created_at = audit(&mapping.created_at_column);
        let modified_at = audit(&mapping.modified_at_column);

        let audit_columns: BTreeSet<&str> = created_at
            .iter()
            .chain(modified_at.iter())
            .map(Identifier::as_str)
            .collect();
        let source_columns: BTreeSet<&str> =
            source.columns.iter().map(|c| c.name.as_str()).collect();
        let target_columns: BTreeSet<&str> = target
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|c| !audit_columns.contains(c))
            .collect();

        if source_columns != target_columns {
            let missing_in_target: Vec<_> = source_columns.difference(&target_columns).collect();
            let missing_in_source: Vec<_> = target_columns.difference(&source_columns).collect();
            return Err(ReconcileError::DataShape(format!(
                "column sets differ for {}: missing in target {missing_in_target:?}, missing in source {missing_in_source:?}",
                mapping.label()
            )));
        }

        // Values of different families never compare equal
        for column in &source.columns {
            let Some(other) = target.column(column.name.as_str()) else {
                continue;
            };
            if column.family() == other.family() {
                continue;
            }
            let message = format!(
                "column '{}' is {} in {} but {} in {}",
                column.name, column.data_type, source.name, other.data_type, target.name
            );
            return Err(if mapping.is_key_column(column.name.as_str()) {
                ReconcileError::Configuration(format!("primary key {message}"))
            } else {
                ReconcileError::DataShape(message)
            });
        }

        let insert_columns: Vec<Identifier> =
            source.columns.iter().map(|c| c.name.clone()).collect();
        let update_columns = insert_columns
            .iter()
            .filter(|c| !mapping.is_key_column(c.as_str()))
            .cloned()
            .collect();

        let identity = match &mapping.identity_column {
            Some(name) => {
                let column = target.column(name.as_str()).ok_or_else(|| {
                    ReconcileError::Configuration(format!(
                        "identity column '{name}' not found in target table {}",
                        target.name
                    ))
                })?;
                Some(IdentityColumn {
                    name: name.clone(),
                    kind: column.identity.unwrap_or(IdentityKind::Always),
                })
            }
            None => target.identity_column().and_then(|column| {
                column.identity.map(|kind| IdentityColumn {
                    name: column.name.clone(),
                    kind,
                })
            }),
        }
        // A column the source never supplies is left to the generator.
        .filter(|identity| source.has_column(identity.name.as_str()));

        Ok(Self {
            target: target.name.clone(),
            key_columns: mapping.primary_key.clone(),
            insert_columns,
            update_columns,
            created_at,
            modified_at,
            identity,
        })
    }

    /// Whether merge statements carry explicit identity values.
    ///
    /// The insert branch names the identity column, so a database may reject
    /// the statement even when every row of the chunk ends up updating.
    pub fn needs_identity_insert(&self) -> bool {
        self.identity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::ColumnSchema;

    fn schema(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema::new(
            QualifiedName::parse(name).unwrap(),
            columns
                .iter()
                .map(|c| ColumnSchema::new(Identifier::parse(*c).unwrap(), "text"))
                .collect(),
        )
        .unwrap()
    }

    fn mapping(keys: &[&str]) -> TableMapping {
        TableMapping::new(
            QualifiedName::parse("src.items").unwrap(),
            QualifiedName::parse("dst.items").unwrap(),
            keys.iter().map(|k| Identifier::parse(*k).unwrap()).collect(),
        )
    }

    #[test]
    fn test_build_with_audit_columns() {
        let source = schema("src.items", &["id", "name", "price"]);
        let target = schema("dst.items", &["id", "name", "price", "created_at", "modified_at"]);

        let plan = MergePlan::build(&mapping(&["id"]), &source, &target).unwrap();
        assert_eq!(plan.target.to_string(), "dst.items");
        assert_eq!(plan.insert_columns.len(), 3);
        assert_eq!(
            plan.update_columns.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            vec!["name", "price"]
        );
        assert_eq!(plan.created_at.as_ref().unwrap().as_str(), "created_at");
        assert_eq!(plan.modified_at.as_ref().unwrap().as_str(), "modified_at");
        assert!(plan.identity.is_none());
    }

    #[test]
    fn test_audit_column_in_source_is_plain_data() {
        let source = schema("src.items", &["id", "created_at"]);
        let target = schema("dst.items", &["id", "created_at"]);

        let plan = MergePlan::build(&mapping(&["id"]), &source, &target).unwrap();
        assert!(plan.created_at.is_none());
        assert!(plan.modified_at.is_none());
        assert_eq!(plan.update_columns.len(), 1);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let source = schema("src.items", &["id", "name"]);
        let target = schema("dst.items", &["id", "name"]);

        let err = MergePlan::build(&mapping(&["code"]), &source, &target).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }

    #[test]
    fn test_column_mismatch_is_data_shape_error() {
        let source = schema("src.items", &["id", "name", "extra"]);
        let target = schema("dst.items", &["id", "name"]);

        let err = MergePlan::build(&mapping(&["id"]), &source, &target).unwrap_err();
        assert!(matches!(err, ReconcileError::DataShape(_)));
    }

    fn typed(name: &str, columns: &[(&str, &str)]) -> TableSchema {
        TableSchema::new(
            QualifiedName::parse(name).unwrap(),
            columns
                .iter()
                .map(|(c, t)| ColumnSchema::new(Identifier::parse(*c).unwrap(), *t))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_key_type_family_mismatch_is_configuration_error() {
        let source = typed("src.items", &[("id", "numeric"), ("val", "text")]);
        let target = typed("dst.items", &[("id", "bigint"), ("val", "text")]);

        let err = MergePlan::build(&mapping(&["id"]), &source, &target).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
        assert!(err.to_string().contains("'id' is numeric"), "{err}");
    }

    #[test]
    fn test_column_type_family_mismatch_is_data_shape_error() {
        let source = typed("src.items", &[("id", "bigint"), ("ratio", "real")]);
        let target = typed("dst.items", &[("id", "bigint"), ("ratio", "double precision")]);

        let err = MergePlan::build(&mapping(&["id"]), &source, &target).unwrap_err();
        assert!(matches!(err, ReconcileError::DataShape(_)));
    }

    #[test]
    fn test_widths_within_a_family_are_compatible() {
        let source = typed(
            "src.items",
            &[("id", "integer"), ("code", "character varying(10)"), ("n", "numeric(8,2)")],
        );
        let target = typed(
            "dst.items",
            &[("id", "bigint"), ("code", "text"), ("n", "numeric(12,4)")],
        );

        assert!(MergePlan::build(&mapping(&["id"]), &source, &target).is_ok());
    }

    #[test]
    fn test_identity_from_catalog() {
        let source = schema("src.items", &["id", "name"]);
        let mut target = schema("dst.items", &["id", "name"]);
        target.columns[0].identity = Some(IdentityKind::Always);

        let plan = MergePlan::build(&mapping(&["id"]), &source, &target).unwrap();
        let identity = plan.identity.clone().unwrap();
        assert_eq!(identity.name.as_str(), "id");
        assert_eq!(identity.kind, IdentityKind::Always);
        assert!(plan.needs_identity_insert());
    }

    #[test]
    fn test_identity_override_must_exist() {
        let source = schema("src.items", &["id", "name"]);
        let target = schema("dst.items", &["id", "name"]);
        let mut mapping = mapping(&["id"]);
        mapping.identity_column = Some(Identifier::parse("row_no").unwrap());

        let err = MergePlan::build(&mapping, &source, &target).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }
}
