//! Table mapping descriptors.

use crate::error::CoreError;
use crate::ident::{Identifier, QualifiedName};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_created_at() -> Option<Identifier> {
    Identifier::parse("created_at").ok()
}

fn default_modified_at() -> Option<Identifier> {
    Identifier::parse("modified_at").ok()
}

/// Describes one source table and the target table that mirrors it.
///
/// # JSON Format
///
/// ```json
/// {
///   "sourceSchema": "dbo",
///   "sourceTable": "Orders",
///   "targetSchema": "bronze",
///   "targetTable": "Orders",
///   "primaryKey": ["OrderId"],
///   "lastModifiedColumn": "UpdatedAt"
/// }
/// ```
///
/// `createdAtColumn` and `modifiedAtColumn` default to `created_at` and
/// `modified_at`; set them to `null` to disable stamping. They are only
/// stamped when the target has the column and the source does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub source_schema: Identifier,
    pub source_table: Identifier,
    pub target_schema: Identifier,
    pub target_table: Identifier,
    /// Key columns in comparison order
    pub primary_key: Vec<Identifier>,
    /// Column whose strictly newer source value forces an update
    #[serde(default)]
    pub last_modified_column: Option<Identifier>,
    #[serde(default = "default_created_at")]
    pub created_at_column: Option<Identifier>,
    #[serde(default = "default_modified_at")]
    pub modified_at_column: Option<Identifier>,
    /// Identity column override when the catalog does not report one
    #[serde(default)]
    pub identity_column: Option<Identifier>,
}

impl TableMapping {
    /// Mapping with default policy fields.
    pub fn new(
        source: QualifiedName,
        target: QualifiedName,
        primary_key: Vec<Identifier>,
    ) -> Self {
        Self {
            source_schema: source.schema,
            source_table: source.table,
            target_schema: target.schema,
            target_table: target.table,
            primary_key,
            last_modified_column: None,
            created_at_column: default_created_at(),
            modified_at_column: default_modified_at(),
            identity_column: None,
        }
    }

    pub fn source(&self) -> QualifiedName {
        QualifiedName::new(self.source_schema.clone(), self.source_table.clone())
    }

    pub fn target(&self) -> QualifiedName {
        QualifiedName::new(self.target_schema.clone(), self.target_table.clone())
    }

    /// `source -> target`, used to label logs and run reports.
    pub fn label(&self) -> String {
        format!("{} -> {}", self.source(), self.target())
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k.as_str() == column)
    }

    /// Structural checks that need no database access.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.primary_key.is_empty() {
            return Err(CoreError::Mapping(format!(
                "{}: primaryKey must list at least one column",
                self.label()
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.primary_key {
            if !seen.insert(column.as_str()) {
                return Err(CoreError::Mapping(format!(
                    "{}: primary key column '{column}' listed twice",
                    self.label()
                )));
            }
        }

        for audit in [&self.created_at_column, &self.modified_at_column]
            .into_iter()
            .flatten()
        {
            if self.is_key_column(audit.as_str()) {
                return Err(CoreError::Mapping(format!(
                    "{}: audit column '{audit}' cannot be a key column",
                    self.label()
                )));
            }
        }

        if let (Some(created), Some(modified)) = (&self.created_at_column, &self.modified_at_column)
        {
            if created == modified {
                return Err(CoreError::Mapping(format!(
                    "{}: createdAtColumn and modifiedAtColumn must differ",
                    self.label()
                )));
            }
        }

        Ok(())
    }
}
