//! Table shape discovered from a live database at run start.

use crate::error::CoreError;
use crate::ident::{Identifier, QualifiedName};
use crate::row::RowLayout;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a database-generated identity column accepts explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Explicit values are rejected unless identity insertion is enabled
    Always,
    /// Explicit values are accepted; the generator only fills gaps
    ByDefault,
}

/// The [`Value`](crate::Value) variant a column's values are read as.
///
/// Two columns hold comparable values only when their families match:
/// `integer` and `bigint` both read as [`Value::Int`](crate::Value::Int),
/// but `numeric` reads as a decimal and never equals an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFamily {
    Bool,
    Int,
    /// Single precision, widened on read
    Real,
    Double,
    Decimal,
    Text,
    Timestamp,
    Date,
    Time,
    Uuid,
    Json,
    Bytes,
}

impl ValueFamily {
    /// Family of a backend type name such as `numeric(10,2)`.
    ///
    /// Modifiers in parentheses are ignored. Names the engine has no
    /// dedicated variant for read as text.
    pub fn of(data_type: &str) -> Self {
        let mut base = String::with_capacity(data_type.len());
        let mut depth = 0usize;
        for c in data_type.chars() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ if depth == 0 => base.push(c.to_ascii_lowercase()),
                _ => {}
            }
        }
        let base = base.split_whitespace().collect::<Vec<_>>().join(" ");

        match base.as_str() {
            "boolean" | "bool" => Self::Bool,
            "smallint" | "integer" | "bigint" | "int" | "int2" | "int4" | "int8" => Self::Int,
            "real" | "float4" => Self::Real,
            "double precision" | "float8" => Self::Double,
            "numeric" | "decimal" => Self::Decimal,
            "date" => Self::Date,
            "time" | "time without time zone" => Self::Time,
            "uuid" => Self::Uuid,
            "json" | "jsonb" => Self::Json,
            "bytea" => Self::Bytes,
            t if t.starts_with("timestamp") => Self::Timestamp,
            _ => Self::Text,
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: Identifier,
    /// Backend type name, e.g. `character varying(255)`
    pub data_type: String,
    pub nullable: bool,
    pub identity: Option<IdentityKind>,
}

impl ColumnSchema {
    pub fn new(name: Identifier, data_type: impl Into<String>) -> Self {
        Self {
            name,
            data_type: data_type.into(),
            nullable: true,
            identity: None,
        }
    }

    pub fn family(&self) -> ValueFamily {
        ValueFamily::of(&self.data_type)
    }
}

/// Columns of a table in physical order.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: QualifiedName,
    pub columns: Vec<ColumnSchema>,
    layout: Arc<RowLayout>,
}

impl TableSchema {
    pub fn new(name: QualifiedName, columns: Vec<ColumnSchema>) -> Result<Self, CoreError> {
        if columns.is_empty() {
            return Err(CoreError::Mapping(format!("table {name} has no columns")));
        }
        let layout = RowLayout::new(columns.iter().map(|c| c.name.clone()).collect())?;
        Ok(Self {
            name,
            columns,
            layout,
        })
    }

    /// Shared layout for rows read from this table.
    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.layout.contains(name)
    }

    /// First column the database generates as an identity.
    pub fn identity_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.identity.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_family_ignores_modifiers() {
        assert_eq!(ValueFamily::of("integer"), ValueFamily::of("bigint"));
        assert_eq!(ValueFamily::of("numeric(10,2)"), ValueFamily::Decimal);
        assert_eq!(ValueFamily::of("character varying(255)"), ValueFamily::Text);
        assert_eq!(
            ValueFamily::of("timestamp(3) with time zone"),
            ValueFamily::Timestamp
        );
        assert_eq!(ValueFamily::of("time without time zone"), ValueFamily::Time);
        assert_eq!(ValueFamily::of("citext"), ValueFamily::Text);
    }

    #[test]
    fn test_value_family_separates_numeric_kinds() {
        assert_ne!(ValueFamily::of("numeric"), ValueFamily::of("bigint"));
        assert_ne!(ValueFamily::of("real"), ValueFamily::of("double precision"));
        assert_ne!(ValueFamily::of("integer"), ValueFamily::of("double precision"));
    }
}
