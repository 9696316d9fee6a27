//! Primary-key projection.

use crate::error::CoreError;
use crate::ident::Identifier;
use crate::row::{Row, RowLayout};
use crate::value::Value;
use std::fmt;

/// Values of a row's key columns, in the mapping's declared order.
///
/// Source and target build their own [`KeyProjection`] from their own
/// layouts but with the same declared column order, so keys taken from
/// either side compare, order and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimaryKey(Vec<Value>);

impl PrimaryKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<Value> for PrimaryKey {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

/// Positions of the key columns within one table's layout.
#[derive(Debug, Clone)]
pub struct KeyProjection {
    columns: Vec<Identifier>,
    positions: Vec<usize>,
}

impl KeyProjection {
    pub fn new(layout: &RowLayout, key_columns: &[Identifier]) -> Result<Self, CoreError> {
        if key_columns.is_empty() {
            return Err(CoreError::Mapping(
                "at least one primary key column is required".to_string(),
            ));
        }
        let positions = key_columns
            .iter()
            .map(|column| {
                layout
                    .position(column.as_str())
                    .ok_or_else(|| CoreError::MissingColumn {
                        scope: "row layout".to_string(),
                        column: column.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            columns: key_columns.to_vec(),
            positions,
        })
    }

    pub fn from_names(layout: &RowLayout, key_columns: &[&str]) -> Result<Self, CoreError> {
        let columns = key_columns
            .iter()
            .map(|c| Identifier::parse(*c))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(layout, &columns)
    }

    pub fn columns(&self) -> &[Identifier] {
        &self.columns
    }

    /// Extract the key of `row`. Rows from a foreign layout are matched by
    /// column name; a missing or null key column is an error.
    pub fn project(&self, row: &Row) -> Result<PrimaryKey, CoreError> {
        let columns = row.layout().columns();

        let mut values = Vec::with_capacity(self.columns.len());
        for (column, position) in self.columns.iter().zip(&self.positions) {
            let value = if columns.get(*position) == Some(column) {
                &row.values()[*position]
            } else {
                row.get(column.as_str())
                    .ok_or_else(|| CoreError::MissingColumn {
                        scope: "row".to_string(),
                        column: column.to_string(),
                    })?
            };
            if value.is_null() {
                return Err(CoreError::NullKey(column.to_string()));
            }
            values.push(value.clone());
        }
        Ok(PrimaryKey(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_follows_declared_order() {
        let source = RowLayout::from_names(&["a", "b", "v"]).unwrap();
        let target = RowLayout::from_names(&["v", "b", "a"]).unwrap();

        let src_row = Row::new(source.clone(), vec![1.into(), "x".into(), "s".into()]).unwrap();
        let tgt_row = Row::new(target.clone(), vec!["t".into(), "x".into(), 1.into()]).unwrap();

        let src_key = KeyProjection::from_names(&source, &["a", "b"])
            .unwrap()
            .project(&src_row)
            .unwrap();
        let tgt_key = KeyProjection::from_names(&target, &["a", "b"])
            .unwrap()
            .project(&tgt_row)
            .unwrap();

        assert_eq!(src_key, tgt_key);
        assert_eq!(src_key.to_string(), "(1, 'x')");
    }

    #[test]
    fn test_null_key_rejected() {
        let layout = RowLayout::from_names(&["id", "v"]).unwrap();
        let row = Row::new(layout.clone(), vec![Value::Null, "s".into()]).unwrap();
        let err = KeyProjection::from_names(&layout, &["id"])
            .unwrap()
            .project(&row)
            .unwrap_err();
        assert_eq!(err, CoreError::NullKey("id".to_string()));
    }

    #[test]
    fn test_unknown_key_column_rejected() {
        let layout = RowLayout::from_names(&["id"]).unwrap();
        assert!(matches!(
            KeyProjection::from_names(&layout, &["code"]),
            Err(CoreError::MissingColumn { .. })
        ));
        assert!(matches!(
            KeyProjection::from_names(&layout, &[]),
            Err(CoreError::Mapping(_))
        ));
    }

    #[test]
    fn test_foreign_row_missing_key_column() {
        let layout = RowLayout::from_names(&["id", "v"]).unwrap();
        let projection = KeyProjection::from_names(&layout, &["id"]).unwrap();
        let other = RowLayout::from_names(&["v"]).unwrap();
        let row = Row::new(other, vec!["s".into()]).unwrap();
        assert!(matches!(
            projection.project(&row),
            Err(CoreError::MissingColumn { .. })
        ));
    }
}
