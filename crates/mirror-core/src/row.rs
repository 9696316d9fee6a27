//! Row representation backed by a shared per-table layout.

use crate::error::CoreError;
use crate::ident::Identifier;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column names of a table in their physical order, with a name index.
///
/// A layout is built once per table at run start and shared by every row
/// read from that table.
#[derive(Debug, PartialEq, Eq)]
pub struct RowLayout {
    columns: Vec<Identifier>,
    index: HashMap<String, usize>,
}

impl RowLayout {
    pub fn new(columns: Vec<Identifier>) -> Result<Arc<Self>, CoreError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if index.insert(column.to_string(), position).is_some() {
                return Err(CoreError::Mapping(format!(
                    "column '{column}' appears more than once"
                )));
            }
        }
        Ok(Arc::new(Self { columns, index }))
    }

    /// Convenience constructor validating plain names.
    pub fn from_names(names: &[&str]) -> Result<Arc<Self>, CoreError> {
        let columns = names
            .iter()
            .map(|name| Identifier::parse(*name))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }

    pub fn columns(&self) -> &[Identifier] {
        &self.columns
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One table row: values positioned by a shared [`RowLayout`].
#[derive(Debug, Clone)]
pub struct Row {
    layout: Arc<RowLayout>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(layout: Arc<RowLayout>, values: Vec<Value>) -> Result<Self, CoreError> {
        if layout.len() != values.len() {
            return Err(CoreError::RowWidth {
                expected: layout.len(),
                actual: values.len(),
            });
        }
        Ok(Self { layout, values })
    }

    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.layout.position(column).map(|i| &self.values[i])
    }

    /// Replace the value of `column`, returning the previous one.
    pub fn set(&mut self, column: &str, value: Value) -> Option<Value> {
        let position = self.layout.position(column)?;
        Some(std::mem::replace(&mut self.values[position], value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Value)> {
        self.layout.columns().iter().zip(self.values.iter())
    }

    /// A row with no columns carries nothing to reconcile.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Row {
    /// Rows are equal when they hold the same column/value pairs, in order.
    fn eq(&self, other: &Self) -> bool {
        self.layout.columns() == other.layout.columns() && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_name() {
        let layout = RowLayout::from_names(&["id", "name"]).unwrap();
        let row = Row::new(layout, vec![Value::Int(1), Value::from("x")]).unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("x")));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let layout = RowLayout::from_names(&["id", "name"]).unwrap();
        let err = Row::new(layout, vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err, CoreError::RowWidth { expected: 2, actual: 1 });
    }

    #[test]
    fn test_duplicate_column_rejected() {
        assert!(RowLayout::from_names(&["id", "id"]).is_err());
    }

    #[test]
    fn test_set_replaces_value() {
        let layout = RowLayout::from_names(&["id", "name"]).unwrap();
        let mut row = Row::new(layout, vec![Value::Int(1), Value::from("x")]).unwrap();
        let old = row.set("name", Value::from("y"));
        assert_eq!(old, Some(Value::from("x")));
        assert_eq!(row.get("name"), Some(&Value::from("y")));
        assert_eq!(row.set("nope", Value::Null), None);
    }
}
