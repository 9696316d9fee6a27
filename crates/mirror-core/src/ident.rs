//! Allow-listed SQL identifiers.
//!
//! Schema, table and column names are the only text ever spliced into
//! generated statements, so every one of them passes through [`Identifier`].

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated schema, table or column name.
///
/// Accepted names start with an ASCII letter or underscore and continue with
/// ASCII letters, digits, underscores or `$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate `name` against the allow-list.
    pub fn parse(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("empty")
        } else if name.len() > MAX_IDENTIFIER_LEN {
            Some("longer than 63 bytes")
        } else if !name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            Some("must start with a letter or underscore")
        } else if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            Some("only letters, digits, '_' and '$' are allowed")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(CoreError::InvalidIdentifier { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for statement text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Identifier,
    pub table: Identifier,
}

impl QualifiedName {
    pub fn new(schema: Identifier, table: Identifier) -> Self {
        Self { schema, table }
    }

    /// Parse `schema.table`; a bare `table` lands in `public`.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name.split_once('.') {
            Some((schema, table)) => Ok(Self::new(
                Identifier::parse(schema)?,
                Identifier::parse(table)?,
            )),
            None => Ok(Self::new(Identifier::parse("public")?, Identifier::parse(name)?)),
        }
    }

    /// `"schema"."table"` for statement text.
    pub fn quoted(&self) -> String {
        format!("{}.{}", self.schema.quoted(), self.table.quoted())
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
