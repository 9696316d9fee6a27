//! Error types for core row and mapping handling.

use thiserror::Error;

/// Errors raised while building or projecting core types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Identifier rejected by the allow-list
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// Column not present in a row layout
    #[error("Column '{column}' not found in {scope}")]
    MissingColumn { scope: String, column: String },

    /// Primary key column holds NULL
    #[error("Primary key column '{0}' is null")]
    NullKey(String),

    /// Row width does not match its layout
    #[error("Row has {actual} values but layout has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    /// Malformed mapping descriptor
    #[error("Mapping error: {0}")]
    Mapping(String),
}
