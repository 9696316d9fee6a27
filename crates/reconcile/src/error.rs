//! Error types for reconciliation runs.

use mirror_core::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the engine and its backends.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors that end a reconciliation run.
///
/// Duplicate source keys are not errors: they are classified as no-ops and
/// reported as anomalies on the [`RunReport`](crate::RunReport).
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Missing or unresolvable key columns, invalid identifiers, bad options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend failure while reading or writing
    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Row shape does not fit the mapping
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// Failure while deleting orphan rows; merged chunks stay committed
    #[error("Cleanup failed: {0}")]
    Cleanup(#[source] Box<ReconcileError>),

    /// Cancellation observed at a chunk boundary
    #[error("Run cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Wrap a backend error with the operation that raised it.
    pub fn io<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Io {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io { .. } => ErrorKind::Io,
            Self::DataShape(_) => ErrorKind::DataShape,
            Self::Cleanup(_) => ErrorKind::Cleanup,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<CoreError> for ReconcileError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidIdentifier { .. } | CoreError::Mapping(_) => {
                Self::Configuration(err.to_string())
            }
            CoreError::MissingColumn { .. } | CoreError::NullKey(_) | CoreError::RowWidth { .. } => {
                Self::DataShape(err.to_string())
            }
        }
    }
}

/// Failure category recorded in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Io,
    DataShape,
    Cleanup,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Io => "io",
            Self::DataShape => "data_shape",
            Self::Cleanup => "cleanup",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_kinds() {
        let err: ReconcileError = CoreError::NullKey("id".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::DataShape);

        let err: ReconcileError = CoreError::Mapping("bad".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_cleanup_wraps_source() {
        let err = ReconcileError::Cleanup(Box::new(ReconcileError::io("delete", "boom")));
        assert_eq!(err.kind(), ErrorKind::Cleanup);
        assert_eq!(
            err.to_string(),
            "Cleanup failed: I/O error during delete: boom"
        );
    }
}
