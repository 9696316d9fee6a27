//! Ledger selection.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{FilesystemLedger, NullLedger, RunLedger};

/// Where run records go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerStorage {
    /// Records are dropped
    #[default]
    Disabled,
    /// One JSON file per run under `dir`
    Filesystem { dir: PathBuf },
}

impl LedgerStorage {
    /// Filesystem storage when `dir` is given, otherwise disabled.
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => Self::Filesystem { dir },
            None => Self::Disabled,
        }
    }

    pub fn open(&self) -> Box<dyn RunLedger> {
        match self {
            Self::Disabled => Box::new(NullLedger),
            Self::Filesystem { dir } => Box::new(FilesystemLedger::new(dir.clone())),
        }
    }
}
