//! table-mirror
//!
//! Makes PostgreSQL target tables exact mirrors of source tables. Each
//! configured mapping is reconciled in one pass: rows missing from the
//! target are inserted, rows whose values differ are updated, and target
//! rows that no longer exist in the source are deleted.
//!
//! # CLI Usage
//!
//! ```bash
//! # Mirror every mapping in the file
//! table-mirror run --config mappings.yaml \
//!   --source-uri "host=src user=app" --target-uri "host=dst user=app"
//!
//! # Only one table, without writing anything
//! table-mirror run --config mappings.yaml --table sales.orders --dry-run
//!
//! # Latest recorded run per mapping
//! table-mirror status --ledger-dir .table-mirror-runs
//! ```

use clap::Parser;
use reconcile::{RunOptions, StrategyKind, DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE};
use std::path::PathBuf;

pub mod config;
pub mod run;

pub use config::{load_mapping_groups, MappingGroup};
pub use run::{run_mappings, select_jobs, summarize, MirrorJob};

#[derive(Parser, Clone, Debug)]
pub struct ConnectionOpts {
    /// Source PostgreSQL connection string; its database name is replaced by
    /// each group's `sourceDatabase`
    #[arg(long, env = "SOURCE_URI")]
    pub source_uri: String,

    /// Target PostgreSQL connection string; its database name is replaced by
    /// each group's `targetDatabase`
    #[arg(long, env = "TARGET_URI")]
    pub target_uri: String,
}

#[derive(Parser, Clone, Debug)]
pub struct MirrorOpts {
    /// Rows per page when reading either table
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Source rows per committed chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Target lookup strategy: auto, paged, point or full-scan
    #[arg(long, default_value = "auto")]
    pub strategy: StrategyKind,

    /// Classify and count without writing or deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Only run mappings whose source or target is this table (repeatable)
    #[arg(long = "table", value_name = "SCHEMA.TABLE")]
    pub tables: Vec<String>,

    /// Number of mappings reconciled at the same time
    #[arg(long, default_value = "1")]
    pub parallel: usize,

    /// Directory to record run reports in
    #[arg(long, value_name = "DIR")]
    pub ledger_dir: Option<PathBuf>,
}

impl MirrorOpts {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            page_size: self.page_size,
            chunk_size: self.chunk_size,
            strategy: self.strategy,
            dry_run: self.dry_run,
        }
    }
}
