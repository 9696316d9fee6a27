//! Table reconciliation engine.
//!
//! Makes a target table an exact mirror of a source table: missing rows are
//! inserted, changed rows updated, and rows absent from the source deleted.
//! Both tables are read as key-ordered pages, so neither needs to fit in
//! memory.
//!
//! # Data Flow
//!
//! ```text
//! SourceStream ──► ChangeDetector ──► chunk ──► MergeWriter ──► commit
//!                        │                                        │
//!                  TargetLookup                       (run completed)
//!            (paged cache / point / full scan)                    │
//!                                                                 ▼
//!                                 ProcessedKeySet ──► remove_orphans
//! ```
//!
//! Backends implement [`SourceTable`], [`TargetTable`] and [`TargetWriter`];
//! [`memory::MemoryTable`] is an in-memory implementation.
//!
//! # Example
//!
//! ```rust
//! use mirror_core::{Identifier, QualifiedName, TableMapping, Value};
//! use reconcile::{memory::MemoryTable, Reconciler, RunOptions};
//!
//! # tokio_test::block_on(async {
//! let source = MemoryTable::from_names("src.items", &["id", "name"], &["id"]).unwrap();
//! let target = MemoryTable::from_names("dst.items", &["id", "name"], &["id"]).unwrap();
//! source.seed(vec![Value::Int(1), Value::from("a")]).await.unwrap();
//! target.seed(vec![Value::Int(9), Value::from("z")]).await.unwrap();
//!
//! let mapping = TableMapping::new(
//!     QualifiedName::parse("src.items").unwrap(),
//!     QualifiedName::parse("dst.items").unwrap(),
//!     vec![Identifier::parse("id").unwrap()],
//! );
//! let report = Reconciler::new(&mapping, &source, &target, RunOptions::default())
//!     .run()
//!     .await;
//!
//! assert!(report.is_success());
//! assert_eq!(report.counts.inserted, 1);
//! assert_eq!(report.counts.deleted, 1);
//! # });
//! ```

pub mod cache;
pub mod cleanup;
pub mod detector;
pub mod error;
pub mod lookup;
pub mod memory;
pub mod plan;
pub mod run;
pub mod stream;
pub mod table;
pub mod tracker;
pub mod writer;

pub use cache::PagedTargetCache;
pub use cleanup::remove_orphans;
pub use detector::{ChangeDetector, Classification, DuplicateLog, NoOpReason};
pub use error::{ErrorKind, ReconcileError, Result};
pub use lookup::{select_lookup, FullScanLookup, PointLookup, StrategyKind, TargetLookup};
pub use plan::{IdentityColumn, MergePlan};
pub use run::{
    Reconciler, RunCounts, RunOptions, RunOutcome, RunReport, RunState, DEFAULT_CHUNK_SIZE,
    DEFAULT_PAGE_SIZE,
};
pub use stream::SourceStream;
pub use table::{SourceTable, TargetTable, TargetWriter};
pub use tracker::ProcessedKeySet;
pub use writer::{ChunkOutcome, MergeWriter};
