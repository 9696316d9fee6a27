//! Core types for the table-mirror reconciliation engine.
//!
//! This crate provides the foundational types shared by the engine and the
//! database backends:
//!
//! - [`Value`] - Tagged scalar carried in every row cell
//! - [`Row`] / [`RowLayout`] - Ordered column/value pairs backed by a shared layout
//! - [`PrimaryKey`] / [`KeyProjection`] - Key extraction in declared column order
//! - [`TableSchema`] - Column shape discovered from a live table
//! - [`TableMapping`] - Source/target descriptor loaded from configuration
//! - [`Identifier`] / [`QualifiedName`] - Allow-listed SQL identifiers
//!
//! # Architecture
//!
//! ```text
//! mirror-core (this crate)
//!    │
//!    ├─── reconcile            (diff engine, merge writer, cleanup)
//!    ├─── table-mirror-postgresql (tokio-postgres backend)
//!    └─── run-ledger           (run bookkeeping)
//! ```
//!
//! # Example
//!
//! ```rust
//! use mirror_core::{KeyProjection, Row, RowLayout, Value};
//!
//! let layout = RowLayout::from_names(&["id", "val"]).unwrap();
//! let row = Row::new(layout.clone(), vec![Value::Int(5), Value::from("a")]).unwrap();
//!
//! let projection = KeyProjection::from_names(&layout, &["id"]).unwrap();
//! let key = projection.project(&row).unwrap();
//! assert_eq!(key.values(), &[Value::Int(5)]);
//! ```

pub mod error;
pub mod ident;
pub mod key;
pub mod mapping;
pub mod row;
pub mod schema;
pub mod value;

pub use error::CoreError;
pub use ident::{Identifier, QualifiedName};
pub use key::{KeyProjection, PrimaryKey};
pub use mapping::TableMapping;
pub use row::{Row, RowLayout};
pub use schema::{ColumnSchema, IdentityKind, TableSchema, ValueFamily};
pub use value::Value;
