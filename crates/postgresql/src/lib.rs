//! PostgreSQL backend for the reconciliation engine.
//!
//! [`PgTable`] implements both [`reconcile::SourceTable`] and
//! [`reconcile::TargetTable`] over one table of a live database, reading by
//! keyset pagination and writing through a `MERGE` statement per row inside
//! a [`PgTargetWriter`] transaction.
//!
//! Requires PostgreSQL 15 or later for `MERGE`.

mod client;
mod schema;
mod sql;
mod table;
mod value;
mod writer;

pub use client::{new_postgresql_client, SharedClient};
pub use schema::{describe_table, estimate_rows};
pub use sql::{ReadStatements, WriteStatements};
pub use table::PgTable;
pub use value::{convert_postgres_value, convert_row, PgParam};
pub use writer::PgTargetWriter;
