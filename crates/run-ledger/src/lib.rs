//! Run history for table-mirror
//!
//! Every finished reconciliation produces a [`reconcile::RunReport`]. This
//! crate keeps those reports so operators can see when each mapping last ran
//! and how it ended.
//!
//! ## Storage Backends
//!
//! - `FilesystemLedger` - One JSON file per run
//! - `NullLedger` - Discards records
//!
//! Pick one from configuration with [`LedgerStorage::open`].

mod config;
mod filesystem;
mod record;
mod store;

#[cfg(test)]
mod tests;

pub use config::LedgerStorage;
pub use filesystem::FilesystemLedger;
pub use record::RunRecord;
pub use store::{NullLedger, RunLedger};
