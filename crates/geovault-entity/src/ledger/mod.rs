//! File Ledger entities.

pub mod model;

pub use model::{LEDGER_COLLECTION, LedgerEntry, blob_key};
