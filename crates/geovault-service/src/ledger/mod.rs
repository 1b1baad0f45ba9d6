//! File Ledger: checksum-deduplicated content ingestion.

mod service;

pub use service::LedgerService;
pub(crate) use service::require_latest_version;
