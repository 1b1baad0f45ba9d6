//! # geovault-service
//!
//! Business logic for versioned, content-addressed file ingestion:
//! the File Ledger (checksum dedup), the resumable upload protocol, asset
//! version management, and the asset catalog operations they hang off.
//!
//! Services are stateless. Every public operation runs in the caller's
//! task, takes a [`context::RequestContext`] resolved by the caller, and
//! talks to the Blob Store and Metadata Store through the trait objects in
//! `geovault-core`. Failures surface unhandled; nothing retries
//! internally.

pub mod access;
pub mod asset;
pub mod context;
pub mod ledger;
pub mod upload;
pub mod version;

pub use asset::AssetService;
pub use context::RequestContext;
pub use ledger::LedgerService;
pub use upload::{SessionReconciler, UploadService};
pub use version::VersionService;
