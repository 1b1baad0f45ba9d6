//! # geovault-metadata
//!
//! Metadata Store client for GeoVault, backed by SQLite. Documents are
//! JSON bodies in a single `documents` table; counter and set mutations
//! execute as single UPDATE statements so they stay atomic under
//! concurrent access.

pub mod connection;
pub mod store;

pub use connection::{create_pool, ensure_schema, health_check};
pub use store::SqliteDocumentStore;
