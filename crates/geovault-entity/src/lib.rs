//! # geovault-entity
//!
//! Domain entity models for GeoVault. Every struct in this crate
//! represents a Metadata Store document or a domain value object. All
//! entities derive `Debug`, `Clone`, `Serialize`, and `Deserialize` —
//! they are persisted as JSON documents.

pub mod asset;
pub mod ledger;
pub mod upload;
