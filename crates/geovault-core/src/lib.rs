//! # geovault-core
//!
//! Core crate for GeoVault. Contains the Blob Store and Metadata Store
//! client traits, configuration schemas, shared validation types, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other GeoVault crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
