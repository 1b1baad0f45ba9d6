//! # geovault-storage
//!
//! Blob Store client implementations for GeoVault. Supports the local
//! filesystem (default) and S3-compatible object stores behind the `s3`
//! feature.

pub mod providers;

pub use providers::local::LocalBlobStore;

#[cfg(feature = "s3")]
pub use providers::s3::S3BlobStore;
