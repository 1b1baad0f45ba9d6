//! External collaborator traits.
//!
//! GeoVault talks to two external stores: an immutable byte store keyed by
//! object name ([`blob::BlobStore`]) and a document store with atomic
//! update primitives ([`metadata::DocumentStore`]). Both are defined here
//! in `geovault-core` and implemented in `geovault-storage` and
//! `geovault-metadata` respectively.

pub mod blob;
pub mod metadata;
