//! Asset catalog operations.

mod service;

pub use service::AssetService;
