//! Asset version management.

mod service;

pub use service::VersionService;
