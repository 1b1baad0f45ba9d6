//! Catalog asset entities.

pub mod model;
pub mod version;

pub use model::{ASSETS_COLLECTION, Asset};
pub use version::Version;
