//! Resumable upload session entities.

pub mod session;
pub mod state;

pub use session::{UPLOADS_COLLECTION, UploadSession};
pub use state::UploadState;
