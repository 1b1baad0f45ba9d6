//! Resumable multipart upload protocol.

mod reconciler;
mod service;

pub use reconciler::SessionReconciler;
pub use service::UploadService;
