//! Idle upload session reclamation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use geovault_core::result::AppResult;
use geovault_core::traits::blob::BlobStore;
use geovault_core::traits::metadata::DocumentStore;
use geovault_entity::upload::{UPLOADS_COLLECTION, UploadSession};

use crate::access::from_doc;

/// Reclaims upload sessions that have been idle past their TTL.
///
/// Sessions stay resumable until the TTL elapses; after that a sweep
/// aborts the underlying multipart upload and deletes the session
/// document. Meant to be driven by an external scheduler.
#[derive(Debug, Clone)]
pub struct SessionReconciler {
    metadata: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    ttl_hours: i64,
}

impl SessionReconciler {
    pub fn new(
        metadata: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        ttl_hours: i64,
    ) -> Self {
        Self {
            metadata,
            blobs,
            ttl_hours,
        }
    }

    /// Sweep the uploads collection once; returns the number of sessions
    /// reclaimed.
    ///
    /// An abort failure does not block the sweep of other sessions; the
    /// session document is kept so a later sweep retries the abort.
    pub async fn sweep(&self) -> AppResult<usize> {
        let now = Utc::now();
        let docs = self.metadata.find(UPLOADS_COLLECTION, &[]).await?;

        let mut reclaimed = 0;
        for doc in docs {
            let session: UploadSession = from_doc(doc)?;
            if !session.is_expired(self.ttl_hours, now) {
                continue;
            }
            if let Err(e) = self
                .blobs
                .abort_multipart(&session.blob_key(), &session.multipart_id)
                .await
            {
                warn!(
                    session_id = %session.id,
                    upload_id = %session.multipart_id,
                    error = %e,
                    "Failed to abort expired multipart upload"
                );
                continue;
            }
            if self
                .metadata
                .delete(UPLOADS_COLLECTION, &session.id.to_string())
                .await?
            {
                reclaimed += 1;
                info!(
                    session_id = %session.id,
                    name = %session.file_name,
                    "Reclaimed expired upload session"
                );
            }
        }
        Ok(reclaimed)
    }
}
