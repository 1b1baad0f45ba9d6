//! Upload session entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::UploadState;
use crate::ledger;

/// Collection name for upload session documents.
pub const UPLOADS_COLLECTION: &str = "uploads";

/// Server-side state of an in-progress resumable multipart upload.
///
/// A session weakly references its asset: deleting the asset does not
/// cascade. Sessions are keyed uniquely on `(owner, asset, file name)` so
/// that creation races resolve to a single winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: Uuid,
    /// The user performing the upload.
    pub owner_id: Uuid,
    /// Target asset.
    pub asset_id: Uuid,
    /// Target file name within the asset.
    pub file_name: String,
    /// The content revision this upload will create.
    pub revision: i64,
    /// Declared SHA-256 checksum of the whole file.
    pub checksum: String,
    /// Blob Store multipart upload handle. This doubles as the public
    /// upload id handed to the client.
    pub multipart_id: String,
    /// Committed part numbers.
    pub parts: Vec<i32>,
    /// Current session state.
    pub state: UploadState,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session last made progress. Drives the TTL sweep.
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Create a fresh session with no committed parts.
    pub fn new(
        owner_id: Uuid,
        asset_id: Uuid,
        file_name: String,
        revision: i64,
        checksum: String,
        multipart_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            asset_id,
            file_name,
            revision,
            checksum,
            multipart_id,
            parts: Vec::new(),
            state: UploadState::Initiated,
            created_at: now,
            updated_at: now,
        }
    }

    /// The natural unique key for a session.
    pub fn unique_key(owner_id: &Uuid, asset_id: &Uuid, file_name: &str) -> String {
        format!("{owner_id}/{asset_id}/{file_name}")
    }

    /// The blob key this session's parts will assemble into.
    pub fn blob_key(&self) -> String {
        ledger::blob_key(&self.asset_id, &self.file_name, self.revision)
    }

    /// Whether the session has been idle longer than `ttl_hours`.
    pub fn is_expired(&self, ttl_hours: i64, now: DateTime<Utc>) -> bool {
        now - self.updated_at > chrono::Duration::hours(ttl_hours)
    }
}
