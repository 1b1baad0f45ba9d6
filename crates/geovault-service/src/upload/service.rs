//! Resumable multipart uploads for large files.
//!
//! `begin` opens (or resumes) a session, `accept_chunk` streams parts in
//! any order, `complete` assembles the object and records it in the File
//! Ledger. The public upload id is the Blob Store's multipart id. Session
//! creation races are settled by the Metadata Store's conditional insert
//! on the session's natural key.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use geovault_core::error::AppError;
use geovault_core::result::AppResult;
use geovault_core::traits::blob::BlobStore;
use geovault_core::traits::metadata::DocumentStore;
use geovault_core::types::checksum::{checksums_match, validate_checksum};
use geovault_core::types::name::validate_file_name;
use geovault_entity::asset::Asset;
use geovault_entity::ledger::{LEDGER_COLLECTION, LedgerEntry, blob_key};
use geovault_entity::upload::{UPLOADS_COLLECTION, UploadSession, UploadState};

use crate::access::{from_doc, owned_asset, to_doc};
use crate::context::RequestContext;
use crate::ledger::{LedgerService, require_latest_version};
use crate::version::VersionService;

/// Drives the resumable multipart protocol between a chunk-sending caller
/// and the Blob Store.
#[derive(Debug, Clone)]
pub struct UploadService {
    metadata: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    ledger: LedgerService,
    versions: VersionService,
    max_part_size_bytes: u64,
}

impl UploadService {
    pub fn new(
        metadata: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        max_part_size_bytes: u64,
    ) -> Self {
        let ledger = LedgerService::new(metadata.clone(), blobs.clone());
        let versions = VersionService::new(metadata.clone());
        Self {
            metadata,
            blobs,
            ledger,
            versions,
            max_part_size_bytes,
        }
    }

    /// Open or resume an upload session.
    ///
    /// Returns the upload id and the part numbers already committed, so a
    /// client can continue where it left off. A declared checksum that
    /// matches the file's current content is rejected up front; a live
    /// session with a different checksum is considered stale and replaced.
    pub async fn begin(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        name: &str,
        declared_checksum: &str,
    ) -> AppResult<(String, Vec<i32>)> {
        validate_file_name(name)?;
        validate_checksum(declared_checksum)?;
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;

        let latest = self.ledger.latest_entry(&asset.ledger_id, name).await?;
        if let Some(entry) = &latest {
            if checksums_match(&entry.checksum, declared_checksum) {
                return Err(AppError::conflict(format!("File already exists: {name}")));
            }
        }
        let revision = latest.map(|e| e.revision + 1).unwrap_or(1);

        let unique_key = UploadSession::unique_key(&ctx.user_id, asset_id, name);
        if let Some(doc) = self
            .metadata
            .find_by_unique_key(UPLOADS_COLLECTION, &unique_key)
            .await?
        {
            let existing: UploadSession = from_doc(doc)?;
            if checksums_match(&existing.checksum, declared_checksum) {
                debug!(
                    upload_id = %existing.multipart_id,
                    parts = existing.parts.len(),
                    "Resuming upload session"
                );
                return Ok((existing.multipart_id, existing.parts));
            }
            // Stale session for different content: discard it.
            if let Err(e) = self
                .blobs
                .abort_multipart(&existing.blob_key(), &existing.multipart_id)
                .await
            {
                warn!(upload_id = %existing.multipart_id, error = %e, "Failed to abort stale multipart upload");
            }
            self.metadata
                .delete(UPLOADS_COLLECTION, &existing.id.to_string())
                .await?;
        }

        let key = blob_key(asset_id, name, revision);
        let multipart_id = self.blobs.initiate_multipart(&key).await?;
        let session = UploadSession::new(
            ctx.user_id,
            *asset_id,
            name.to_string(),
            revision,
            declared_checksum.to_ascii_lowercase(),
            multipart_id.clone(),
        );

        let inserted = self
            .metadata
            .insert_unique(
                UPLOADS_COLLECTION,
                &session.id.to_string(),
                &unique_key,
                to_doc(&session)?,
            )
            .await?;
        if !inserted {
            // Lost the creation race. Our multipart upload is orphaned.
            if let Err(e) = self.blobs.abort_multipart(&key, &multipart_id).await {
                warn!(upload_id = %multipart_id, error = %e, "Failed to abort orphaned multipart upload");
            }
            let winner_doc = self
                .metadata
                .find_by_unique_key(UPLOADS_COLLECTION, &unique_key)
                .await?
                .ok_or_else(|| {
                    AppError::conflict(format!("Concurrent upload churn for {name}, retry"))
                })?;
            let winner: UploadSession = from_doc(winner_doc)?;
            if checksums_match(&winner.checksum, declared_checksum) {
                return Ok((winner.multipart_id, winner.parts));
            }
            return Err(AppError::conflict(format!(
                "Another upload for {name} is already in progress"
            )));
        }

        info!(
            asset = %asset.name,
            name,
            revision,
            upload_id = %session.multipart_id,
            "Started upload session"
        );
        Ok((session.multipart_id, Vec::new()))
    }

    /// Accept one chunk of an in-progress upload.
    ///
    /// Chunks are independent and idempotent per part number; they may
    /// arrive concurrently and in any order. The Blob Store enforces the
    /// chunk checksum, so a mismatching part is never persisted nor
    /// recorded.
    pub async fn accept_chunk(
        &self,
        ctx: &RequestContext,
        upload_id: &str,
        part_number: i32,
        bytes: Bytes,
        chunk_checksum: &str,
    ) -> AppResult<()> {
        if part_number < 1 {
            return Err(AppError::validation(format!(
                "part number must be positive, got {part_number}"
            )));
        }
        validate_checksum(chunk_checksum)?;
        if bytes.len() as u64 > self.max_part_size_bytes {
            return Err(AppError::validation(format!(
                "part exceeds the maximum size of {} bytes",
                self.max_part_size_bytes
            )));
        }

        let session = self.resolve_session(ctx, upload_id).await?;
        if !session.state.can_accept_part() {
            return Err(AppError::conflict(format!(
                "Upload {upload_id} cannot accept parts in state {}",
                session.state
            )));
        }

        self.blobs
            .upload_part(
                &session.blob_key(),
                &session.multipart_id,
                part_number,
                bytes,
                chunk_checksum,
            )
            .await?;

        let session_id = session.id.to_string();
        self.metadata
            .push_unique(UPLOADS_COLLECTION, &session_id, "parts", json!(part_number))
            .await?;
        if session.state == UploadState::Initiated {
            self.metadata
                .set_path(
                    UPLOADS_COLLECTION,
                    &session_id,
                    "state",
                    json!(UploadState::Accumulating.as_str()),
                )
                .await?;
        }

        debug!(upload_id, part_number, "Accepted chunk");
        Ok(())
    }

    /// Finalize an upload: assemble the object, record it in the ledger,
    /// account its size to the target version, and drop the session.
    ///
    /// The whole-object checksum is not re-verified; part checksums were
    /// enforced on the way in.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        upload_id: &str,
        target_version: i64,
    ) -> AppResult<u64> {
        let session = self.resolve_session(ctx, upload_id).await?;
        let asset = owned_asset(self.metadata.as_ref(), &session.asset_id, ctx).await?;
        // A stale target is rejected before the session or the ledger is
        // touched, so the client can retry against the current version.
        require_latest_version(&asset, target_version)?;

        if !session.state.can_complete() {
            return Err(AppError::conflict(format!(
                "Upload {upload_id} cannot be completed from state {}",
                session.state
            )));
        }
        let session_id = session.id.to_string();
        self.metadata
            .set_path(
                UPLOADS_COLLECTION,
                &session_id,
                "state",
                json!(UploadState::Completing.as_str()),
            )
            .await?;

        // Completing is provisional until the session is deleted: a
        // failure drops the session back to Accumulating.
        let size = match self.finish_completion(&asset, &session, target_version).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(revert) = self
                    .metadata
                    .set_path(
                        UPLOADS_COLLECTION,
                        &session_id,
                        "state",
                        json!(UploadState::Accumulating.as_str()),
                    )
                    .await
                {
                    warn!(upload_id, error = %revert, "Failed to revert session state after completion failure");
                }
                return Err(e);
            }
        };
        self.metadata.delete(UPLOADS_COLLECTION, &session_id).await?;

        info!(
            asset = %asset.name,
            name = %session.file_name,
            upload_id,
            bytes = size,
            "Completed upload session"
        );
        Ok(size)
    }

    /// Assemble the object, record it, and account its size.
    async fn finish_completion(
        &self,
        asset: &Asset,
        session: &UploadSession,
        target_version: i64,
    ) -> AppResult<u64> {
        let meta = self
            .blobs
            .complete_multipart(&session.blob_key(), &session.multipart_id)
            .await?;
        let size = self
            .record_assembled(asset, session, meta.size_bytes, target_version)
            .await?;
        self.versions
            .add_version_size(&asset.id, target_version, size)
            .await?;
        Ok(size)
    }

    /// Resolve a session by upload id, scoped to the calling owner.
    async fn resolve_session(
        &self,
        ctx: &RequestContext,
        upload_id: &str,
    ) -> AppResult<UploadSession> {
        let doc = self
            .metadata
            .find_one(
                UPLOADS_COLLECTION,
                &[
                    ("multipart_id", json!(upload_id)),
                    ("owner_id", json!(ctx.user_id)),
                ],
            )
            .await?;
        match doc {
            Some(doc) => from_doc(doc),
            None => Err(AppError::not_found(format!(
                "Upload id does not exist: {upload_id}"
            ))),
        }
    }

    /// Record a just-assembled object in the ledger.
    ///
    /// The latest entry is re-resolved at completion time: content that
    /// meanwhile became current is deduped (the assembled object is
    /// deleted), and a revision number that is no longer next is a
    /// conflict rather than a silent overwrite of ledger history.
    async fn record_assembled(
        &self,
        asset: &Asset,
        session: &UploadSession,
        assembled_size: u64,
        target_version: i64,
    ) -> AppResult<u64> {
        let latest = self
            .ledger
            .latest_entry(&asset.ledger_id, &session.file_name)
            .await?;
        match latest {
            Some(entry) if checksums_match(&entry.checksum, &session.checksum) => {
                if entry.revision != session.revision {
                    self.blobs.delete(&session.blob_key()).await?;
                }
                self.ledger.attach_version(&entry, target_version).await
            }
            other => {
                let expected = other.map(|e| e.revision + 1).unwrap_or(1);
                if expected != session.revision {
                    self.blobs.delete(&session.blob_key()).await?;
                    return Err(AppError::conflict(format!(
                        "Content revision for {} advanced during the upload",
                        session.file_name
                    )));
                }
                let entry = LedgerEntry::new(
                    asset.ledger_id,
                    session.file_name.clone(),
                    session.checksum.clone(),
                    assembled_size as i64,
                    session.revision,
                    target_version,
                );
                self.metadata
                    .upsert(LEDGER_COLLECTION, &entry.doc_id(), to_doc(&entry)?)
                    .await?;
                Ok(assembled_size)
            }
        }
    }
}
