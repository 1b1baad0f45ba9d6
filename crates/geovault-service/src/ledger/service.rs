//! The dedup engine.
//!
//! Each asset owns a File Ledger: one entry per distinct content revision
//! of a named file, plus the set of asset versions that content satisfies.
//! Ingesting a checksum that matches the latest revision transfers no
//! bytes; a new checksum stores a new blob at the next revision and never
//! touches prior entries.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use geovault_core::error::AppError;
use geovault_core::result::AppResult;
use geovault_core::traits::blob::BlobStore;
use geovault_core::traits::metadata::DocumentStore;
use geovault_core::types::checksum::{checksums_match, validate_checksum};
use geovault_core::types::name::validate_file_name;
use geovault_entity::asset::Asset;
use geovault_entity::ledger::{LEDGER_COLLECTION, LedgerEntry, blob_key};

use crate::access::{check_readable, from_doc, load_asset, owned_asset, to_doc};
use crate::context::RequestContext;
use crate::version::VersionService;

/// File Ledger operations: ingest bytes with dedup, attach existing
/// content to further versions.
#[derive(Debug, Clone)]
pub struct LedgerService {
    metadata: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    versions: VersionService,
}

impl LedgerService {
    pub fn new(metadata: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let versions = VersionService::new(metadata.clone());
        Self {
            metadata,
            blobs,
            versions,
        }
    }

    /// Ingest a small file directly.
    ///
    /// Returns the file's logical size, which is also reported into the
    /// target version's declared total. A deduped file still counts: size
    /// reflects logical membership, not incremental storage.
    pub async fn ingest(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        name: &str,
        bytes: Bytes,
        declared_checksum: &str,
        target_version: i64,
    ) -> AppResult<u64> {
        validate_file_name(name)?;
        validate_checksum(declared_checksum)?;
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        require_latest_version(&asset, target_version)?;

        let latest = self.latest_entry(&asset.ledger_id, name).await?;
        let size = match latest {
            Some(entry) if checksums_match(&entry.checksum, declared_checksum) => {
                self.attach_version(&entry, target_version).await?
            }
            other => {
                let revision = other.map(|e| e.revision + 1).unwrap_or(1);
                self.store_revision(
                    &asset,
                    name,
                    bytes,
                    declared_checksum,
                    revision,
                    target_version,
                )
                .await?
            }
        };

        self.versions
            .add_version_size(asset_id, target_version, size)
            .await?;
        Ok(size)
    }

    /// Attach an already-stored content revision to a further version with
    /// zero data transfer.
    pub async fn ingest_existing(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        name: &str,
        declared_checksum: &str,
        target_version: i64,
    ) -> AppResult<u64> {
        validate_file_name(name)?;
        validate_checksum(declared_checksum)?;
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        require_latest_version(&asset, target_version)?;

        let entry = self
            .entries(&asset.ledger_id, name)
            .await?
            .into_iter()
            .find(|e| checksums_match(&e.checksum, declared_checksum))
            .ok_or_else(|| AppError::not_found(format!("File not found: {name}")))?;

        let key = blob_key(asset_id, name, entry.revision);
        if !self.blobs.exists(&key).await? {
            return Err(AppError::not_found(format!("File not found: {name}")));
        }

        let size = self.attach_version(&entry, target_version).await?;
        self.versions
            .add_version_size(asset_id, target_version, size)
            .await?;
        Ok(size)
    }

    /// The full content history of a named file, oldest revision first.
    pub async fn file_history(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        name: &str,
    ) -> AppResult<Vec<LedgerEntry>> {
        let asset = load_asset(self.metadata.as_ref(), asset_id).await?;
        check_readable(&asset, ctx)?;
        self.entries(&asset.ledger_id, name).await
    }

    /// The ledger entries whose content satisfies a given asset version,
    /// sorted by name then revision.
    pub async fn version_files(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        version_id: i64,
    ) -> AppResult<Vec<LedgerEntry>> {
        let asset = load_asset(self.metadata.as_ref(), asset_id).await?;
        check_readable(&asset, ctx)?;
        require_version(&asset, version_id)?;

        let docs = self
            .metadata
            .find(LEDGER_COLLECTION, &[("ledger_id", json!(asset.ledger_id))])
            .await?;
        let mut entries = docs
            .into_iter()
            .map(from_doc)
            .collect::<AppResult<Vec<LedgerEntry>>>()?;
        entries.retain(|e| e.satisfies(version_id));
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.revision.cmp(&b.revision)));
        Ok(entries)
    }

    /// All ledger entries for a `(ledger, name)` pair, sorted by revision.
    async fn entries(&self, ledger_id: &Uuid, name: &str) -> AppResult<Vec<LedgerEntry>> {
        let docs = self
            .metadata
            .find(
                LEDGER_COLLECTION,
                &[("ledger_id", json!(ledger_id)), ("name", json!(name))],
            )
            .await?;
        let mut entries = docs
            .into_iter()
            .map(from_doc)
            .collect::<AppResult<Vec<LedgerEntry>>>()?;
        entries.sort_by_key(|e| e.revision);
        Ok(entries)
    }

    /// The authoritative (highest-revision) entry for a file, if any.
    pub(crate) async fn latest_entry(
        &self,
        ledger_id: &Uuid,
        name: &str,
    ) -> AppResult<Option<LedgerEntry>> {
        Ok(self.entries(ledger_id, name).await?.pop())
    }

    /// Idempotently add `target_version` to an entry's membership set and
    /// return the entry's size.
    pub(crate) async fn attach_version(
        &self,
        entry: &LedgerEntry,
        target_version: i64,
    ) -> AppResult<u64> {
        self.metadata
            .push_unique(
                LEDGER_COLLECTION,
                &entry.doc_id(),
                "versions",
                json!(target_version),
            )
            .await?;
        debug!(
            name = %entry.name,
            revision = entry.revision,
            target_version,
            "Attached existing content revision"
        );
        Ok(entry.size_bytes as u64)
    }

    /// Store new content bytes as revision `revision` of `name`.
    ///
    /// The stored checksum is compared against the declaration; on
    /// mismatch the blob is deleted before the conflict is raised so no
    /// unverifiable object survives.
    async fn store_revision(
        &self,
        asset: &Asset,
        name: &str,
        bytes: Bytes,
        declared_checksum: &str,
        revision: i64,
        target_version: i64,
    ) -> AppResult<u64> {
        let key = blob_key(&asset.id, name, revision);
        let meta = self.blobs.put(&key, bytes).await?;

        let stored = meta.checksum_sha256.as_deref().unwrap_or_default();
        if !checksums_match(stored, declared_checksum) {
            self.blobs.delete(&key).await?;
            return Err(AppError::conflict(format!(
                "Checksum mismatch for {name}: declared {declared_checksum}, stored {stored}"
            )));
        }

        let entry = LedgerEntry::new(
            asset.ledger_id,
            name.to_string(),
            declared_checksum.to_ascii_lowercase(),
            meta.size_bytes as i64,
            revision,
            target_version,
        );
        self.metadata
            .upsert(LEDGER_COLLECTION, &entry.doc_id(), to_doc(&entry)?)
            .await?;

        info!(
            asset = %asset.name,
            name,
            revision,
            bytes = meta.size_bytes,
            "Ingested content revision"
        );
        Ok(meta.size_bytes)
    }
}

/// Fail not-found when `target_version` is not an existing version.
pub(crate) fn require_version(asset: &Asset, target_version: i64) -> AppResult<()> {
    if asset.version(target_version).is_none() {
        return Err(AppError::not_found(format!(
            "Version {target_version} of asset {} not found",
            asset.name
        )));
    }
    Ok(())
}

/// Fail unless `target_version` exists and is the asset's latest version.
///
/// Ingestion paths check this before touching the blob store or the
/// ledger, so a stale target is rejected with no partial state left
/// behind.
pub(crate) fn require_latest_version(asset: &Asset, target_version: i64) -> AppResult<()> {
    require_version(asset, target_version)?;
    let latest = asset.latest_version_id().unwrap_or(0);
    if target_version != latest {
        return Err(AppError::conflict(format!(
            "Version {target_version} of asset {} is not the latest version ({latest})",
            asset.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetService;
    use geovault_core::error::ErrorKind;
    use geovault_core::types::checksum::sha256_hex;
    use geovault_metadata::{SqliteDocumentStore, create_pool, ensure_schema};
    use geovault_storage::LocalBlobStore;

    struct Harness {
        _dir: tempfile::TempDir,
        ledger: LedgerService,
        versions: VersionService,
        blobs: Arc<dyn BlobStore>,
        ctx: RequestContext,
        asset: Asset,
    }

    async fn setup() -> Harness {
        let config = geovault_core::config::MetadataConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_timeout_seconds: 5,
        };
        let pool = create_pool(&config).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        let metadata: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool));

        let dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(
            LocalBlobStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );

        let ctx = RequestContext::new(Uuid::new_v4());
        let asset = AssetService::new(metadata.clone())
            .create_asset(&ctx, "landsat-scenes")
            .await
            .unwrap();
        let versions = VersionService::new(metadata.clone());
        versions.create_version(&ctx, &asset.id).await.unwrap();

        Harness {
            _dir: dir,
            ledger: LedgerService::new(metadata, blobs.clone()),
            versions,
            blobs,
            ctx,
            asset,
        }
    }

    #[tokio::test]
    async fn test_first_ingest_creates_revision_one() {
        let h = setup().await;
        let data = Bytes::from("scene pixels");
        let checksum = sha256_hex(&data);

        let size = h
            .ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data, &checksum, 1)
            .await
            .unwrap();
        assert_eq!(size, 12);

        let entry = h
            .ledger
            .latest_entry(&h.asset.ledger_id, "a.tif")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.revision, 1);
        assert_eq!(entry.versions, vec![1]);

        let key = blob_key(&h.asset.id, "a.tif", 1);
        assert!(h.blobs.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_deletes_blob() {
        let h = setup().await;
        let err = h
            .ledger
            .ingest(
                &h.ctx,
                &h.asset.id,
                "a.tif",
                Bytes::from("pixels"),
                &sha256_hex(b"different"),
                1,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let key = blob_key(&h.asset.id, "a.tif", 1);
        assert!(!h.blobs.exists(&key).await.unwrap());
        assert!(
            h.ledger
                .latest_entry(&h.asset.ledger_id, "a.tif")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_dedup_attaches_without_new_blob() {
        let h = setup().await;
        let data = Bytes::from("scene pixels");
        let checksum = sha256_hex(&data);

        h.ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data.clone(), &checksum, 1)
            .await
            .unwrap();
        h.versions.create_version(&h.ctx, &h.asset.id).await.unwrap();

        let size = h
            .ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data, &checksum, 2)
            .await
            .unwrap();
        assert_eq!(size, 12);

        let entry = h
            .ledger
            .latest_entry(&h.asset.ledger_id, "a.tif")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.revision, 1);
        assert_eq!(entry.versions, vec![1, 2]);
        assert!(
            !h.blobs
                .exists(&blob_key(&h.asset.id, "a.tif", 2))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_changed_content_gets_next_revision() {
        let h = setup().await;
        let first = Bytes::from("v1 pixels");
        h.ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", first.clone(), &sha256_hex(&first), 1)
            .await
            .unwrap();
        h.versions.create_version(&h.ctx, &h.asset.id).await.unwrap();

        let second = Bytes::from("v2 pixels!");
        h.ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", second.clone(), &sha256_hex(&second), 2)
            .await
            .unwrap();

        let entry = h
            .ledger
            .latest_entry(&h.asset.ledger_id, "a.tif")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.revision, 2);
        assert_eq!(entry.versions, vec![2]);
        assert!(
            h.blobs
                .exists(&blob_key(&h.asset.id, "a.tif", 1))
                .await
                .unwrap()
        );
        assert!(
            h.blobs
                .exists(&blob_key(&h.asset.id, "a.tif", 2))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_ingest_existing_requires_matching_entry() {
        let h = setup().await;
        let data = Bytes::from("scene pixels");
        let checksum = sha256_hex(&data);
        h.ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data, &checksum, 1)
            .await
            .unwrap();
        h.versions.create_version(&h.ctx, &h.asset.id).await.unwrap();

        let size = h
            .ledger
            .ingest_existing(&h.ctx, &h.asset.id, "a.tif", &checksum, 2)
            .await
            .unwrap();
        assert_eq!(size, 12);

        let err = h
            .ledger
            .ingest_existing(&h.ctx, &h.asset.id, "a.tif", &sha256_hex(b"nope"), 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = h
            .ledger
            .ingest_existing(&h.ctx, &h.asset.id, "b.tif", &checksum, 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_stale_target_version_rejected_before_any_write() {
        let h = setup().await;
        h.versions.create_version(&h.ctx, &h.asset.id).await.unwrap();

        let data = Bytes::from("scene pixels");
        let checksum = sha256_hex(&data);
        let err = h
            .ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data.clone(), &checksum, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        // Rejected up front: no blob, no ledger entry.
        assert!(
            !h.blobs
                .exists(&blob_key(&h.asset.id, "a.tif", 1))
                .await
                .unwrap()
        );
        assert!(
            h.ledger
                .latest_entry(&h.asset.ledger_id, "a.tif")
                .await
                .unwrap()
                .is_none()
        );

        // Same for the zero-transfer path.
        h.ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data, &checksum, 2)
            .await
            .unwrap();
        let err = h
            .ledger
            .ingest_existing(&h.ctx, &h.asset.id, "a.tif", &checksum, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        let entry = h
            .ledger
            .latest_entry(&h.asset.ledger_id, "a.tif")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.versions, vec![2]);
    }

    #[tokio::test]
    async fn test_unknown_target_version_rejected() {
        let h = setup().await;
        let data = Bytes::from("scene pixels");
        let err = h
            .ledger
            .ingest(&h.ctx, &h.asset.id, "a.tif", data.clone(), &sha256_hex(&data), 7)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_non_owner_rejected() {
        let h = setup().await;
        let data = Bytes::from("scene pixels");
        let other = RequestContext::new(Uuid::new_v4());
        let err = h
            .ledger
            .ingest(&other, &h.asset.id, "a.tif", data.clone(), &sha256_hex(&data), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
    }
}
