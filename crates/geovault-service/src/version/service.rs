//! Version numbering and size accounting.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use geovault_core::error::AppError;
use geovault_core::result::AppResult;
use geovault_core::traits::metadata::DocumentStore;
use geovault_entity::asset::{ASSETS_COLLECTION, Asset, Version};

use crate::access::{load_asset, owned_asset, to_doc};
use crate::context::RequestContext;

/// Assigns asset version numbers and reconciles declared version sizes as
/// ingestion completes.
///
/// Version sizes have two deliberately separate mutations: the additive
/// [`add_version_size`](VersionService::add_version_size) used by every
/// ingestion path, and the overwriting
/// [`set_initial_size`](VersionService::set_initial_size) that records the
/// declared total of the whole initial upload on version 1.
#[derive(Debug, Clone)]
pub struct VersionService {
    metadata: Arc<dyn DocumentStore>,
}

impl VersionService {
    pub fn new(metadata: Arc<dyn DocumentStore>) -> Self {
        Self { metadata }
    }

    /// Create the next version of an asset and return its id.
    ///
    /// Ids start at 1 and strictly increase; an id is never reused. The
    /// append is guarded on the version id, so two racing creations end in
    /// one success and one conflict rather than a lost update.
    pub async fn create_version(&self, ctx: &RequestContext, asset_id: &Uuid) -> AppResult<i64> {
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        let version_id = asset.next_version_id();
        let version = Version::new(version_id);

        let appended = self
            .metadata
            .push_unique_by(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                "versions",
                "version_id",
                to_doc(&version)?,
            )
            .await?;
        if !appended {
            return Err(AppError::conflict(format!(
                "Version {version_id} of asset {} already exists",
                asset.name
            )));
        }

        info!(asset = %asset.name, version_id, "Created asset version");
        Ok(version_id)
    }

    /// Add ingested bytes to a version's declared size.
    ///
    /// The target must exist and must be the latest version of the asset;
    /// a completion arriving for an older version is a conflict, never a
    /// silent size write. The increment itself is atomic.
    pub async fn add_version_size(
        &self,
        asset_id: &Uuid,
        version_id: i64,
        bytes: u64,
    ) -> AppResult<()> {
        let asset = load_asset(self.metadata.as_ref(), asset_id).await?;
        let index = self.latest_version_index(&asset, version_id)?;
        self.metadata
            .increment(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                &format!("versions[{index}].size_bytes"),
                bytes as i64,
            )
            .await
    }

    /// Overwrite version 1's size with the declared total of the whole
    /// initial upload. Only valid while version 1 is the latest version.
    pub async fn set_initial_size(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        total_bytes: u64,
    ) -> AppResult<()> {
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        let index = self.latest_version_index(&asset, 1)?;
        self.metadata
            .set_path(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                &format!("versions[{index}].size_bytes"),
                json!(total_bytes),
            )
            .await
    }

    /// Position of `version_id` in the version array, requiring it to be
    /// the latest version.
    fn latest_version_index(&self, asset: &Asset, version_id: i64) -> AppResult<usize> {
        let index = asset.version_index(version_id).ok_or_else(|| {
            AppError::not_found(format!(
                "Version {version_id} of asset {} not found",
                asset.name
            ))
        })?;
        let latest = asset.latest_version_id().unwrap_or(0);
        if version_id != latest {
            return Err(AppError::conflict(format!(
                "Version {version_id} of asset {} is not the latest version ({latest})",
                asset.name
            )));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetService;
    use geovault_core::error::ErrorKind;
    use geovault_metadata::{SqliteDocumentStore, create_pool, ensure_schema};

    async fn setup() -> (Arc<dyn DocumentStore>, RequestContext, Uuid) {
        let config = geovault_core::config::MetadataConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_timeout_seconds: 5,
        };
        let pool = create_pool(&config).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        let metadata: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool));

        let ctx = RequestContext::new(Uuid::new_v4());
        let asset = AssetService::new(metadata.clone())
            .create_asset(&ctx, "landsat-scenes")
            .await
            .unwrap();
        (metadata, ctx, asset.id)
    }

    #[tokio::test]
    async fn test_version_ids_increase_from_one() {
        let (metadata, ctx, asset_id) = setup().await;
        let service = VersionService::new(metadata);

        assert_eq!(service.create_version(&ctx, &asset_id).await.unwrap(), 1);
        assert_eq!(service.create_version(&ctx, &asset_id).await.unwrap(), 2);
        assert_eq!(service.create_version(&ctx, &asset_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_create_version_requires_owner() {
        let (metadata, _ctx, asset_id) = setup().await;
        let service = VersionService::new(metadata);

        let other = RequestContext::new(Uuid::new_v4());
        let err = service.create_version(&other, &asset_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_add_size_accumulates_on_latest() {
        let (metadata, ctx, asset_id) = setup().await;
        let service = VersionService::new(metadata.clone());

        service.create_version(&ctx, &asset_id).await.unwrap();
        service.create_version(&ctx, &asset_id).await.unwrap();

        service.add_version_size(&asset_id, 2, 100).await.unwrap();
        service.add_version_size(&asset_id, 2, 50).await.unwrap();

        let asset = load_asset(metadata.as_ref(), &asset_id).await.unwrap();
        assert_eq!(asset.version(2).unwrap().size_bytes, 150);
        assert_eq!(asset.version(1).unwrap().size_bytes, 0);
    }

    #[tokio::test]
    async fn test_add_size_rejects_stale_version() {
        let (metadata, ctx, asset_id) = setup().await;
        let service = VersionService::new(metadata);

        service.create_version(&ctx, &asset_id).await.unwrap();
        service.create_version(&ctx, &asset_id).await.unwrap();

        let err = service.add_version_size(&asset_id, 1, 10).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = service.add_version_size(&asset_id, 9, 10).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_set_initial_size_overwrites_version_one() {
        let (metadata, ctx, asset_id) = setup().await;
        let service = VersionService::new(metadata.clone());

        service.create_version(&ctx, &asset_id).await.unwrap();
        service.add_version_size(&asset_id, 1, 10).await.unwrap();

        service.set_initial_size(&ctx, &asset_id, 500).await.unwrap();
        let asset = load_asset(metadata.as_ref(), &asset_id).await.unwrap();
        assert_eq!(asset.version(1).unwrap().size_bytes, 500);

        // Once version 2 exists the initial total is frozen.
        service.create_version(&ctx, &asset_id).await.unwrap();
        let err = service.set_initial_size(&ctx, &asset_id, 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
