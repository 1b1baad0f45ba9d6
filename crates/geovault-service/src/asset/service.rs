//! Asset registration, retrieval, and access control.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use geovault_core::error::AppError;
use geovault_core::result::AppResult;
use geovault_core::traits::metadata::DocumentStore;
use geovault_core::types::name::validate_asset_name;
use geovault_entity::asset::{ASSETS_COLLECTION, Asset};

use crate::access::{check_readable, from_doc, load_asset, owned_asset, to_doc};
use crate::context::RequestContext;

/// Catalog-level asset operations: registration, soft delete, privacy.
#[derive(Debug, Clone)]
pub struct AssetService {
    metadata: Arc<dyn DocumentStore>,
}

impl AssetService {
    pub fn new(metadata: Arc<dyn DocumentStore>) -> Self {
        Self { metadata }
    }

    /// Register a new asset with a catalog-unique name. The asset starts
    /// active, public, and with no versions.
    pub async fn create_asset(&self, ctx: &RequestContext, name: &str) -> AppResult<Asset> {
        validate_asset_name(name)?;

        let asset = Asset::new(ctx.user_id, name.to_string());
        let inserted = self
            .metadata
            .insert_unique(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                name,
                to_doc(&asset)?,
            )
            .await?;
        if !inserted {
            return Err(AppError::conflict(format!(
                "Asset name already taken: {name}"
            )));
        }

        info!(asset = %asset.name, asset_id = %asset.id, "Registered asset");
        Ok(asset)
    }

    /// Fetch an asset the caller may read.
    pub async fn retrieve_asset(&self, ctx: &RequestContext, asset_id: &Uuid) -> AppResult<Asset> {
        let asset = load_asset(self.metadata.as_ref(), asset_id).await?;
        check_readable(&asset, ctx)?;
        Ok(asset)
    }

    /// Fetch an asset by its catalog name.
    pub async fn retrieve_asset_by_name(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> AppResult<Asset> {
        let doc = self
            .metadata
            .find_by_unique_key(ASSETS_COLLECTION, name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Asset not found: {name}")))?;
        let asset: Asset = from_doc(doc)?;
        if !asset.active {
            return Err(AppError::not_found(format!("Asset not found: {name}")));
        }
        check_readable(&asset, ctx)?;
        Ok(asset)
    }

    /// Soft-delete an asset. Blobs and ledger entries stay in place.
    pub async fn deactivate(&self, ctx: &RequestContext, asset_id: &Uuid) -> AppResult<()> {
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        self.metadata
            .set_path(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                "active",
                json!(false),
            )
            .await?;
        info!(asset = %asset.name, "Deactivated asset");
        Ok(())
    }

    /// Make an asset private. The owner seeds the allow list.
    pub async fn make_private(&self, ctx: &RequestContext, asset_id: &Uuid) -> AppResult<()> {
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        if asset.is_private() {
            return Err(AppError::conflict(format!(
                "Asset {} is already private",
                asset.name
            )));
        }
        self.metadata
            .push_unique(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                "allowed_users",
                json!(ctx.user_id),
            )
            .await?;
        info!(asset = %asset.name, "Asset made private");
        Ok(())
    }

    /// Grant a user read access to a private asset. Idempotent.
    pub async fn allow_user(
        &self,
        ctx: &RequestContext,
        asset_id: &Uuid,
        user_id: &Uuid,
    ) -> AppResult<()> {
        let asset = owned_asset(self.metadata.as_ref(), asset_id, ctx).await?;
        if !asset.is_private() {
            return Err(AppError::conflict(format!(
                "Asset {} is not private",
                asset.name
            )));
        }
        self.metadata
            .push_unique(
                ASSETS_COLLECTION,
                &asset.id.to_string(),
                "allowed_users",
                json!(user_id),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geovault_core::error::ErrorKind;
    use geovault_metadata::{SqliteDocumentStore, create_pool, ensure_schema};

    async fn service() -> AssetService {
        let config = geovault_core::config::MetadataConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_timeout_seconds: 5,
        };
        let pool = create_pool(&config).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        AssetService::new(Arc::new(SqliteDocumentStore::new(pool)))
    }

    #[tokio::test]
    async fn test_create_and_retrieve() {
        let service = service().await;
        let ctx = RequestContext::new(Uuid::new_v4());

        let asset = service.create_asset(&ctx, "eurosat-rgb").await.unwrap();
        assert!(asset.versions.is_empty());
        assert!(asset.active);

        let by_id = service.retrieve_asset(&ctx, &asset.id).await.unwrap();
        assert_eq!(by_id.name, "eurosat-rgb");

        let by_name = service
            .retrieve_asset_by_name(&ctx, "eurosat-rgb")
            .await
            .unwrap();
        assert_eq!(by_name.id, asset.id);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let service = service().await;
        let ctx = RequestContext::new(Uuid::new_v4());

        service.create_asset(&ctx, "eurosat-rgb").await.unwrap();
        let err = service
            .create_asset(&RequestContext::new(Uuid::new_v4()), "eurosat-rgb")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let service = service().await;
        let ctx = RequestContext::new(Uuid::new_v4());

        let err = service.create_asset(&ctx, "9lives").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_deactivated_asset_reads_as_absent() {
        let service = service().await;
        let ctx = RequestContext::new(Uuid::new_v4());

        let asset = service.create_asset(&ctx, "eurosat-rgb").await.unwrap();
        service.deactivate(&ctx, &asset.id).await.unwrap();

        let err = service.retrieve_asset(&ctx, &asset.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_private_access_control() {
        let service = service().await;
        let owner = RequestContext::new(Uuid::new_v4());
        let reader = RequestContext::new(Uuid::new_v4());

        let asset = service.create_asset(&owner, "secret-scenes").await.unwrap();

        // Public: anyone can read.
        service.retrieve_asset(&reader, &asset.id).await.unwrap();

        // allow_user before make_private is a precondition failure.
        let err = service
            .allow_user(&owner, &asset.id, &reader.user_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        service.make_private(&owner, &asset.id).await.unwrap();
        let err = service.retrieve_asset(&reader, &asset.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);

        service
            .allow_user(&owner, &asset.id, &reader.user_id)
            .await
            .unwrap();
        service.retrieve_asset(&reader, &asset.id).await.unwrap();

        // Owner always reads; making private twice conflicts.
        service.retrieve_asset(&owner, &asset.id).await.unwrap();
        let err = service.make_private(&owner, &asset.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
