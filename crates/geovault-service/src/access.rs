//! Shared asset access checks and document (de)serialization helpers.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use geovault_core::error::AppError;
use geovault_core::result::AppResult;
use geovault_core::traits::metadata::DocumentStore;
use geovault_entity::asset::{ASSETS_COLLECTION, Asset};

use crate::context::RequestContext;

/// Deserialize a stored document into an entity.
pub(crate) fn from_doc<T: DeserializeOwned>(doc: Value) -> AppResult<T> {
    Ok(serde_json::from_value(doc)?)
}

/// Serialize an entity into a storable document.
pub(crate) fn to_doc<T: Serialize>(entity: &T) -> AppResult<Value> {
    Ok(serde_json::to_value(entity)?)
}

/// Load an active asset by id. Inactive assets read as absent.
pub(crate) async fn load_asset(store: &dyn DocumentStore, asset_id: &Uuid) -> AppResult<Asset> {
    let doc = store
        .get(ASSETS_COLLECTION, &asset_id.to_string())
        .await?
        .ok_or_else(|| AppError::not_found(format!("Asset not found: {asset_id}")))?;
    let asset: Asset = from_doc(doc)?;
    if !asset.active {
        return Err(AppError::not_found(format!("Asset not found: {asset_id}")));
    }
    Ok(asset)
}

/// Load an active asset and require the caller to own it.
pub(crate) async fn owned_asset(
    store: &dyn DocumentStore,
    asset_id: &Uuid,
    ctx: &RequestContext,
) -> AppResult<Asset> {
    let asset = load_asset(store, asset_id).await?;
    if asset.owner_id != ctx.user_id {
        return Err(AppError::authorization(format!(
            "User {} does not own asset {}",
            ctx.user_id, asset.name
        )));
    }
    Ok(asset)
}

/// Require the caller to be allowed to read the asset: the owner always
/// is; anyone is while the asset is public; otherwise the allow list
/// decides.
pub(crate) fn check_readable(asset: &Asset, ctx: &RequestContext) -> AppResult<()> {
    if asset.owner_id == ctx.user_id || !asset.is_private() {
        return Ok(());
    }
    if asset.allowed_users.contains(&ctx.user_id) {
        return Ok(());
    }
    Err(AppError::authorization(format!(
        "User {} is not allowed to access asset {}",
        ctx.user_id, asset.name
    )))
}
