//! Asset entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::version::Version;

/// Collection name for asset documents.
pub const ASSETS_COLLECTION: &str = "assets";

/// A catalogued dataset, model, or pipeline composed of versioned files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Unique asset identifier.
    pub id: Uuid,
    /// The owning user.
    pub owner_id: Uuid,
    /// Validated, catalog-unique asset name.
    pub name: String,
    /// Reference to the asset's File Ledger.
    pub ledger_id: Uuid,
    /// Ordered list of versions, oldest first.
    pub versions: Vec<Version>,
    /// Whether the asset is active. Deactivation is a soft delete.
    pub active: bool,
    /// Users allowed to read the asset when it is private. An empty list
    /// means the asset is public.
    pub allowed_users: Vec<Uuid>,
    /// When the asset was registered.
    pub created_at: DateTime<Utc>,
    /// When the asset was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Create a freshly registered asset with no versions.
    pub fn new(owner_id: Uuid, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            ledger_id: Uuid::new_v4(),
            versions: Vec::new(),
            active: true,
            allowed_users: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The highest existing version id, if any version exists.
    pub fn latest_version_id(&self) -> Option<i64> {
        self.versions.iter().map(|v| v.version_id).max()
    }

    /// The id the next created version will get.
    pub fn next_version_id(&self) -> i64 {
        self.latest_version_id().unwrap_or(0) + 1
    }

    /// Look up a version by id.
    pub fn version(&self, version_id: i64) -> Option<&Version> {
        self.versions.iter().find(|v| v.version_id == version_id)
    }

    /// Position of a version within the ordered version array.
    pub fn version_index(&self, version_id: i64) -> Option<usize> {
        self.versions.iter().position(|v| v.version_id == version_id)
    }

    /// Whether the asset is private (allow-list in effect).
    pub fn is_private(&self) -> bool {
        !self.allowed_users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_numbering() {
        let mut asset = Asset::new(Uuid::new_v4(), "test-asset".into());
        assert_eq!(asset.next_version_id(), 1);

        for id in [1, 2, 4] {
            asset.versions.push(Version::new(id));
        }
        assert_eq!(asset.latest_version_id(), Some(4));
        assert_eq!(asset.next_version_id(), 5);
        assert!(asset.version(3).is_none());
        assert_eq!(asset.version_index(4), Some(2));
    }
}
