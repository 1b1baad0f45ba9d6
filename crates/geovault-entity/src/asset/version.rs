//! Asset version entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A numbered snapshot of an asset with a declared cumulative size.
///
/// Version ids are positive, start at 1, and are strictly increasing and
/// never reused — which makes them contiguous. A version's size only ever
/// grows, and a version stays mutable indefinitely: there is no explicit
/// close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    /// The version number within its asset.
    pub version_id: i64,
    /// Cumulative declared size of the version's files in bytes.
    pub size_bytes: i64,
    /// When the version was created.
    pub created_at: DateTime<Utc>,
}

impl Version {
    /// Create a new empty version.
    pub fn new(version_id: i64) -> Self {
        Self {
            version_id,
            size_bytes: 0,
            created_at: Utc::now(),
        }
    }
}
