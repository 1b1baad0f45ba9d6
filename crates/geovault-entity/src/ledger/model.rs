//! File Ledger entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Collection name for ledger entry documents.
pub const LEDGER_COLLECTION: &str = "ledger";

/// Blob store key for one content revision of a named file.
///
/// Revision 1 of `scenes/a.tif` in asset `A` lands at `A/scenes/a.tif_1`.
pub fn blob_key(asset_id: &Uuid, name: &str, revision: i64) -> String {
    format!("{asset_id}/{name}_{revision}")
}

/// One distinct content revision of a named file within an asset.
///
/// There is exactly one entry per distinct checksum ever observed for a
/// `(ledger, name)` pair; the entry with the highest `revision` is
/// authoritative for the file's current content. Entries are independent
/// documents, so concurrent ingestion of different file names never
/// contends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The File Ledger this entry belongs to.
    pub ledger_id: Uuid,
    /// The file name within the asset.
    pub name: String,
    /// SHA-256 checksum of the content, lowercase hex.
    pub checksum: String,
    /// Content size in bytes.
    pub size_bytes: i64,
    /// Content-version counter. Increments only when the bytes change;
    /// distinct from asset version ids.
    pub revision: i64,
    /// Membership set of asset version ids this content satisfies. A set,
    /// not a history: appends are idempotent.
    pub versions: Vec<i64>,
    /// When this revision was first ingested.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create an entry for a newly ingested content revision.
    pub fn new(
        ledger_id: Uuid,
        name: String,
        checksum: String,
        size_bytes: i64,
        revision: i64,
        target_version: i64,
    ) -> Self {
        Self {
            ledger_id,
            name,
            checksum,
            size_bytes,
            revision,
            versions: vec![target_version],
            created_at: Utc::now(),
        }
    }

    /// Document id within the ledger collection.
    pub fn doc_id(&self) -> String {
        Self::doc_id_for(&self.ledger_id, &self.name, self.revision)
    }

    /// Document id for a `(ledger, name, revision)` triple.
    pub fn doc_id_for(ledger_id: &Uuid, name: &str, revision: i64) -> String {
        format!("{ledger_id}:{name}:{revision}")
    }

    /// Whether this content satisfies the given asset version.
    pub fn satisfies(&self, version_id: i64) -> bool {
        self.versions.contains(&version_id)
    }
}
