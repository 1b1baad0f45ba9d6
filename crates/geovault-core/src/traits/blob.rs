//! Blob Store client trait for pluggable byte-storage backends.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Metadata about a stored object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlobMeta {
    /// Key within the blob store.
    pub key: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// SHA-256 checksum of the content, lowercase hex (if computed).
    pub checksum_sha256: Option<String>,
    /// Last modified timestamp.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// One committed part of a multipart upload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PartInfo {
    /// Part number (starts at 1).
    pub part_number: i32,
    /// Integrity tag returned when the part was uploaded.
    pub tag: String,
    /// Size of the part in bytes.
    pub size_bytes: u64,
}

/// One page of a paginated part listing.
#[derive(Debug, Clone)]
pub struct PartPage {
    /// Parts in this page, ordered by part number.
    pub parts: Vec<PartInfo>,
    /// Marker to pass for the next page, if the listing was truncated.
    pub next_marker: Option<i32>,
    /// Whether more pages remain.
    pub is_truncated: bool,
}

/// Trait for blob storage backends.
///
/// Objects are immutable bytes addressed by string keys of the form
/// `{asset_id}/{file_name}_{revision}`. Large objects are written through
/// the multipart protocol: initiate, upload parts (any order, concurrent,
/// re-submission overwrites), then complete, which reassembles by part
/// number. Implementations exist for the local filesystem and, behind the
/// `s3` feature of `geovault-storage`, S3-compatible object stores.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "s3").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Store bytes at the given key, computing the SHA-256 checksum while
    /// writing. Overwrites any existing object.
    async fn put(&self, key: &str, data: Bytes) -> AppResult<BlobMeta>;

    /// Get metadata about a stored object.
    async fn stat(&self, key: &str) -> AppResult<BlobMeta>;

    /// Check whether an object exists at the given key.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Delete the object at the given key. Deleting a missing key is not
    /// an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Start a multipart upload targeting `key` and return its handle.
    async fn initiate_multipart(&self, key: &str) -> AppResult<String>;

    /// Upload one part of a multipart upload.
    ///
    /// The store verifies `checksum_sha256` against the received bytes
    /// before persisting anything; on mismatch the part is not stored and
    /// a conflict error is raised. On success the computed integrity tag
    /// (SHA-256, lowercase hex) is returned. Re-submitting a part number
    /// replaces the previous part.
    async fn upload_part(
        &self,
        key: &str,
        multipart_id: &str,
        part_number: i32,
        data: Bytes,
        checksum_sha256: &str,
    ) -> AppResult<String>;

    /// List committed parts of a multipart upload, one page at a time.
    ///
    /// `marker` is the part number to resume after (exclusive); `None`
    /// starts from the beginning.
    async fn list_parts(
        &self,
        key: &str,
        multipart_id: &str,
        marker: Option<i32>,
    ) -> AppResult<PartPage>;

    /// Finalize a multipart upload.
    ///
    /// Lists all parts across pagination, sorts them by part number,
    /// concatenates them into the final object at `key`, and discards the
    /// staged parts. The whole-object checksum is not recomputed.
    async fn complete_multipart(&self, key: &str, multipart_id: &str) -> AppResult<BlobMeta>;

    /// Abort a multipart upload, discarding any staged parts. Aborting an
    /// unknown upload is not an error.
    async fn abort_multipart(&self, key: &str, multipart_id: &str) -> AppResult<()>;
}
