//! Local filesystem Blob Store.
//!
//! Objects live directly under the root at their key path. Multipart
//! uploads stage parts under `_multipart/{multipart_id}/{part:06}` with a
//! `.target` marker recording the destination key; completion concatenates
//! the parts in part-number order and renames the result into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use geovault_core::error::{AppError, ErrorKind};
use geovault_core::result::AppResult;
use geovault_core::traits::blob::{BlobMeta, BlobStore, PartInfo, PartPage};
use geovault_core::types::checksum::{checksums_match, sha256_hex};

const MULTIPART_DIR: &str = "_multipart";
const TARGET_MARKER: &str = ".target";
const DEFAULT_PART_PAGE_SIZE: usize = 1000;

/// Local filesystem Blob Store.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    /// Root directory for all stored objects.
    root: PathBuf,
    /// Page size for part listings.
    part_page_size: usize,
}

impl LocalBlobStore {
    /// Create a new local blob store rooted at the given path.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            root,
            part_page_size: DEFAULT_PART_PAGE_SIZE,
        })
    }

    /// Override the part listing page size.
    pub fn with_part_page_size(mut self, page_size: usize) -> Self {
        self.part_page_size = page_size.max(1);
        self
    }

    /// Resolve a key to an absolute path within the root.
    fn resolve(&self, key: &str) -> PathBuf {
        let clean = key.trim_start_matches('/');
        self.root.join(clean)
    }

    /// Staging directory for a multipart upload.
    fn staging_dir(&self, multipart_id: &str) -> PathBuf {
        self.root.join(MULTIPART_DIR).join(multipart_id)
    }

    /// Resolve the staging directory, verifying it targets `key`.
    async fn resolve_staging(&self, key: &str, multipart_id: &str) -> AppResult<PathBuf> {
        let dir = self.staging_dir(multipart_id);
        let marker = dir.join(TARGET_MARKER);
        let target = fs::read_to_string(&marker).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Multipart upload not found: {multipart_id}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read multipart marker: {multipart_id}"),
                    e,
                )
            }
        })?;
        if target != key {
            return Err(AppError::not_found(format!(
                "Multipart upload {multipart_id} does not target key {key}"
            )));
        }
        Ok(dir)
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// List the staged part numbers of a multipart upload, sorted.
    async fn staged_part_numbers(&self, dir: &Path) -> AppResult<Vec<i32>> {
        let mut numbers = Vec::new();
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to list staged parts", e)
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to read staging entry", e)
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Ok(n) = name.parse::<i32>() {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.root.exists() && self.root.is_dir())
    }

    async fn put(&self, key: &str, data: Bytes) -> AppResult<BlobMeta> {
        let full_path = self.resolve(key);
        self.ensure_parent(&full_path).await?;

        let checksum = sha256_hex(&data);
        let size_bytes = data.len() as u64;

        fs::write(&full_path, &data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to write object: {key}"), e)
        })?;

        debug!(key, bytes = size_bytes, "Stored object");
        Ok(BlobMeta {
            key: key.to_string(),
            size_bytes,
            checksum_sha256: Some(checksum),
            last_modified: Some(Utc::now()),
        })
    }

    async fn stat(&self, key: &str) -> AppResult<BlobMeta> {
        let full_path = self.resolve(key);
        let meta = fs::metadata(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {key}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to stat object: {key}"),
                    e,
                )
            }
        })?;

        let last_modified = meta
            .modified()
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from);

        Ok(BlobMeta {
            key: key.to_string(),
            size_bytes: meta.len(),
            checksum_sha256: None,
            last_modified,
        })
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.resolve(key).exists())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let full_path = self.resolve(key);
        if full_path.exists() {
            fs::remove_file(&full_path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete object: {key}"),
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn initiate_multipart(&self, key: &str) -> AppResult<String> {
        let multipart_id = Uuid::new_v4().to_string();
        let dir = self.staging_dir(&multipart_id);
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to create staging directory", e)
        })?;
        fs::write(dir.join(TARGET_MARKER), key).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to write multipart marker", e)
        })?;

        debug!(key, multipart_id, "Initiated multipart upload");
        Ok(multipart_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        multipart_id: &str,
        part_number: i32,
        data: Bytes,
        checksum_sha256: &str,
    ) -> AppResult<String> {
        if part_number < 1 {
            return Err(AppError::validation(format!(
                "part number must be positive, got {part_number}"
            )));
        }
        let dir = self.resolve_staging(key, multipart_id).await?;

        // Verify before persisting so an unverifiable part never exists.
        let tag = sha256_hex(&data);
        if !checksums_match(&tag, checksum_sha256) {
            return Err(AppError::conflict(format!(
                "part {part_number} checksum mismatch: declared {checksum_sha256}, received {tag}"
            )));
        }

        let part_path = dir.join(format!("{part_number:06}"));
        fs::write(&part_path, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write part {part_number}"),
                e,
            )
        })?;

        debug!(key, multipart_id, part_number, bytes = data.len(), "Stored part");
        Ok(tag)
    }

    async fn list_parts(
        &self,
        key: &str,
        multipart_id: &str,
        marker: Option<i32>,
    ) -> AppResult<PartPage> {
        let dir = self.resolve_staging(key, multipart_id).await?;
        let numbers = self.staged_part_numbers(&dir).await?;

        let after = marker.unwrap_or(0);
        let remaining: Vec<i32> = numbers.into_iter().filter(|n| *n > after).collect();
        let is_truncated = remaining.len() > self.part_page_size;
        let page: Vec<i32> = remaining.into_iter().take(self.part_page_size).collect();

        let mut parts = Vec::with_capacity(page.len());
        for n in &page {
            let part_path = dir.join(format!("{n:06}"));
            let data = fs::read(&part_path).await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("Failed to read part {n}"), e)
            })?;
            parts.push(PartInfo {
                part_number: *n,
                tag: sha256_hex(&data),
                size_bytes: data.len() as u64,
            });
        }

        let next_marker = if is_truncated {
            page.last().copied()
        } else {
            None
        };

        Ok(PartPage {
            parts,
            next_marker,
            is_truncated,
        })
    }

    async fn complete_multipart(&self, key: &str, multipart_id: &str) -> AppResult<BlobMeta> {
        let dir = self.resolve_staging(key, multipart_id).await?;

        // Gather every part across pagination, then order by part number.
        let mut parts = Vec::new();
        let mut marker = None;
        loop {
            let page = self.list_parts(key, multipart_id, marker).await?;
            parts.extend(page.parts);
            if !page.is_truncated {
                break;
            }
            marker = page.next_marker;
        }
        if parts.is_empty() {
            return Err(AppError::conflict(format!(
                "multipart upload {multipart_id} has no parts to complete"
            )));
        }
        parts.sort_by_key(|p| p.part_number);

        let assembled_path = dir.join(".assembled");
        let mut file = fs::File::create(&assembled_path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to create assembly file", e)
        })?;

        let mut total_bytes = 0u64;
        for part in &parts {
            let part_path = dir.join(format!("{:06}", part.part_number));
            let data = fs::read(&part_path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read part {}", part.part_number),
                    e,
                )
            })?;
            total_bytes += data.len() as u64;
            file.write_all(&data).await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to write assembly file", e)
            })?;
        }
        file.flush().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to flush assembly file", e)
        })?;
        drop(file);

        let final_path = self.resolve(key);
        self.ensure_parent(&final_path).await?;
        fs::rename(&assembled_path, &final_path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to move assembled object into place: {key}"),
                e,
            )
        })?;

        let _ = fs::remove_dir_all(&dir).await;

        info!(
            key,
            multipart_id,
            parts = parts.len(),
            bytes = total_bytes,
            "Completed multipart upload"
        );

        Ok(BlobMeta {
            key: key.to_string(),
            size_bytes: total_bytes,
            checksum_sha256: None,
            last_modified: Some(Utc::now()),
        })
    }

    async fn abort_multipart(&self, _key: &str, multipart_id: &str) -> AppResult<()> {
        let dir = self.staging_dir(multipart_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to abort multipart upload: {multipart_id}"),
                    e,
                )
            })?;
            debug!(multipart_id, "Aborted multipart upload");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, LocalBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_stat_delete() {
        let (_dir, store) = store().await;

        let data = Bytes::from("hello world");
        let meta = store.put("asset/a.tif_1", data.clone()).await.unwrap();
        assert_eq!(meta.size_bytes, 11);
        assert_eq!(meta.checksum_sha256.as_deref(), Some(sha256_hex(&data)).as_deref());

        let stat = store.stat("asset/a.tif_1").await.unwrap();
        assert_eq!(stat.size_bytes, 11);
        assert!(store.exists("asset/a.tif_1").await.unwrap());

        store.delete("asset/a.tif_1").await.unwrap();
        assert!(!store.exists("asset/a.tif_1").await.unwrap());
        // Deleting again is fine.
        store.delete("asset/a.tif_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_multipart_out_of_order_assembly() {
        let (_dir, store) = store().await;

        let id = store.initiate_multipart("a/big.bin_1").await.unwrap();
        for (n, data) in [(3, "cc"), (1, "aa"), (2, "bb")] {
            let bytes = Bytes::from(data);
            let checksum = sha256_hex(bytes.as_ref());
            store
                .upload_part("a/big.bin_1", &id, n, bytes, &checksum)
                .await
                .unwrap();
        }

        let meta = store.complete_multipart("a/big.bin_1", &id).await.unwrap();
        assert_eq!(meta.size_bytes, 6);

        let path = store.resolve("a/big.bin_1");
        assert_eq!(std::fs::read(path).unwrap(), b"aabbcc");
        // Staging is gone; listing now fails.
        assert!(store.list_parts("a/big.bin_1", &id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_part_checksum_mismatch_not_persisted() {
        let (_dir, store) = store().await;

        let id = store.initiate_multipart("a/x_1").await.unwrap();
        let err = store
            .upload_part("a/x_1", &id, 1, Bytes::from("data"), &sha256_hex(b"other"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let page = store.list_parts("a/x_1", &id, None).await.unwrap();
        assert!(page.parts.is_empty());
    }

    #[tokio::test]
    async fn test_part_resubmission_overwrites() {
        let (_dir, store) = store().await;

        let id = store.initiate_multipart("a/x_1").await.unwrap();
        let first = Bytes::from("first");
        store
            .upload_part("a/x_1", &id, 1, first.clone(), &sha256_hex(&first))
            .await
            .unwrap();
        let second = Bytes::from("second");
        store
            .upload_part("a/x_1", &id, 1, second.clone(), &sha256_hex(&second))
            .await
            .unwrap();

        let meta = store.complete_multipart("a/x_1", &id).await.unwrap();
        assert_eq!(meta.size_bytes, 6);
    }

    #[tokio::test]
    async fn test_list_parts_pagination() {
        let (_dir, store) = store().await;
        let store = store.with_part_page_size(2);

        let id = store.initiate_multipart("a/x_1").await.unwrap();
        for n in 1..=5 {
            let data = Bytes::from(format!("part{n}"));
            let checksum = sha256_hex(&data);
            store
                .upload_part("a/x_1", &id, n, data, &checksum)
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut marker = None;
        loop {
            let page = store.list_parts("a/x_1", &id, marker).await.unwrap();
            assert!(page.parts.len() <= 2);
            seen.extend(page.parts.iter().map(|p| p.part_number));
            if !page.is_truncated {
                break;
            }
            marker = page.next_marker;
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_abort_discards_parts() {
        let (_dir, store) = store().await;

        let id = store.initiate_multipart("a/x_1").await.unwrap();
        let data = Bytes::from("data");
        let checksum = sha256_hex(&data);
        store
            .upload_part("a/x_1", &id, 1, data, &checksum)
            .await
            .unwrap();

        store.abort_multipart("a/x_1", &id).await.unwrap();
        assert!(store.list_parts("a/x_1", &id, None).await.is_err());
        // Aborting an unknown upload is not an error.
        store.abort_multipart("a/x_1", "missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let (_dir, store) = store().await;

        let id = store.initiate_multipart("a/x_1").await.unwrap();
        let err = store
            .upload_part("a/other_1", &id, 1, Bytes::from("d"), &sha256_hex(b"d"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
