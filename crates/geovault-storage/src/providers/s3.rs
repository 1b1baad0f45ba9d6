//! S3-compatible Blob Store.
//!
//! Uses the official AWS SDK and works against any S3-compatible endpoint
//! (AWS, MinIO, Ceph RGW) via `endpoint` + path-style addressing. Part
//! integrity rides on the SDK's `ChecksumSHA256` field; we additionally
//! verify the declared checksum locally before sending so a bad part never
//! leaves the process.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tracing::{debug, info};

use geovault_core::config::storage::S3StorageConfig;
use geovault_core::error::{AppError, ErrorKind};
use geovault_core::result::AppResult;
use geovault_core::traits::blob::{BlobMeta, BlobStore, PartInfo, PartPage};
use geovault_core::types::checksum::{checksums_match, sha256_hex};

/// S3-compatible Blob Store.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client from configuration.
    pub async fn new(config: &S3StorageConfig) -> AppResult<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::configuration("S3 bucket name is required"));
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "geovault",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(config.endpoint.clone());
        }

        let client = Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    fn storage_err<E>(context: &str) -> impl FnOnce(E) -> AppError + '_
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        move |e| AppError::with_source(ErrorKind::Storage, context.to_string(), e)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn provider_type(&self) -> &str {
        "s3"
    }

    async fn health_check(&self) -> AppResult<bool> {
        let result = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await;
        Ok(result.is_ok())
    }

    async fn put(&self, key: &str, data: Bytes) -> AppResult<BlobMeta> {
        let checksum = sha256_hex(&data);
        let size_bytes = data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .checksum_sha256(BASE64.encode(hex::decode(&checksum).map_err(|e| {
                AppError::with_source(ErrorKind::Internal, "Invalid checksum encoding", e)
            })?))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to put object: {key}"),
                    e,
                )
            })?;

        debug!(key, bytes = size_bytes, "Stored object");
        Ok(BlobMeta {
            key: key.to_string(),
            size_bytes,
            checksum_sha256: Some(checksum),
            last_modified: Some(chrono::Utc::now()),
        })
    }

    async fn stat(&self, key: &str) -> AppResult<BlobMeta> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    AppError::not_found(format!("Object not found: {key}"))
                } else {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to stat object: {key}"),
                        service_err,
                    )
                }
            })?;

        let last_modified = head
            .last_modified()
            .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos()));

        Ok(BlobMeta {
            key: key.to_string(),
            size_bytes: head.content_length().unwrap_or(0) as u64,
            checksum_sha256: None,
            last_modified,
        })
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete object: {key}"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn initiate_multipart(&self, key: &str) -> AppResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(Self::storage_err("Failed to initiate multipart upload"))?;

        let multipart_id = output
            .upload_id()
            .ok_or_else(|| AppError::storage("S3 returned no multipart upload id"))?
            .to_string();

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

        // Verify before sending so a bad part never reaches the store.
        let tag = sha256_hex(&data);
        if !checksums_match(&tag, checksum_sha256) {
            return Err(AppError::conflict(format!(
                "part {part_number} checksum mismatch: declared {checksum_sha256}, received {tag}"
            )));
        }

        let checksum_b64 = BASE64.encode(hex::decode(&tag).map_err(|e| {
            AppError::with_source(ErrorKind::Internal, "Invalid checksum encoding", e)
        })?);

        self.client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(multipart_id)
            .part_number(part_number)
            .checksum_sha256(checksum_b64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to upload part {part_number}"),
                    e,
                )
            })?;

        debug!(key, multipart_id, part_number, "Stored part");
        Ok(tag)
    }

    async fn list_parts(
        &self,
        key: &str,
        multipart_id: &str,
        marker: Option<i32>,
    ) -> AppResult<PartPage> {
        let mut request = self
            .client
            .list_parts()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(multipart_id);
        if let Some(marker) = marker {
            request = request.part_number_marker(marker.to_string());
        }

        let output = request
            .send()
            .await
            .map_err(Self::storage_err("Failed to list parts"))?;

        let parts = output
            .parts()
            .iter()
            .map(|p| PartInfo {
                part_number: p.part_number().unwrap_or(0),
                tag: p.e_tag().unwrap_or_default().trim_matches('"').to_string(),
                size_bytes: p.size().unwrap_or(0) as u64,
            })
            .collect();

        let is_truncated = output.is_truncated().unwrap_or(false);
        let next_marker = if is_truncated {
            output
                .next_part_number_marker()
                .and_then(|m| m.parse::<i32>().ok())
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
        // Gather every part across pagination, then order by part number.
        let mut parts: Vec<PartInfo> = Vec::new();
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

        let total_bytes: u64 = parts.iter().map(|p| p.size_bytes).sum();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.tag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(multipart_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to complete multipart upload: {key}"),
                    e,
                )
            })?;

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
            last_modified: Some(chrono::Utc::now()),
        })
    }

    async fn abort_multipart(&self, key: &str, multipart_id: &str) -> AppResult<()> {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(multipart_id)
            .send()
            .await;

        // An already-gone upload is not an error.
        if let Err(e) = result {
            let service_err = e.into_service_error();
            if !service_err.is_no_such_upload() {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to abort multipart upload: {multipart_id}"),
                    service_err,
                ));
            }
        }
        debug!(multipart_id, "Aborted multipart upload");
        Ok(())
    }
}
