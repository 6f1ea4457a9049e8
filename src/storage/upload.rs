//! Uploading finished downloads with duplicate detection and progress.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::StorageError;
use super::naming::{clean_key, resolve_key, KeyChoice};
use super::store::{CompletedPart, ObjectMetadata, ObjectStore};

const MIB: u64 = 1024 * 1024;
/// Files at least this large go through multipart upload.
pub const MULTIPART_THRESHOLD: u64 = 50 * MIB;
pub const PART_SIZE: u64 = 10 * MIB;
/// Parts in flight at once.
pub const PART_CONCURRENCY: usize = 10;

/// Called with `(uploaded_bytes, total_bytes)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub download_url: String,
    /// Object key
    pub filename: String,
    /// An identical object already existed and nothing was uploaded
    pub duplicate: bool,
}

pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    multipart_threshold: u64,
    part_size: u64,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: PART_SIZE,
        }
    }

    /// Override the multipart cutoff and part size.
    pub fn with_part_sizes(mut self, multipart_threshold: u64, part_size: u64) -> Self {
        self.multipart_threshold = multipart_threshold;
        self.part_size = part_size.max(1);
        self
    }

    /// Upload `path` under a key derived from `display_name`.
    pub async fn upload(
        &self,
        path: &Path,
        display_name: &str,
        progress: ProgressFn,
    ) -> Result<UploadResult, StorageError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(StorageError::io(path))?
            .len();
        let cleaned = clean_key(display_name);

        let key = match self.store.list_object_sizes().await {
            Ok(existing) => match resolve_key(&existing, &cleaned, size, Utc::now().timestamp()) {
                KeyChoice::Existing(key) => {
                    tracing::info!(key = %key, size, "Identical object already stored; skipping upload");
                    return Ok(UploadResult {
                        download_url: self.store.public_url(&key),
                        filename: key,
                        duplicate: true,
                    });
                }
                KeyChoice::New(key) => key,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Duplicate check failed; uploading anyway");
                cleaned
            }
        };

        let metadata = ObjectMetadata::for_upload(display_name, Utc::now());
        tracing::info!(
            key = %key,
            size_mib = %format!("{:.2}", size as f64 / MIB as f64),
            multipart = size >= self.multipart_threshold,
            "Uploading to object storage"
        );

        if size >= self.multipart_threshold {
            self.upload_multipart(path, &key, size, &metadata, progress)
                .await?;
        } else {
            self.upload_single(path, &key, size, &metadata, progress)
                .await?;
        }

        Ok(UploadResult {
            download_url: self.store.public_url(&key),
            filename: key,
            duplicate: false,
        })
    }

    async fn upload_single(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> Result<(), StorageError> {
        // Below the multipart threshold, so the whole file fits in one buffer.
        let body = tokio::fs::read(path)
            .await
            .map_err(StorageError::io(path))?;
        progress(0, size);
        self.store.put_object(key, Bytes::from(body), metadata).await?;
        progress(size, size);
        Ok(())
    }

    async fn upload_multipart(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        metadata: &ObjectMetadata,
        progress: ProgressFn,
    ) -> Result<(), StorageError> {
        let upload_id = self.store.create_multipart_upload(key, metadata).await?;

        let result = match self.upload_parts(path, key, &upload_id, size, progress).await {
            Ok(parts) => {
                self.store
                    .complete_multipart_upload(key, &upload_id, &parts)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!(key = %key, error = %e, "Multipart upload failed; aborting");
            if let Err(abort_err) = self.store.abort_multipart_upload(key, &upload_id).await {
                tracing::warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
            }
        }
        result
    }

    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
        progress: ProgressFn,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let part_size = self.part_size;
        let part_count = size.div_ceil(part_size).max(1);
        let sent = AtomicU64::new(0);

        let mut parts: Vec<CompletedPart> = stream::iter(1..=part_count)
            .map(|number| {
                let offset = (number - 1) * part_size;
                let len = part_size.min(size - offset);
                let sent = &sent;
                let progress = &progress;
                async move {
                    let body = read_range(path, offset, len).await?;
                    let etag = self
                        .store
                        .upload_part(key, upload_id, number as u32, body)
                        .await?;
                    let done = sent.fetch_add(len, Ordering::Relaxed) + len;
                    progress(done, size);
                    Ok::<_, StorageError>(CompletedPart {
                        part_number: number as u32,
                        etag,
                    })
                }
            })
            .buffer_unordered(PART_CONCURRENCY)
            .try_collect()
            .await?;

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }
}

async fn read_range(path: &Path, offset: u64, len: u64) -> Result<Bytes, StorageError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(StorageError::io(path))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(StorageError::io(path))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)
        .await
        .map_err(StorageError::io(path))?;
    Ok(Bytes::from(buf))
}
