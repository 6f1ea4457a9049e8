use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::error::StorageError;

/// How long an uploaded object is advertised to live.
pub const OBJECT_TTL_MS: i64 = 2 * 60 * 60 * 1000;

/// User metadata attached to every uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Unix milliseconds after which the bucket lifecycle may drop the object
    pub expiry_time_ms: i64,
    /// Base64 of the human-readable filename, which may not be ASCII
    pub original_filename_base64: String,
}

impl ObjectMetadata {
    pub fn for_upload(display_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            expiry_time_ms: now.timestamp_millis() + OBJECT_TTL_MS,
            original_filename_base64: STANDARD.encode(display_name.as_bytes()),
        }
    }

    /// User metadata entries; S3 sends each as an `x-amz-meta-<name>` header.
    pub fn entries(&self) -> HashMap<String, String> {
        HashMap::from([
            ("expiry-time".to_string(), self.expiry_time_ms.to_string()),
            (
                "original-filename-base64".to_string(),
                self.original_filename_base64.clone(),
            ),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// The subset of the S3 API the uploader needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every key in the bucket with its size in bytes.
    async fn list_object_sizes(&self) -> Result<HashMap<String, u64>, StorageError>;

    /// Single-request upload of a small object.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError>;

    /// Returns the upload id.
    async fn create_multipart_upload(
        &self,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError>;

    /// Returns the part's ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StorageError>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StorageError>;

    /// Public download link for `key`.
    fn public_url(&self, key: &str) -> String;
}
