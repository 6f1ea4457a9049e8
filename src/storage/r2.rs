//! Cloudflare R2 through the AWS S3 SDK.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::config::{
    BehaviorVersion, Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;

use crate::config::R2Config;

use super::error::StorageError;
use super::store::{CompletedPart, ObjectMetadata, ObjectStore};

/// R2 accepts any region name; `auto` is the documented one.
const REGION: &str = "auto";

pub struct R2Client {
    client: Client,
    bucket: String,
    public_url: String,
}

impl R2Client {
    pub fn new(config: &R2Config) -> Self {
        Self::with_endpoint(config, &config.endpoint())
    }

    /// Client for an explicit S3 endpoint, path-style addressed.
    pub fn with_endpoint(config: &R2Config, endpoint: &str) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "ytrelay-config",
        );
        // R2 rejects the flexible checksums newer SDKs send by default.
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(REGION))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_url: config.public_url.clone(),
        }
    }
}

fn failed<E: std::error::Error>(operation: &'static str) -> impl FnOnce(E) -> StorageError {
    move |err| StorageError::Request {
        operation,
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn list_object_sizes(&self) -> Result<HashMap<String, u64>, StorageError> {
        let mut sizes = HashMap::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(failed("ListObjectsV2"))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    let size = object.size().unwrap_or(0).max(0) as u64;
                    sizes.insert(key.to_string(), size);
                }
            }
        }

        tracing::debug!(objects = sizes.len(), bucket = %self.bucket, "Listed bucket");
        Ok(sizes)
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type(key))
            .set_metadata(Some(metadata.entries()))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(failed("PutObject"))?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type(key))
            .set_metadata(Some(metadata.entries()))
            .send()
            .await
            .map_err(failed("CreateMultipartUpload"))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or(StorageError::MissingField {
                operation: "CreateMultipartUpload",
                field: "UploadId",
            })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(failed("UploadPart"))?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or(StorageError::MissingField {
                operation: "UploadPart",
                field: "ETag",
            })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StorageError> {
        let parts = parts
            .iter()
            .map(|part| {
                S3CompletedPart::builder()
                    .part_number(part.part_number as i32)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(failed("CompleteMultipartUpload"))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(failed("AbortMultipartUpload"))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/download/{}", self.public_url, key)
    }
}
