//! Native S3 store built on the official AWS SDK for Rust
//!
//! Works with AWS S3 and S3-compatible services such as MinIO or LocalStack.
//! Enabled with the `s3-native` feature.
//!
//! # Example
//!
//! ```ignore
//! use orbit_upload::protocol::s3::{S3Store, S3StoreConfig};
//! use orbit_upload::{upload, UploadConfig, UploadSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = S3StoreConfig::minio("http://localhost:9000", "minioadmin", "minioadmin");
//!     let store = Arc::new(S3Store::new(config).await?);
//!
//!     let source = UploadSource::from_path("large-file.bin").await?;
//!     let upload_config = UploadConfig::default();
//!     let outcome = upload(store, source, "my-bucket", "large-file.bin", &upload_config).await?;
//!     println!("{}", outcome);
//!     Ok(())
//! }
//! ```

mod config;
mod error;

pub use config::{S3StoreConfig, S3StoreConfigBuilder};

use crate::protocol::{CompletedPart, ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use error::from_sdk;
use std::time::Duration;

/// [`ObjectStore`] over an AWS SDK S3 client
#[derive(Clone, Debug)]
pub struct S3Store {
    client: AwsS3Client,
    config: S3StoreConfig,
}

impl S3Store {
    /// Create a store, resolving region and credentials
    pub async fn new(config: S3StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let client = Self::build_aws_client(&config).await;
        Ok(Self { client, config })
    }

    /// Wrap an existing SDK client
    pub fn from_client(client: AwsS3Client, config: S3StoreConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &S3StoreConfig {
        &self.config
    }

    async fn build_aws_client(config: &S3StoreConfig) -> AwsS3Client {
        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = if let Some(region_str) = &config.region {
            RegionProviderChain::first_try(Region::new(region_str.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        aws_config_loader = aws_config_loader.region(region_provider);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                "orbit-upload-explicit",
            );
            aws_config_loader = aws_config_loader.credentials_provider(credentials);
        }

        let aws_config = aws_config_loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        // Required for MinIO, LocalStack
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();
        s3_config_builder = s3_config_builder.timeout_config(timeout_config);

        AwsS3Client::from_conf(s3_config_builder.build())
    }
}

fn sdk_part_number(part_number: u32) -> StoreResult<i32> {
    i32::try_from(part_number).map_err(|_| {
        StoreError::InvalidRequest(format!("part number {} out of range", part_number))
    })
}

fn required_etag(etag: Option<&str>, what: &str) -> StoreResult<String> {
    etag.map(str::to_string)
        .ok_or_else(|| StoreError::InvalidResponse(format!("No ETag returned for {}", what)))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn initiate_upload(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(from_sdk)?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::InvalidResponse("No upload ID returned".to_string()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String> {
        let response = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(sdk_part_number(part_number)?)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(from_sdk)?;

        required_etag(response.e_tag(), &format!("part {}", part_number))
    }

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String> {
        let completed_parts = parts
            .iter()
            .map(|p| {
                Ok(AwsCompletedPart::builder()
                    .part_number(sdk_part_number(p.part_number)?)
                    .e_tag(&p.content_tag)
                    .build())
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(from_sdk)?;

        required_etag(response.e_tag(), "completed object")
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(from_sdk)?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<String> {
        let response = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(from_sdk)?;

        required_etag(response.e_tag(), "object")
    }

    fn store_name(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_number_conversion() {
        assert_eq!(sdk_part_number(1).unwrap(), 1);
        assert_eq!(sdk_part_number(10_000).unwrap(), 10_000);
        assert!(sdk_part_number(u32::MAX).is_err());
    }

    #[test]
    fn test_missing_etag_is_invalid_response() {
        assert_eq!(required_etag(Some("\"abc\""), "x").unwrap(), "\"abc\"");
        let err = required_etag(None, "part 3").unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_store_creation_rejects_bad_config() {
        let config = S3StoreConfig {
            secret_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(S3Store::new(config).await.is_err());
    }

    fn live_config() -> Option<(S3StoreConfig, String)> {
        if std::env::var("S3_TESTS_ENABLED").ok().as_deref() != Some("1") {
            return None;
        }
        let bucket = std::env::var("S3_TEST_BUCKET")
            .unwrap_or_else(|_| "orbit-upload-test".to_string());
        let config = S3StoreConfig {
            region: std::env::var("AWS_REGION").ok(),
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            force_path_style: std::env::var("S3_ENDPOINT").is_ok(),
            ..Default::default()
        };
        Some((config, bucket))
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_multipart_round_trip() {
        let Some((config, bucket)) = live_config() else {
            return;
        };
        let store = S3Store::new(config).await.unwrap();
        let key = "orbit-upload/live-multipart.bin";

        let id = store.initiate_upload(&bucket, key).await.unwrap();
        let part = Bytes::from(vec![7u8; 5 * 1024 * 1024]);
        let tag = store
            .upload_part(&bucket, key, &id, 1, part)
            .await
            .unwrap();
        let final_tag = store
            .complete_upload(&bucket, key, &id, &[CompletedPart::new(1, tag)])
            .await
            .unwrap();
        assert!(!final_tag.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_abort_and_put() {
        let Some((config, bucket)) = live_config() else {
            return;
        };
        let store = S3Store::new(config).await.unwrap();

        let id = store
            .initiate_upload(&bucket, "orbit-upload/aborted.bin")
            .await
            .unwrap();
        store
            .abort_upload(&bucket, "orbit-upload/aborted.bin", &id)
            .await
            .unwrap();

        let tag = store
            .put_object(&bucket, "orbit-upload/small.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(!tag.is_empty());
    }
}
