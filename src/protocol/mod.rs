/*!
 * Object-store collaborator layer
 *
 * The upload engine never speaks HTTP itself. It drives any store that offers
 * the five multipart primitives below:
 * - In-memory store (tests, demos)
 * - Native S3 via aws-sdk-s3 (feature `s3-native`)
 */

mod error;
pub mod memory;

#[cfg(feature = "s3-native")]
pub mod s3;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The store primitive a request was issued against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    InitiateUpload,
    UploadPart,
    CompleteUpload,
    AbortUpload,
    PutObject,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::InitiateUpload => "initiate-upload",
            StoreOperation::UploadPart => "upload-part",
            StoreOperation::CompleteUpload => "complete-upload",
            StoreOperation::AbortUpload => "abort-upload",
            StoreOperation::PutObject => "put-object",
        };
        f.write_str(name)
    }
}

/// A part accepted by the store, as presented to `complete_upload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1-based)
    pub part_number: u32,

    /// Content tag (ETag) returned by `upload_part`
    pub content_tag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, content_tag: impl Into<String>) -> Self {
        Self {
            part_number,
            content_tag: content_tag.into(),
        }
    }
}

/// Primitive operations of an S3-compatible object store.
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start a multipart session and return its upload id
    async fn initiate_upload(&self, bucket: &str, key: &str) -> StoreResult<String>;

    /// Upload one part of a multipart session and return its content tag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String>;

    /// Assemble the uploaded parts into the final object.
    ///
    /// `parts` is sorted ascending by part number.
    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String>;

    /// Discard a multipart session and every part uploaded to it
    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> StoreResult<()>;

    /// Upload a whole object in one request
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<String>;

    /// Store name for logging
    fn store_name(&self) -> &'static str;
}
