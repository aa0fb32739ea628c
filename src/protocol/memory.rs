//! In-memory object store for testing
//!
//! This provides an S3-like implementation of [`ObjectStore`] that keeps
//! buckets, objects and pending multipart sessions in memory. Faults and
//! latency can be injected per operation or per part number, and every call is
//! counted so tests can assert exactly which primitives the engine used.
//!
//! # Example
//!
//! ```rust
//! use orbit_upload::protocol::{MemoryStore, ObjectStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new().with_bucket("photos");
//!     store.put_object("photos", "cat.jpg", "meow".into()).await.unwrap();
//!
//!     assert_eq!(store.object("photos", "cat.jpg").unwrap(), "meow");
//!     assert_eq!(store.calls().put_object, 1);
//! }
//! ```

use super::{CompletedPart, ObjectStore, StoreError, StoreOperation, StoreResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A failure the store will return for matching requests
#[derive(Debug, Clone)]
pub struct Fault {
    error: StoreError,
    /// Remaining failures; `None` fails forever
    remaining: Option<u32>,
}

impl Fault {
    /// Fail the next `times` matching requests, then succeed
    pub fn times(error: StoreError, times: u32) -> Self {
        Self {
            error,
            remaining: Some(times),
        }
    }

    /// Fail every matching request
    pub fn always(error: StoreError) -> Self {
        Self {
            error,
            remaining: None,
        }
    }

    fn fire(&mut self) -> Option<StoreError> {
        match &mut self.remaining {
            None => Some(self.error.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.error.clone())
            }
        }
    }
}

/// Number of calls made to each primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub initiate_upload: u32,
    pub upload_part: u32,
    pub complete_upload: u32,
    pub abort_upload: u32,
    pub put_object: u32,
}

impl CallCounts {
    /// Total number of requests of any kind
    pub fn total(&self) -> u32 {
        self.initiate_upload
            + self.upload_part
            + self.complete_upload
            + self.abort_upload
            + self.put_object
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_tag: String,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, StoredObject>,
}

#[derive(Debug, Default)]
struct StoreState {
    buckets: HashSet<String>,
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    next_upload_id: u64,
    operation_faults: HashMap<StoreOperation, Fault>,
    part_faults: HashMap<u32, Fault>,
    latency: Duration,
    part_latency: HashMap<u32, Duration>,
    complete_latency: Duration,
    calls: CallCounts,
    part_attempts: HashMap<u32, u32>,
    completed_part_lists: Vec<Vec<CompletedPart>>,
}

impl StoreState {
    fn fire(&mut self, operation: StoreOperation) -> Option<StoreError> {
        self.operation_faults.get_mut(&operation)?.fire()
    }

    fn require_bucket(&self, bucket: &str) -> StoreResult<()> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(StoreError::BucketNotFound(bucket.to_string()))
        }
    }

    fn upload_mut(
        &mut self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<&mut PendingUpload> {
        match self.uploads.get_mut(upload_id) {
            Some(upload) if upload.bucket == bucket && upload.key == key => Ok(upload),
            _ => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: format!("{}?uploadId={}", key, upload_id),
            }),
        }
    }

    fn complete(
        &mut self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String> {
        self.calls.complete_upload += 1;
        self.completed_part_lists.push(parts.to_vec());
        if let Some(err) = self.fire(StoreOperation::CompleteUpload) {
            return Err(err);
        }

        let upload = self.upload_mut(bucket, key, upload_id)?;
        if parts.is_empty() {
            return Err(StoreError::InvalidRequest(
                "complete-upload requires at least one part".to_string(),
            ));
        }

        let mut assembled = BytesMut::new();
        for (index, part) in parts.iter().enumerate() {
            let expected = index as u32 + 1;
            if part.part_number != expected {
                return Err(StoreError::InvalidRequest(format!(
                    "InvalidPartOrder: expected part {} at position {}, got {}",
                    expected, index, part.part_number
                )));
            }
            match upload.parts.get(&part.part_number) {
                Some(stored) if stored.content_tag == part.content_tag => {
                    assembled.extend_from_slice(&stored.data);
                }
                _ => {
                    return Err(StoreError::InvalidRequest(format!(
                        "InvalidPart: part {} with tag {} was not uploaded",
                        part.part_number, part.content_tag
                    )));
                }
            }
        }

        let tag = multipart_tag(parts);
        self.uploads.remove(upload_id);
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: assembled.freeze(),
                content_tag: tag.clone(),
            },
        );
        Ok(tag)
    }
}

/// In-memory S3-like store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Tracks concurrent `upload_part` calls for the lifetime of one request
struct InFlightGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    /// Create a new empty store with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bucket creation
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.create_bucket(bucket);
        self
    }

    /// Create a bucket
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.state().buckets.insert(bucket.into());
    }

    /// Make `operation` fail according to `fault`
    pub fn inject_fault(&self, operation: StoreOperation, fault: Fault) {
        self.state().operation_faults.insert(operation, fault);
    }

    /// Make uploads of `part_number` fail according to `fault`
    pub fn inject_part_fault(&self, part_number: u32, fault: Fault) {
        self.state().part_faults.insert(part_number, fault);
    }

    /// Delay every `upload_part` and `put_object` call
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Delay complete-upload responses. The object is assembled before the
    /// delay, so a caller that gives up early still leaves it completed.
    pub fn set_complete_latency(&self, latency: Duration) {
        self.state().complete_latency = latency;
    }

    /// Delay uploads of one part number (overrides the store-wide latency)
    pub fn set_part_latency(&self, part_number: u32, latency: Duration) {
        self.state().part_latency.insert(part_number, latency);
    }

    /// Calls made so far
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Number of `upload_part` calls made for `part_number`
    pub fn part_attempts(&self, part_number: u32) -> u32 {
        self.state()
            .part_attempts
            .get(&part_number)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of `upload_part` calls observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Every part list passed to `complete_upload`, in call order
    pub fn completed_part_lists(&self) -> Vec<Vec<CompletedPart>> {
        self.state().completed_part_lists.clone()
    }

    /// Multipart sessions that are neither completed nor aborted
    pub fn active_uploads(&self) -> usize {
        self.state().uploads.len()
    }

    /// Stored object data
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Stored object content tag
    pub fn object_tag(&self, bucket: &str, key: &str) -> Option<String> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.content_tag.clone())
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Content tag of a single buffer
pub fn content_tag(data: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(data));
    digest[..32].to_string()
}

/// Content tag of an assembled multipart object: hash of the part tags plus
/// the part count, the way S3 ETags multipart objects
fn multipart_tag(parts: &[CompletedPart]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.content_tag.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", &digest[..32], parts.len())
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn initiate_upload(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let mut state = self.state();
        state.calls.initiate_upload += 1;
        if let Some(err) = state.fire(StoreOperation::InitiateUpload) {
            return Err(err);
        }
        state.require_bucket(bucket)?;

        state.next_upload_id += 1;
        let upload_id = format!("mem-upload-{:06}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StoreResult<String> {
        let latency = {
            let mut state = self.state();
            state.calls.upload_part += 1;
            *state.part_attempts.entry(part_number).or_insert(0) += 1;
            state
                .part_latency
                .get(&part_number)
                .copied()
                .unwrap_or(state.latency)
        };

        let _guard = InFlightGuard::enter(&self.in_flight, &self.peak_in_flight);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(err) = state.fire(StoreOperation::UploadPart) {
            return Err(err);
        }
        if let Some(err) = state
            .part_faults
            .get_mut(&part_number)
            .and_then(Fault::fire)
        {
            return Err(err);
        }
        if part_number == 0 || part_number > 10_000 {
            return Err(StoreError::InvalidRequest(format!(
                "part number {} outside 1..=10000",
                part_number
            )));
        }

        let tag = content_tag(&data);
        let upload = state.upload_mut(bucket, key, upload_id)?;
        upload.parts.insert(
            part_number,
            StoredObject {
                data,
                content_tag: tag.clone(),
            },
        );
        Ok(tag)
    }

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<String> {
        let (result, latency) = {
            let mut state = self.state();
            let latency = state.complete_latency;
            (state.complete(bucket, key, upload_id, parts), latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        result
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.calls.abort_upload += 1;
        if let Some(err) = state.fire(StoreOperation::AbortUpload) {
            return Err(err);
        }
        state.upload_mut(bucket, key, upload_id)?;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> StoreResult<String> {
        let latency = {
            let mut state = self.state();
            state.calls.put_object += 1;
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(err) = state.fire(StoreOperation::PutObject) {
            return Err(err);
        }
        state.require_bucket(bucket)?;

        let tag = content_tag(&data);
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_tag: tag.clone(),
            },
        );
        Ok(tag)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
