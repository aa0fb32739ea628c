/*!
 * Caller-facing upload entry points
 */

use bytes::BytesMut;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use super::cancel::CancelHandle;
use super::coordinator::UploadCoordinator;
use super::policy::{choose_strategy, UploadStrategy};
use super::progress::{ProgressEvent, ProgressReporter};
use super::retry::RetryPolicy;
use super::session::{RemoteState, SessionOutcome, SessionStatus};
use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::protocol::{ObjectStore, StoreOperation};
use crate::source::UploadSource;

/// Upload `source` to `bucket/key`, choosing single-shot or multipart.
///
/// `Err` is returned only for problems found before the first request
/// (invalid configuration, unreadable source). Failures after that are
/// reported in the [`SessionOutcome`].
pub async fn upload<S>(
    store: Arc<S>,
    source: UploadSource,
    bucket: &str,
    key: &str,
    config: &UploadConfig,
) -> UploadResult<SessionOutcome>
where
    S: ObjectStore + ?Sized + 'static,
{
    Uploader::new(store)
        .with_config(config.clone())
        .upload(source, bucket, key)
        .await
}

/// Reusable upload engine bound to one store
pub struct Uploader<S: ?Sized> {
    store: Arc<S>,
    config: UploadConfig,
    reporter: ProgressReporter,
    cancel: CancelHandle,
}

impl<S: ObjectStore + ?Sized + 'static> Uploader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: UploadConfig::default(),
            reporter: ProgressReporter::default(),
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Handle that cancels uploads started by this uploader
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Upload one object
    pub async fn upload(
        &self,
        source: UploadSource,
        bucket: &str,
        key: &str,
    ) -> UploadResult<SessionOutcome> {
        let total_bytes = source.len();
        let strategy = choose_strategy(total_bytes, &self.config)?;
        let part_count = match strategy {
            UploadStrategy::SingleShot => 1,
            UploadStrategy::Multipart { part_count, .. } => part_count,
        };

        info!(
            store = self.store.store_name(),
            bucket,
            key,
            total_bytes,
            %strategy,
            "Starting upload"
        );
        self.reporter.report(ProgressEvent::UploadStarted {
            key: key.to_string(),
            total_bytes,
            strategy: strategy.to_string(),
            part_count,
        });

        match strategy {
            UploadStrategy::SingleShot => self.put(source, bucket, key).await,
            UploadStrategy::Multipart {
                part_size,
                concurrency,
                ..
            } => {
                let mut coordinator = UploadCoordinator::new(
                    Arc::clone(&self.store),
                    RetryPolicy::from_config(&self.config),
                    self.reporter.clone(),
                    self.cancel.clone(),
                );
                coordinator
                    .run(
                        source.into_reader(),
                        bucket,
                        key,
                        total_bytes,
                        part_size,
                        concurrency,
                    )
                    .await
            }
        }
    }

    /// Single-shot path: one put-object request, retried on transient errors
    async fn put(
        &self,
        source: UploadSource,
        bucket: &str,
        key: &str,
    ) -> UploadResult<SessionOutcome> {
        let started = Instant::now();
        let total_bytes = source.len();
        let len = usize::try_from(total_bytes).map_err(|_| {
            UploadError::InvalidConfiguration(format!(
                "{} bytes is too large for a single request",
                total_bytes
            ))
        })?;

        let mut buffer = BytesMut::zeroed(len);
        source
            .into_reader()
            .read_exact(&mut buffer)
            .await
            .map_err(|e| UploadError::Source(format!("failed to read object: {}", e)))?;
        let data = buffer.freeze();

        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let policy = RetryPolicy::from_config(&self.config);
        let attempted = policy
            .run(
                || self.store.put_object(bucket, key, data.clone()),
                |attempt, delay, err| {
                    self.reporter.retrying(
                        key,
                        None,
                        StoreOperation::PutObject,
                        attempt,
                        delay,
                        err.to_string(),
                    );
                },
            )
            .await;

        match attempted.result {
            Ok(tag) => {
                let duration = started.elapsed();
                info!(bucket, key, content_tag = %tag, total_bytes, "Object uploaded");
                self.reporter.report(ProgressEvent::UploadCompleted {
                    key: key.to_string(),
                    content_tag: tag.clone(),
                    total_bytes,
                    duration,
                });
                Ok(SessionOutcome {
                    status: SessionStatus::Completed,
                    content_tag: Some(tag),
                    total_bytes,
                    error: None,
                    failed_parts: Vec::new(),
                    upload_id: None,
                    part_count: 1,
                    remote_state: RemoteState::None,
                })
            }
            Err(err) => {
                error!(
                    bucket,
                    key,
                    attempts = attempted.attempts,
                    error = %err,
                    "Put object failed"
                );
                Ok(SessionOutcome {
                    status: SessionStatus::Failed,
                    content_tag: None,
                    total_bytes: 0,
                    error: Some(UploadError::from_store(
                        StoreOperation::PutObject,
                        None,
                        attempted.attempts,
                        err,
                    )),
                    failed_parts: Vec::new(),
                    upload_id: None,
                    part_count: 1,
                    remote_state: RemoteState::None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::memory::Fault;
    use crate::protocol::{MemoryStore, StoreError};
    use std::time::Duration;

    fn small_config() -> UploadConfig {
        UploadConfig {
            part_size: 4,
            max_concurrency: 2,
            multipart_threshold: 8,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_small_object_uses_put() {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        let outcome = upload(
            store.clone(),
            UploadSource::from_bytes(&b"tiny"[..]),
            "b",
            "k",
            &small_config(),
        )
        .await
        .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(store.calls().put_object, 1);
        assert_eq!(store.calls().initiate_upload, 0);
        assert_eq!(outcome.content_tag, store.object_tag("b", "k"));
        assert_eq!(outcome.remote_state, RemoteState::None);
    }

    #[tokio::test]
    async fn test_large_object_uses_multipart() {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        let outcome = upload(
            store.clone(),
            UploadSource::from_bytes(vec![9u8; 10]),
            "b",
            "k",
            &small_config(),
        )
        .await
        .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.part_count, 3);
        assert_eq!(store.calls().put_object, 0);
        assert_eq!(store.calls().upload_part, 3);
    }

    #[tokio::test]
    async fn test_put_failure_reported_in_outcome() {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        store.inject_fault(
            StoreOperation::PutObject,
            Fault::always(StoreError::AccessDenied("no".into())),
        );

        let outcome = upload(
            store.clone(),
            UploadSource::from_bytes(&b"tiny"[..]),
            "b",
            "k",
            &small_config(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, SessionStatus::Failed);
        assert!(matches!(
            outcome.error,
            Some(UploadError::PermanentUpload {
                operation: StoreOperation::PutObject,
                ..
            })
        ));
        assert_eq!(store.calls().put_object, 1);
    }

    #[tokio::test]
    async fn test_put_retries_transient_errors() {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        store.inject_fault(
            StoreOperation::PutObject,
            Fault::times(StoreError::Network("reset".into()), 2),
        );

        let outcome = upload(
            store.clone(),
            UploadSource::from_bytes(&b"tiny"[..]),
            "b",
            "k",
            &small_config(),
        )
        .await
        .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(store.calls().put_object, 3);
    }

    #[tokio::test]
    async fn test_short_single_shot_source_is_error() {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        let source = UploadSource::from_reader(std::io::Cursor::new(vec![1u8; 2]), 6);

        let err = upload(store.clone(), source, "b", "k", &small_config())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Source(_)));
        assert_eq!(store.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_uploader_emits_started_and_completed() {
        let store = Arc::new(MemoryStore::new().with_bucket("b"));
        let (reporter, mut rx) = ProgressReporter::new();
        let uploader = Uploader::new(store)
            .with_config(small_config())
            .with_reporter(reporter);

        uploader
            .upload(UploadSource::from_bytes(&b"tiny"[..]), "b", "k")
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::UploadStarted { part_count: 1, .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::UploadCompleted { total_bytes: 4, .. }
        ));
    }
}
