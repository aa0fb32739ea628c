/*!
 * Uploads a single part with bounded retry
 */

use std::sync::Arc;
use tracing::{debug, warn};

use super::chunker::PartTask;
use super::progress::ProgressReporter;
use super::retry::RetryPolicy;
use super::session::{PartResult, UploadSession};
use crate::error::{FailureKind, UploadError};
use crate::protocol::{ObjectStore, StoreOperation};

/// A part result together with the error that caused a failure
#[derive(Debug)]
pub struct PartReport {
    pub result: PartResult,
    pub error: Option<UploadError>,
}

/// Uploads parts of one session to the store
pub struct PartUploader<S: ?Sized> {
    store: Arc<S>,
    policy: RetryPolicy,
    reporter: ProgressReporter,
}

impl<S: ?Sized> Clone for PartUploader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

impl<S: ObjectStore + ?Sized> PartUploader<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy, reporter: ProgressReporter) -> Self {
        Self {
            store,
            policy,
            reporter,
        }
    }

    /// Upload one part and return its terminal result.
    ///
    /// Transient failures are retried up to the policy bound; permanent
    /// failures return at once. The result is never dropped.
    pub async fn upload(&self, session: &UploadSession, task: PartTask) -> PartResult {
        self.upload_report(session, task).await.result
    }

    /// Like [`upload`](Self::upload), keeping the classified error of a failed part
    pub async fn upload_report(&self, session: &UploadSession, task: PartTask) -> PartReport {
        let part_number = task.part_number;
        let size = task.len();
        let prior_attempts = task.attempts;

        let attempted = self
            .policy
            .run(
                || {
                    self.store.upload_part(
                        &session.bucket,
                        &session.key,
                        &session.upload_id,
                        part_number,
                        task.data.clone(),
                    )
                },
                |attempt, delay, err| {
                    warn!(
                        part_number,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Part upload failed, retrying"
                    );
                    self.reporter.retrying(
                        &session.key,
                        Some(part_number),
                        StoreOperation::UploadPart,
                        attempt,
                        delay,
                        err.to_string(),
                    );
                },
            )
            .await;

        let attempts = prior_attempts + attempted.attempts;
        match attempted.result {
            Ok(tag) => {
                debug!(part_number, size, attempts, "Part uploaded");
                PartReport {
                    result: PartResult::success(part_number, tag, size, attempts),
                    error: None,
                }
            }
            Err(err) => {
                let kind = if err.is_retryable() {
                    FailureKind::RetriesExhausted
                } else {
                    FailureKind::Permanent
                };
                warn!(part_number, attempts, %kind, error = %err, "Part upload failed");
                PartReport {
                    result: PartResult::failed(part_number, size, attempts, kind, err.to_string()),
                    error: Some(UploadError::from_store(
                        StoreOperation::UploadPart,
                        Some(part_number),
                        attempts,
                        err,
                    )),
                }
            }
        }
    }
}
