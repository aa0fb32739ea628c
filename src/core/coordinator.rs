/*!
 * Multipart session lifecycle
 *
 * The coordinator initiates a session, feeds parts from the chunker to a
 * bounded pool of workers, collects their results through a channel and
 * finally completes or aborts the session. It is the only place that decides
 * between the two.
 *
 * ```text
 * Idle -> Initiating -> Uploading -> Completing -> Completed
 *              |             |            |
 *              v             v            v
 *            Failed       Aborting <------+
 *                          |     |
 *                          v     v
 *                     Aborted   Failed
 * ```
 */

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::cancel::CancelHandle;
use super::chunker::Chunker;
use super::progress::{ProgressEvent, ProgressReporter};
use super::retry::RetryPolicy;
use super::session::{PartResult, RemoteState, SessionOutcome, SessionStatus, UploadSession};
use super::tracker::ProgressTracker;
use super::uploader::{PartReport, PartUploader};
use crate::config::validate_parameters;
use crate::error::{AbortAttempt, FailureKind, UploadError, UploadResult};
use crate::protocol::{ObjectStore, StoreError, StoreOperation};

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorState {
    Idle,
    Initiating,
    Uploading,
    Completing,
    Aborting,
    Completed,
    Aborted,
    Failed,
}

impl CoordinatorState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: CoordinatorState) -> bool {
        use CoordinatorState::*;
        matches!(
            (self, next),
            (Idle, Initiating)
                | (Initiating, Uploading)
                | (Initiating, Failed)
                | (Uploading, Completing)
                | (Uploading, Aborting)
                | (Completing, Completed)
                | (Completing, Aborting)
                | (Aborting, Aborted)
                | (Aborting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CoordinatorState::Completed | CoordinatorState::Aborted | CoordinatorState::Failed
        )
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Initiating => "initiating",
            CoordinatorState::Uploading => "uploading",
            CoordinatorState::Completing => "completing",
            CoordinatorState::Aborting => "aborting",
            CoordinatorState::Completed => "completed",
            CoordinatorState::Aborted => "aborted",
            CoordinatorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why dispatch stopped before the chunker ran dry
#[derive(Debug)]
enum Interruption {
    PartFailed,
    Cancelled,
    Source(UploadError),
    Internal(String),
}

/// Drives one multipart session from initiate to complete or abort
pub struct UploadCoordinator<S: ?Sized> {
    store: Arc<S>,
    policy: RetryPolicy,
    reporter: ProgressReporter,
    cancel: CancelHandle,
    state: CoordinatorState,
    history: Vec<CoordinatorState>,
}

impl<S: ObjectStore + ?Sized + 'static> UploadCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        policy: RetryPolicy,
        reporter: ProgressReporter,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            store,
            policy,
            reporter,
            cancel,
            state: CoordinatorState::Idle,
            history: vec![CoordinatorState::Idle],
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`
    pub fn history(&self) -> &[CoordinatorState] {
        &self.history
    }

    /// Upload `total_bytes` from `reader` as a multipart object.
    ///
    /// Returns `Err` only when the parameters are rejected before any request
    /// is made. Everything that happens afterwards is in the outcome.
    pub async fn run<R>(
        &mut self,
        reader: R,
        bucket: &str,
        key: &str,
        total_bytes: u64,
        part_size: u64,
        max_concurrency: usize,
    ) -> UploadResult<SessionOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        if self.state != CoordinatorState::Idle {
            return Err(UploadError::Internal(format!(
                "coordinator already used (state {})",
                self.state
            )));
        }
        validate_parameters(1, part_size, max_concurrency)?;
        if total_bytes == 0 {
            return Err(UploadError::InvalidConfiguration(
                "multipart upload needs at least one byte".to_string(),
            ));
        }
        let mut chunker = Chunker::new(reader, total_bytes, part_size)?;
        let expected_parts = chunker.part_count();
        let started = Instant::now();

        // Initiate
        self.transition(CoordinatorState::Initiating);
        let initiated = self
            .policy
            .run(
                || self.store.initiate_upload(bucket, key),
                |attempt, delay, err| {
                    self.on_session_retry(key, StoreOperation::InitiateUpload, attempt, delay, err)
                },
            )
            .await;

        let upload_id = match initiated.result {
            Ok(id) => id,
            Err(err) => {
                error!(bucket, key, error = %err, "Failed to initiate multipart upload");
                self.transition(CoordinatorState::Failed);
                return Ok(SessionOutcome {
                    status: SessionStatus::Failed,
                    content_tag: None,
                    total_bytes: 0,
                    error: Some(UploadError::from_store(
                        StoreOperation::InitiateUpload,
                        None,
                        initiated.attempts,
                        err,
                    )),
                    failed_parts: Vec::new(),
                    upload_id: None,
                    part_count: expected_parts,
                    remote_state: RemoteState::None,
                });
            }
        };

        let session = Arc::new(UploadSession::new(
            bucket,
            key,
            upload_id,
            part_size,
            max_concurrency,
        ));
        info!(
            bucket,
            key,
            upload_id = %session.upload_id,
            parts = expected_parts,
            concurrency = max_concurrency,
            "Multipart upload initiated"
        );

        // Upload parts
        self.transition(CoordinatorState::Uploading);
        let tracker = ProgressTracker::new(key, total_bytes, self.reporter.clone());
        let mut first_error: Option<UploadError> = None;
        let interruption = self
            .dispatch(&session, &mut chunker, &tracker, &mut first_error)
            .await;

        let all_succeeded = interruption.is_none() && tracker.all_succeeded(expected_parts);

        if all_succeeded {
            return Ok(self.complete(&session, &tracker, expected_parts, started).await);
        }

        let cause = match interruption {
            Some(Interruption::Cancelled) => UploadError::Cancelled,
            Some(Interruption::Source(err)) => err,
            Some(Interruption::Internal(msg)) => UploadError::Internal(msg),
            Some(Interruption::PartFailed) | None => first_error.unwrap_or_else(|| {
                UploadError::Internal(format!(
                    "{} of {} parts finished",
                    tracker.succeeded(),
                    expected_parts
                ))
            }),
        };

        self.transition(CoordinatorState::Aborting);
        let abort = self.abort(&session, &cause.to_string()).await;
        let (status, remote_state) = match abort {
            AbortAttempt::Aborted => {
                self.transition(CoordinatorState::Aborted);
                (SessionStatus::Aborted, RemoteState::Aborted)
            }
            AbortAttempt::Failed(_) => {
                self.transition(CoordinatorState::Failed);
                (SessionStatus::Failed, RemoteState::Active)
            }
        };

        Ok(SessionOutcome {
            status,
            content_tag: None,
            total_bytes: tracker.bytes_uploaded(),
            error: Some(cause),
            failed_parts: tracker.failures(),
            upload_id: Some(session.upload_id.clone()),
            part_count: expected_parts,
            remote_state,
        })
    }

    /// Feed parts to workers until the chunker is exhausted or something
    /// stops dispatch, then wait for every dispatched part to report.
    async fn dispatch<R>(
        &self,
        session: &Arc<UploadSession>,
        chunker: &mut Chunker<R>,
        tracker: &ProgressTracker,
        first_error: &mut Option<UploadError>,
    ) -> Option<Interruption>
    where
        R: AsyncRead + Unpin + Send,
    {
        let semaphore = Arc::new(Semaphore::new(session.max_concurrency));
        let (tx, mut rx) = unbounded_channel::<PartReport>();
        let mut workers = JoinSet::new();
        let mut dispatched: BTreeMap<u32, u64> = BTreeMap::new();
        let uploader = PartUploader::new(
            Arc::clone(&self.store),
            self.policy.clone(),
            self.reporter.clone(),
        );

        let interruption = loop {
            drain(&mut rx, tracker, first_error);
            if tracker.has_failures() {
                break Some(Interruption::PartFailed);
            }
            if self.cancel.is_cancelled() {
                break Some(Interruption::Cancelled);
            }

            let permit: OwnedSemaphorePermit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Some(Interruption::Cancelled),
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Some(Interruption::Internal("worker pool closed".to_string())),
                },
            };

            // A worker that just released its permit may have failed
            drain(&mut rx, tracker, first_error);
            if tracker.has_failures() {
                break Some(Interruption::PartFailed);
            }

            // A stalled source must not hold off cancellation
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Some(Interruption::Cancelled),
                read = chunker.next_part() => read,
            };

            let task = match read {
                Ok(Some(task)) => task,
                Ok(None) => break None,
                Err(err) => {
                    let part_number = dispatched.len() as u32 + 1;
                    warn!(part_number, error = %err, "Failed to read part from source");
                    tracker.record(PartResult::failed(
                        part_number,
                        0,
                        0,
                        FailureKind::Source,
                        err.to_string(),
                    ));
                    break Some(Interruption::Source(err));
                }
            };

            debug!(part_number = task.part_number, size = task.len(), "Dispatching part");
            dispatched.insert(task.part_number, task.len());

            let uploader = uploader.clone();
            let session = Arc::clone(session);
            let tx = tx.clone();
            workers.spawn(async move {
                let report = uploader.upload_report(&session, task).await;
                let _ = tx.send(report);
                // Released only after the result is queued
                drop(permit);
            });
        };

        if interruption.is_some() {
            info!(in_flight = workers.len(), "Dispatch stopped, draining in-flight parts");
        }

        drop(tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Part worker did not finish");
            }
        }
        drain(&mut rx, tracker, first_error);

        for (&part_number, &size) in &dispatched {
            if !tracker.contains(part_number) {
                tracker.record(PartResult::failed(
                    part_number,
                    size,
                    0,
                    FailureKind::Lost,
                    "worker stopped without reporting a result",
                ));
                if first_error.is_none() {
                    *first_error = Some(UploadError::Internal(format!(
                        "part {} produced no result",
                        part_number
                    )));
                }
            }
        }

        interruption
    }

    async fn complete(
        &mut self,
        session: &UploadSession,
        tracker: &ProgressTracker,
        expected_parts: u64,
        started: Instant,
    ) -> SessionOutcome {
        self.transition(CoordinatorState::Completing);
        let parts = tracker.completed_parts();
        let total_bytes = tracker.bytes_uploaded();

        // A timed-out complete may already have assembled the object, and a
        // repeat would then fail with not-found
        let completed = self
            .policy
            .run_if(
                || {
                    self.store.complete_upload(
                        &session.bucket,
                        &session.key,
                        &session.upload_id,
                        &parts,
                    )
                },
                |err| err.is_retryable() && !matches!(err, StoreError::Timeout(_)),
                |attempt, delay, err| {
                    self.on_session_retry(
                        &session.key,
                        StoreOperation::CompleteUpload,
                        attempt,
                        delay,
                        err,
                    )
                },
            )
            .await;

        match completed.result {
            Ok(tag) => {
                self.transition(CoordinatorState::Completed);
                let duration = started.elapsed();
                info!(
                    key = %session.key,
                    upload_id = %session.upload_id,
                    content_tag = %tag,
                    total_bytes,
                    duration_ms = duration.as_millis() as u64,
                    "Multipart upload completed"
                );
                self.reporter.report(ProgressEvent::UploadCompleted {
                    key: session.key.clone(),
                    content_tag: tag.clone(),
                    total_bytes,
                    duration,
                });

                SessionOutcome {
                    status: SessionStatus::Completed,
                    content_tag: Some(tag),
                    total_bytes,
                    error: None,
                    failed_parts: Vec::new(),
                    upload_id: Some(session.upload_id.clone()),
                    part_count: expected_parts,
                    remote_state: RemoteState::Completed,
                }
            }
            Err(err) => {
                error!(
                    upload_id = %session.upload_id,
                    attempts = completed.attempts,
                    error = %err,
                    "Failed to complete multipart upload"
                );
                self.transition(CoordinatorState::Aborting);
                let abort = self.abort(session, &err.to_string()).await;
                self.transition(CoordinatorState::Failed);

                let remote_state = match (&abort, &err) {
                    (AbortAttempt::Aborted, _) => RemoteState::Aborted,
                    (AbortAttempt::Failed(_), StoreError::Timeout(_)) => RemoteState::Unknown,
                    (AbortAttempt::Failed(_), _) => RemoteState::Active,
                };

                SessionOutcome {
                    status: SessionStatus::Failed,
                    content_tag: None,
                    total_bytes,
                    error: Some(UploadError::SessionFinalization {
                        upload_id: session.upload_id.clone(),
                        source: err,
                        abort,
                    }),
                    failed_parts: Vec::new(),
                    upload_id: Some(session.upload_id.clone()),
                    part_count: expected_parts,
                    remote_state,
                }
            }
        }
    }

    /// Abort the session exactly once; never retried
    async fn abort(&self, session: &UploadSession, reason: &str) -> AbortAttempt {
        warn!(upload_id = %session.upload_id, reason, "Aborting multipart upload");

        let aborted = tokio::time::timeout(
            self.policy.attempt_timeout,
            self.store.abort_upload(&session.bucket, &session.key, &session.upload_id),
        )
        .await;

        match aborted {
            Ok(Ok(())) => {
                self.reporter.report(ProgressEvent::UploadAborted {
                    key: session.key.clone(),
                    reason: reason.to_string(),
                });
                AbortAttempt::Aborted
            }
            Ok(Err(err)) => {
                error!(
                    upload_id = %session.upload_id,
                    error = %err,
                    "Abort failed, session may still be active"
                );
                AbortAttempt::Failed(err.to_string())
            }
            Err(_) => {
                error!(
                    upload_id = %session.upload_id,
                    "Abort timed out, session may still be active"
                );
                AbortAttempt::Failed(format!(
                    "abort timed out after {:?}",
                    self.policy.attempt_timeout
                ))
            }
        }
    }

    fn on_session_retry(
        &self,
        key: &str,
        operation: StoreOperation,
        attempt: u32,
        delay: std::time::Duration,
        err: &StoreError,
    ) {
        warn!(%operation, attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
        self.reporter
            .retrying(key, None, operation, attempt, delay, err.to_string());
    }

    fn transition(&mut self, next: CoordinatorState) {
        let allowed = self.state.can_transition_to(next);
        debug_assert!(allowed, "illegal transition {} -> {}", self.state, next);
        if !allowed {
            error!(from = %self.state, to = %next, "Rejected state transition");
            return;
        }
        info!(from = %self.state, to = %next, "Upload state changed");
        self.state = next;
        self.history.push(next);
    }
}

/// Move every queued report into the tracker
fn drain(
    rx: &mut UnboundedReceiver<PartReport>,
    tracker: &ProgressTracker,
    first_error: &mut Option<UploadError>,
) {
    while let Ok(report) = rx.try_recv() {
        if first_error.is_none() {
            *first_error = report.error;
        }
        tracker.record(report.result);
    }
}
