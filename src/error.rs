/*!
 * Error types for orbit-upload
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::protocol::{StoreError, StoreOperation};

pub type UploadResult<T> = std::result::Result<T, UploadError>;

/// Result of the best-effort abort that follows a failed complete-upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortAttempt {
    /// The remote session was aborted
    Aborted,
    /// The abort request failed; the remote session may still be active
    Failed(String),
}

impl fmt::Display for AbortAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortAttempt::Aborted => write!(f, "session aborted"),
            AbortAttempt::Failed(reason) => write!(f, "abort failed: {}", reason),
        }
    }
}

/// How a part (or request) failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retryable failures kept happening until the retry bound was reached
    RetriesExhausted,
    /// Non-retryable failure; no retry was attempted
    Permanent,
    /// The source could not supply the part's bytes
    Source,
    /// The worker uploading the part stopped without reporting a result
    Lost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::RetriesExhausted => "retries exhausted",
            FailureKind::Permanent => "permanent",
            FailureKind::Source => "source",
            FailureKind::Lost => "lost",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum UploadError {
    /// Bad part size, concurrency or threshold; raised before any network call
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration could not be loaded or saved
    #[error("Configuration error: {0}")]
    Config(String),

    /// A retryable failure outlived the retry bound
    #[error("{operation} failed after {attempts} attempts: {source}")]
    TransientUpload {
        operation: StoreOperation,
        part_number: Option<u32>,
        attempts: u32,
        source: StoreError,
    },

    /// Non-retryable failure (auth, not-found, malformed request)
    #[error("{operation} failed permanently: {source}")]
    PermanentUpload {
        operation: StoreOperation,
        part_number: Option<u32>,
        source: StoreError,
    },

    /// complete-upload failed after every part succeeded
    #[error("Failed to complete upload {upload_id}: {source} ({abort})")]
    SessionFinalization {
        upload_id: String,
        source: StoreError,
        abort: AbortAttempt,
    },

    /// The byte source failed or ended early
    #[error("Source error: {0}")]
    Source(String),

    /// The caller cancelled the upload
    #[error("Upload cancelled")]
    Cancelled,

    /// The engine itself failed (worker pool shut down unexpectedly)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// Classify a store error raised by `operation` after `attempts` tries
    pub fn from_store(
        operation: StoreOperation,
        part_number: Option<u32>,
        attempts: u32,
        error: StoreError,
    ) -> Self {
        if error.is_retryable() {
            UploadError::TransientUpload {
                operation,
                part_number,
                attempts,
                source: error,
            }
        } else {
            UploadError::PermanentUpload {
                operation,
                part_number,
                source: error,
            }
        }
    }

    /// Part number the error refers to, if any
    pub fn part_number(&self) -> Option<u32> {
        match self {
            UploadError::TransientUpload { part_number, .. }
            | UploadError::PermanentUpload { part_number, .. } => *part_number,
            _ => None,
        }
    }

    /// Check if this error was detected before any network call
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            UploadError::InvalidConfiguration(_) | UploadError::Config(_)
        )
    }
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        UploadError::Source(err.to_string())
    }
}
