/*!
 * Session, part result and outcome types
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FailureKind, UploadError};

/// A live multipart session on the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub bucket: String,
    pub key: String,
    /// Id returned by initiate-upload
    pub upload_id: String,
    pub part_size: u64,
    pub max_concurrency: usize,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        part_size: u64,
        max_concurrency: usize,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            part_size,
            max_concurrency,
            created_at: Utc::now(),
        }
    }
}

/// Terminal status of one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    Success,
    Failed { kind: FailureKind, reason: String },
}

/// Terminal result of one part upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartResult {
    pub part_number: u32,
    /// Content tag returned by the store; set only on success
    pub content_tag: Option<String>,
    /// Bytes in the part
    pub size: u64,
    /// Upload attempts made
    pub attempts: u32,
    pub status: PartStatus,
}

impl PartResult {
    pub fn success(part_number: u32, content_tag: String, size: u64, attempts: u32) -> Self {
        Self {
            part_number,
            content_tag: Some(content_tag),
            size,
            attempts,
            status: PartStatus::Success,
        }
    }

    pub fn failed(
        part_number: u32,
        size: u64,
        attempts: u32,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            part_number,
            content_tag: None,
            size,
            attempts,
            status: PartStatus::Failed {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, PartStatus::Success)
    }
}

/// A part that did not make it, as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPart {
    pub part_number: u32,
    pub kind: FailureKind,
    pub attempts: u32,
    pub reason: String,
}

/// Final status of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Completed,
    Aborted,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Aborted => write!(f, "aborted"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What is left on the store after the upload finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    /// No multipart session was ever created
    None,
    /// A multipart session may still exist on the store
    Active,
    Aborted,
    Completed,
    /// Complete-upload timed out and the follow-up abort failed, so the
    /// store may have assembled the object anyway
    Unknown,
}

/// The single terminal result of an upload
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    /// Content tag from the complete-upload or put-object response
    pub content_tag: Option<String>,
    /// Bytes accepted by the store
    pub total_bytes: u64,
    /// Cause of failure, if any
    pub error: Option<UploadError>,
    pub failed_parts: Vec<FailedPart>,
    /// Multipart upload id, if a session was initiated
    pub upload_id: Option<String>,
    /// Parts uploaded (1 for single-shot)
    pub part_count: u64,
    pub remote_state: RemoteState,
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes", self.status, self.total_bytes)?;
        if let Some(tag) = &self.content_tag {
            write!(f, ", tag {}", tag)?;
        }
        if !self.failed_parts.is_empty() {
            let numbers: Vec<String> = self
                .failed_parts
                .iter()
                .map(|p| p.part_number.to_string())
                .collect();
            write!(f, ", failed parts {}", numbers.join(","))?;
        }
        write!(f, ", remote {:?})", self.remote_state)?;
        if let Some(err) = &self.error {
            write!(f, ": {}", err)?;
        }
        Ok(())
    }
}
