//! Progress events for uploads
//!
//! The engine reports what it is doing through an unbounded channel so the
//! caller can drive a progress bar, log JSON lines, or ignore it entirely.
//!
//! # Example
//!
//! ```no_run
//! use orbit_upload::core::progress::{ProgressEvent, ProgressReporter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (reporter, mut receiver) = ProgressReporter::new();
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = receiver.recv().await {
//!             if let ProgressEvent::Progress { percentage, .. } = event {
//!                 println!("{:.1}%", percentage);
//!             }
//!         }
//!     });
//!
//!     // Hand `reporter` to an Uploader...
//!     # drop(reporter);
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::FailureKind;
use crate::protocol::StoreOperation;

/// Progress event for one upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Upload started
    UploadStarted {
        /// Object key
        key: String,
        /// Total bytes to upload
        total_bytes: u64,
        /// "single-shot" or "multipart"
        strategy: String,
        /// Number of parts (1 for single-shot)
        part_count: u64,
    },

    /// A part was accepted by the store
    PartCompleted {
        key: String,
        part_number: u32,
        /// Bytes in this part
        part_bytes: u64,
        /// Attempts it took
        attempts: u32,
    },

    /// A request failed transiently and will be retried
    PartRetrying {
        key: String,
        /// Part number, or None for session-level requests
        part_number: Option<u32>,
        operation: StoreOperation,
        /// Attempt that just failed (1-based)
        attempt: u32,
        /// Backoff before the next attempt
        delay_ms: u64,
        reason: String,
    },

    /// A part reached a terminal failure
    PartFailed {
        key: String,
        part_number: u32,
        kind: FailureKind,
        reason: String,
    },

    /// Byte progress
    Progress {
        key: String,
        /// Bytes accepted by the store so far
        bytes_uploaded: u64,
        total_bytes: u64,
        /// Percentage complete (0-100)
        percentage: f64,
    },

    /// Upload completed successfully
    UploadCompleted {
        key: String,
        /// Content tag from the final complete/put response
        content_tag: String,
        total_bytes: u64,
        duration: Duration,
    },

    /// Multipart session was aborted
    UploadAborted { key: String, reason: String },
}

impl ProgressEvent {
    /// Render the event as a single JSON line
    pub fn to_json_line(&self) -> String {
        // Every field is a plain string, number or enum; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Progress reporter for sending progress events
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    sender: Arc<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// Report a progress event
    pub fn report(&self, event: ProgressEvent) {
        // Ignore send errors (receiver might be dropped)
        let _ = self.sender.send(event);
    }

    /// Report byte progress
    pub fn progress(&self, key: &str, bytes_uploaded: u64, total_bytes: u64) {
        let percentage = if total_bytes > 0 {
            (bytes_uploaded as f64 / total_bytes as f64) * 100.0
        } else {
            100.0
        };

        self.report(ProgressEvent::Progress {
            key: key.to_string(),
            bytes_uploaded,
            total_bytes,
            percentage,
        });
    }

    /// Report a retry about to happen
    pub fn retrying(
        &self,
        key: &str,
        part_number: Option<u32>,
        operation: StoreOperation,
        attempt: u32,
        delay: Duration,
        reason: String,
    ) {
        self.report(ProgressEvent::PartRetrying {
            key: key.to_string(),
            part_number,
            operation,
            attempt,
            delay_ms: delay.as_millis() as u64,
            reason,
        });
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        let (sender, _) = unbounded_channel();
        Self {
            sender: Arc::new(sender),
        }
    }
}
