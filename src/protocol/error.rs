//! Error types returned by object-store collaborators

use std::io;
use thiserror::Error;

/// Result type alias for object-store primitives
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors an object store can report for a single request
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Service error with a specific error code and, when known, the HTTP status
    #[error("Object store error ({code}): {message}")]
    Service {
        code: String,
        message: String,
        status: Option<u16>,
    },

    /// Object or multipart upload not found
    #[error("Not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket not found or not accessible
    #[error("Bucket not found or not accessible: {0}")]
    BucketNotFound(String),

    /// Access denied error
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The request was rejected as malformed (bad part list, bad upload id, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The store answered but the response was missing required fields
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Throttled by the store
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Unclassified SDK error
    #[error("SDK error: {0}")]
    Sdk(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Add context to an error
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        StoreError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a service error from an error code and HTTP status, folding the
    /// well-known codes into their dedicated variants
    pub fn from_service(code: &str, message: impl Into<String>, status: Option<u16>) -> Self {
        let message = message.into();
        match (code, status) {
            ("NoSuchBucket", _) => StoreError::BucketNotFound(message),
            ("AccessDenied", _) | (_, Some(403)) => StoreError::AccessDenied(message),
            ("InvalidAccessKeyId", _) | ("SignatureDoesNotMatch", _) | (_, Some(401)) => {
                StoreError::Authentication(message)
            }
            ("SlowDown", _) | ("Throttling", _) | (_, Some(429)) => {
                StoreError::RateLimitExceeded(message)
            }
            _ => StoreError::Service {
                code: code.to_string(),
                message,
                status,
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Timeout(_) => true,
            StoreError::RateLimitExceeded(_) => true,
            StoreError::Io(_) => true,
            StoreError::Authentication(_) => false,
            StoreError::Sdk(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("connection reset")
                    || lower.contains("connection timed out")
                    || lower.contains("broken pipe")
                    || lower.contains("connection refused")
                    || lower.contains("temporarily unavailable")
            }
            StoreError::Service { code, status, .. } => {
                is_retryable_code(code) || status.is_some_and(is_retryable_status)
            }
            StoreError::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Check if a service error code is retryable
pub(crate) fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "RequestTimeout"
            | "ServiceUnavailable"
            | "InternalError"
            | "SlowDown"
            | "RequestTimeTooSkewed"
    )
}

/// 5xx and 429 responses are worth another attempt
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
