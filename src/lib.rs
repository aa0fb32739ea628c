/*!
 * Orbit Upload - concurrent multipart object upload engine
 *
 * Uploads objects to S3-compatible stores with:
 * - Single-shot or multipart strategy chosen by object size
 * - A bounded pool of part uploads (1-8 in flight)
 * - Per-part retry with exponential backoff and per-attempt timeouts
 * - Exactly one complete or abort per multipart session
 * - Progress events and cooperative cancellation
 *
 * The store itself is a collaborator behind the [`protocol::ObjectStore`]
 * trait: an in-memory store ships for tests, and a native S3 store is
 * available with the `s3-native` feature.
 *
 * # Example
 *
 * ```
 * use orbit_upload::protocol::MemoryStore;
 * use orbit_upload::{upload, UploadConfig, UploadSource};
 * use std::sync::Arc;
 *
 * #[tokio::main]
 * async fn main() -> orbit_upload::UploadResult<()> {
 *     let store = Arc::new(MemoryStore::new().with_bucket("backups"));
 *     let config = UploadConfig {
 *         part_size: 1024,
 *         multipart_threshold: 1024,
 *         ..Default::default()
 *     };
 *
 *     let source = UploadSource::from_bytes(vec![0u8; 5000]);
 *     let outcome = upload(store, source, "backups", "db.dump", &config).await?;
 *
 *     assert!(outcome.is_completed());
 *     assert_eq!(outcome.part_count, 5);
 *     Ok(())
 * }
 * ```
 */

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod source;

// Re-export commonly used types
pub use config::{LogLevel, LoggingConfig, UploadConfig, UploadConfigBuilder};
pub use crate::core::{
    upload, CancelHandle, ProgressEvent, ProgressReporter, RemoteState, SessionOutcome,
    SessionStatus, Uploader,
};
pub use error::{UploadError, UploadResult};
pub use protocol::{ObjectStore, StoreError};
pub use source::UploadSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
