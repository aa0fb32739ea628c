/*!
 * Core upload engine
 *
 * Policy picks a strategy, the coordinator drives the chunker and a bounded
 * pool of part uploaders, and the tracker collects what they report.
 */

pub mod cancel;
pub mod chunker;
pub mod coordinator;
pub mod policy;
pub mod progress;
pub mod retry;
pub mod session;
pub mod tracker;
pub mod transfer;
pub mod uploader;

pub use cancel::CancelHandle;
pub use chunker::{part_count, Chunker, PartTask};
pub use coordinator::{CoordinatorState, UploadCoordinator};
pub use policy::{choose_strategy, UploadStrategy};
pub use progress::{ProgressEvent, ProgressReporter};
pub use retry::RetryPolicy;
pub use session::{
    FailedPart, PartResult, PartStatus, RemoteState, SessionOutcome, SessionStatus, UploadSession,
};
pub use tracker::ProgressTracker;
pub use transfer::{upload, Uploader};
pub use uploader::{PartReport, PartUploader};
