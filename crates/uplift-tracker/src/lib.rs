/*
[INPUT]:  Public API exports for uplift-tracker crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod cancel;
pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod progress;
pub mod record;
pub mod registry;

// Re-export main types for convenience
pub use cancel::CancelOutcome;
pub use config::{ConfigError, TrackerConfig};
pub use lifecycle::{PreprocessFailurePolicy, RunnerSettings, TaskFailure, TaskRunner};
pub use manager::UploadManager;
pub use progress::{ProgressSummary, aggregate};
pub use record::{TaskId, TaskPatch, TaskRecord, TaskStatus};
pub use registry::TaskRegistry;
