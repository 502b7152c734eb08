use imgprep_core::ConfigError;
use imgprep_fetch::FetchError;
use imgprep_manifest::ManifestError;
use imgprep_storage::StorageError;
use thiserror::Error;

/// Failures that abort a run. Per-record problems never surface here; they
/// are reported through [`crate::RecordOutcome`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Output directory error: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to set up fetcher: {0}")]
    Fetcher(#[from] FetchError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
