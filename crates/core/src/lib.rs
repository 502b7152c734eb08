pub mod artifact;
pub mod batch;
pub mod config;
pub mod record;

pub use artifact::{batch_dir, ArtifactLayout, ArtifactNaming, ARTIFACT_EXT};
pub use batch::{batch_count, partition, Batch};
pub use config::{
    ConfigError, CoordinatorConfig, FetchConfig, PathsConfig, PipelineConfig, PreprocessConfig,
    RunMode, Split, StrategyKind, DEFAULT_MAX_WORKERS,
};
pub use record::{ImageLink, LabeledRecord, Record};
