pub mod coordinator;
pub mod error;
mod pool;
pub mod progress;
pub mod report;
pub mod runner;

pub use coordinator::{BatchCoordinator, CoordinatorRun, OutputDirs};
pub use error::PipelineError;
pub use progress::Progress;
pub use report::{PreprocessReport, RecordOutcome, RunReport};
pub use runner::{DatasetReport, DatasetRunner};
