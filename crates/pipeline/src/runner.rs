use imgprep_core::{PipelineConfig, Split};
use imgprep_manifest::{load_manifest, write_labeled, Labeler};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::coordinator::{BatchCoordinator, OutputDirs};
use crate::error::PipelineError;
use crate::report::{PreprocessReport, RunReport};

/// Summary of one split: fetch, optional preprocessing, labeling.
#[derive(Debug, Clone)]
pub struct DatasetReport {
    pub split: Split,
    pub records: usize,
    pub fetch: RunReport,
    pub preprocess: Option<PreprocessReport>,
    pub labeled: usize,
    pub labeled_csv: PathBuf,
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} records; {}", self.split, self.records, self.fetch)?;
        if let Some(pre) = &self.preprocess {
            write!(f, "; {pre}")?;
        }
        write!(f, "; {} labeled -> {}", self.labeled, self.labeled_csv.display())
    }
}

/// Runs the whole pipeline for the train and test manifests named in the
/// configuration.
pub struct DatasetRunner {
    config: PipelineConfig,
    coordinator: BatchCoordinator,
}

impl DatasetRunner {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let coordinator = BatchCoordinator::from_config(&config)?;
        Ok(Self { config, coordinator })
    }

    /// Load `{split}.csv`, produce artifacts, then write the labeled manifest.
    pub async fn run(&self, split: Split) -> Result<DatasetReport, PipelineError> {
        let paths = &self.config.paths;
        let manifest_csv = paths.manifest_csv(split).to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || load_manifest(&manifest_csv)).await??;
        info!("Processing {split} dataset: {} records", manifest.len());

        let dirs = OutputDirs {
            raw: paths.raw_dir(split),
            processed: paths.processed_dir(split),
        };
        let run = self.coordinator.run(&manifest, &dirs).await?;

        // One existence check per record; keep it off the async workers.
        let records = manifest.len();
        let labeled_csv = paths.labeled_csv(split);
        let labeler = Labeler::new(run.layout);
        let (column, out) = (run.column, labeled_csv.clone());
        let labeled =
            tokio::task::spawn_blocking(move || write_labeled(&out, labeler.label(&manifest), column))
                .await??;

        let report = DatasetReport {
            split,
            records,
            fetch: run.fetch,
            preprocess: run.preprocess,
            labeled,
            labeled_csv,
        };
        info!("Completed {report}");
        Ok(report)
    }

    /// Run each split in order, stopping at the first fatal error.
    pub async fn run_all(&self, splits: &[Split]) -> Result<Vec<DatasetReport>, PipelineError> {
        let mut reports = Vec::with_capacity(splits.len());
        for &split in splits {
            reports.push(self.run(split).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgprep_core::{CoordinatorConfig, FetchConfig, PathsConfig};

    fn runner(base: &std::path::Path) -> DatasetRunner {
        DatasetRunner::new(PipelineConfig {
            paths: PathsConfig {
                base_dir: base.join("out"),
                train_csv: base.join("train.csv"),
                test_csv: base.join("test.csv"),
            },
            fetch: FetchConfig { retries: 1, delay_secs: 0.0, ..FetchConfig::default() },
            coordinator: CoordinatorConfig { workers: Some(2), progress: false, ..CoordinatorConfig::default() },
            ..PipelineConfig::default()
        })
        .unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn labeling_runs_on_a_single_threaded_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("image_link,entity_name\n");
        for i in 0..500 {
            csv.push_str(&format!("not-a-link-{i},item_weight\n"));
        }
        std::fs::write(dir.path().join("test.csv"), csv).unwrap();

        let report = runner(dir.path()).run(Split::Test).await.unwrap();
        assert_eq!(report.records, 500);
        assert_eq!(report.fetch.invalid_link, 500);
        assert_eq!(report.labeled, 0);
        let text = std::fs::read_to_string(&report.labeled_csv).unwrap();
        assert_eq!(text, "index,preprocessed_image_path,entity_name,group_id\n");
    }

    #[tokio::test]
    async fn missing_manifest_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = runner(dir.path()).run(Split::Train).await.unwrap_err();
        assert!(matches!(err, PipelineError::Manifest(_)));
    }

    #[tokio::test]
    async fn run_all_covers_splits_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["train.csv", "test.csv"] {
            std::fs::write(dir.path().join(name), "image_link,entity_name\n123,x\n").unwrap();
        }
        let reports = runner(dir.path()).run_all(&Split::ALL).await.unwrap();
        let splits: Vec<_> = reports.iter().map(|r| r.split).collect();
        assert_eq!(splits, vec![Split::Train, Split::Test]);
    }
}
