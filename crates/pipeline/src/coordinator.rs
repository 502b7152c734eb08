use imgprep_core::{
    batch_count, batch_dir, partition, ArtifactLayout, ArtifactNaming, CoordinatorConfig,
    PipelineConfig, Record, RunMode, ARTIFACT_EXT,
};
use imgprep_fetch::Fetcher;
use imgprep_manifest::{Manifest, PathColumn};
use imgprep_preprocess::Preprocessor;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::pool::run_bounded;
use crate::progress::Progress;
use crate::report::{PreprocessReport, RecordOutcome, RunReport};

/// Where a run puts raw downloads and preprocessed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub raw: PathBuf,
    pub processed: PathBuf,
}

/// What a coordinator run produced and how to find it again.
#[derive(Debug, Clone)]
pub struct CoordinatorRun {
    pub fetch: RunReport,
    /// Present when flat mode ran a separate preprocessing pass.
    pub preprocess: Option<PreprocessReport>,
    /// Layout of the artifacts the labeler should look for.
    pub layout: ArtifactLayout,
    pub column: PathColumn,
}

/// Drives fetch and preprocessing over a whole manifest with a bounded
/// number of concurrent workers.
pub struct BatchCoordinator {
    fetcher: Arc<Fetcher>,
    preprocessor: Arc<Preprocessor>,
    mode: RunMode,
    preprocess_enabled: bool,
    batch_size: NonZeroUsize,
    workers: usize,
    cpu_workers: usize,
    show_progress: bool,
    completed: Arc<AtomicU64>,
}

impl BatchCoordinator {
    pub fn new(fetcher: Fetcher, preprocessor: Preprocessor, cfg: &CoordinatorConfig) -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = cfg.effective_workers(available);
        Self {
            fetcher: Arc::new(fetcher),
            preprocessor: Arc::new(preprocessor),
            mode: cfg.mode,
            preprocess_enabled: true,
            batch_size: cfg.batch_size(),
            workers,
            cpu_workers: workers.min(available).max(1),
            show_progress: cfg.progress,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Result<Self, PipelineError> {
        cfg.validate()?;
        let fetcher = Fetcher::new(&cfg.fetch)?;
        let preprocessor = Preprocessor::from_config(&cfg.preprocess);
        Ok(Self::new(fetcher, preprocessor, &cfg.coordinator).with_preprocessing(cfg.preprocess.enabled))
    }

    pub fn with_preprocessing(mut self, enabled: bool) -> Self {
        self.preprocess_enabled = enabled;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Units of work finished so far across every stage of this coordinator.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn progress(&self, total: usize, message: impl Into<String>) -> Progress {
        Progress::new(total, message, self.show_progress, self.completed.clone())
    }

    /// Run the configured mode over `manifest`.
    pub async fn run(&self, manifest: &Manifest, dirs: &OutputDirs) -> Result<CoordinatorRun, PipelineError> {
        match self.mode {
            RunMode::Flat => {
                let fetch = self.download_all(manifest, &dirs.raw).await?;
                if !self.preprocess_enabled {
                    return Ok(CoordinatorRun {
                        fetch,
                        preprocess: None,
                        layout: ArtifactLayout::flat(&dirs.raw, ArtifactNaming::IndexEntity),
                        column: PathColumn::ImagePath,
                    });
                }
                let preprocess = self.preprocess_dir(&dirs.raw, &dirs.processed).await?;
                Ok(CoordinatorRun {
                    fetch,
                    preprocess: Some(preprocess),
                    layout: ArtifactLayout::flat(&dirs.processed, ArtifactNaming::IndexEntity),
                    column: PathColumn::PreprocessedImagePath,
                })
            }
            RunMode::Chunked => {
                let (root, column) = if self.preprocess_enabled {
                    (&dirs.processed, PathColumn::PreprocessedImagePath)
                } else {
                    (&dirs.raw, PathColumn::ImagePath)
                };
                let fetch = self.run_chunked(manifest, root).await?;
                Ok(CoordinatorRun {
                    fetch,
                    preprocess: None,
                    layout: ArtifactLayout::batched(root, ArtifactNaming::IndexOnly, self.batch_size),
                    column,
                })
            }
        }
    }

    /// Fetch every record into `dest` as `{index}_{entity_name}.jpg`.
    pub async fn download_all(&self, manifest: &Manifest, dest: &Path) -> Result<RunReport, PipelineError> {
        imgprep_storage::ensure_dir(dest).await?;
        let (work, duplicates) = dedupe(manifest.records(), ArtifactNaming::IndexEntity);
        info!("Using {} workers to download {} images", self.workers, work.len());

        let progress = self.progress(work.len(), "Downloading images");
        let expected = work.len();
        let fetcher = self.fetcher.clone();
        let dir = dest.to_path_buf();
        let outcomes = run_bounded(work, self.workers, &progress, move |record: Record| {
            let fetcher = fetcher.clone();
            let dir = dir.clone();
            async move { RecordOutcome::from(&fetcher.fetch_record(&record, &dir).await) }
        })
        .await;
        progress.finish();

        let mut report = tally(outcomes, expected);
        report.duplicate += duplicates;
        info!("Download finished: {report}");
        Ok(report)
    }

    /// Preprocess every `.jpg` in `input` into `output` under the same name.
    pub async fn preprocess_dir(&self, input: &Path, output: &Path) -> Result<PreprocessReport, PipelineError> {
        imgprep_storage::ensure_dir(output).await?;
        let files = imgprep_storage::list_with_extension(input, ARTIFACT_EXT).await?;
        info!("Using {} workers to preprocess {} images", self.cpu_workers, files.len());

        let progress = self.progress(files.len(), "Preprocessing images");
        let total = files.len();
        let preprocessor = self.preprocessor.clone();
        let out_dir = output.to_path_buf();
        let results = run_bounded(files, self.cpu_workers, &progress, move |source: PathBuf| {
            let preprocessor = preprocessor.clone();
            let out_dir = out_dir.clone();
            async move {
                let joined = tokio::task::spawn_blocking(move || {
                    preprocessor.process_file(&source, &out_dir)
                })
                .await;
                match joined {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        error!("Error preprocessing image {}: {e}", e.source_path().display());
                        false
                    }
                    Err(e) => {
                        error!("Preprocessing task failed: {e}");
                        false
                    }
                }
            }
        })
        .await;
        progress.finish();

        let processed = results.iter().filter(|ok| **ok).count();
        let report = PreprocessReport { processed, failed: total - processed };
        info!("Preprocessing finished: {report}");
        Ok(report)
    }

    /// Partition `manifest` into batches under `out_root/batch_{n}/` and
    /// produce each artifact in one step: download, transform, write
    /// `{index}.jpg`. Batches run one after another.
    pub async fn run_chunked(&self, manifest: &Manifest, out_root: &Path) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();
        let transform = self.preprocess_enabled.then(|| self.preprocessor.clone());
        info!(
            "Splitting {} records into {} batches of up to {}",
            manifest.len(),
            batch_count(manifest.len(), self.batch_size),
            self.batch_size
        );

        for batch in partition(manifest.records(), self.batch_size) {
            let dir = batch_dir(out_root, batch.number);
            imgprep_storage::ensure_dir(&dir).await?;
            let (work, duplicates) = dedupe(batch.items, ArtifactNaming::IndexOnly);
            info!(
                "Processing batch {} ({} records from offset {}) with {} workers",
                batch.number,
                batch.len(),
                batch.offset,
                self.workers
            );

            let progress = self.progress(work.len(), format!("Batch {}", batch.number));
            let expected = work.len();
            let fetcher = self.fetcher.clone();
            let transform = transform.clone();
            let out_dir = dir;
            let outcomes = run_bounded(work, self.workers, &progress, move |record: Record| {
                let fetcher = fetcher.clone();
                let transform = transform.clone();
                let dir = out_dir.clone();
                async move { produce_artifact(&fetcher, transform, &record, &dir).await }
            })
            .await;
            progress.finish();

            let mut batch_report = tally(outcomes, expected);
            batch_report.duplicate += duplicates;
            info!("Finished batch {}: {batch_report}", batch.number);
            report.merge(&batch_report);
        }
        Ok(report)
    }
}

/// Download one record into memory, transform it when a preprocessor is
/// given, and write it as `{index}.jpg` in `dir`.
async fn produce_artifact(
    fetcher: &Fetcher,
    transform: Option<Arc<Preprocessor>>,
    record: &Record,
    dir: &Path,
) -> RecordOutcome {
    let Some(url) = record.image_link.url() else {
        debug!("Skipping invalid image link {} for index {}", record.image_link, record.index);
        return RecordOutcome::InvalidLink;
    };
    let dest = dir.join(ArtifactNaming::IndexOnly.file_name(record));
    if imgprep_storage::artifact_exists(&dest).await {
        debug!("Image already exists, skipping: {}", dest.display());
        return RecordOutcome::AlreadyPresent;
    }

    let (bytes, outcome) = match fetcher.download_with_retries(url).await {
        Ok(bytes) => (bytes, RecordOutcome::Downloaded),
        Err(e) => {
            warn!("Giving up on {url} after {} attempts: {e}", fetcher.retries());
            match fetcher.placeholder_bytes() {
                Ok(bytes) => (bytes, RecordOutcome::Placeholder),
                Err(e) => {
                    error!("Failed to create placeholder image {}: {e}", dest.display());
                    return RecordOutcome::Dropped;
                }
            }
        }
    };

    let encoded = match transform {
        Some(preprocessor) => {
            let origin = dest.clone();
            let joined =
                tokio::task::spawn_blocking(move || preprocessor.process_bytes(&bytes, &origin)).await;
            match joined {
                Ok(Ok(encoded)) => encoded,
                Ok(Err(e)) => {
                    error!("Error processing image {url}: {e}");
                    return RecordOutcome::Dropped;
                }
                Err(e) => {
                    error!("Preprocessing task for {url} failed: {e}");
                    return RecordOutcome::Dropped;
                }
            }
        }
        None => bytes,
    };

    match imgprep_storage::write_atomic(&dest, &encoded).await {
        Ok(()) => {
            info!("Saved image: {}", dest.display());
            outcome
        }
        Err(e) => {
            error!("Failed to save image {}: {e}", dest.display());
            RecordOutcome::Dropped
        }
    }
}

/// Keep the first record for each artifact name. Later records that would
/// write the same file are warned about and counted, not fetched. Invalid
/// links never claim a name.
fn dedupe(records: &[Record], naming: ArtifactNaming) -> (Vec<Record>, usize) {
    let mut claimed = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());
    let mut duplicates = 0;
    for record in records {
        if record.image_link.is_valid() {
            let name = naming.file_name(record);
            if !claimed.insert(name.clone()) {
                warn!("Index {} maps to {name}, already claimed by an earlier record; skipping", record.index);
                duplicates += 1;
                continue;
            }
        }
        unique.push(record.clone());
    }
    (unique, duplicates)
}

/// Tasks that never reported back count as dropped.
fn tally(outcomes: Vec<RecordOutcome>, expected: usize) -> RunReport {
    let lost = expected.saturating_sub(outcomes.len());
    let mut report: RunReport = outcomes.into_iter().collect();
    report.dropped += lost;
    report
}
