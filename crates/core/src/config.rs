use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Downloads are capped here to stay clear of OS socket and handle limits.
pub const DEFAULT_MAX_WORKERS: usize = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub fetch: FetchConfig,
    pub preprocess: PreprocessConfig,
    pub coordinator: CoordinatorConfig,
}

impl PipelineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.coordinator;
        if c.batch_size == 0 {
            return Err(ConfigError::Invalid("coordinator.batch_size must be at least 1".into()));
        }
        if c.max_workers == 0 {
            return Err(ConfigError::Invalid("coordinator.max_workers must be at least 1".into()));
        }
        if c.workers == Some(0) {
            return Err(ConfigError::Invalid("coordinator.workers must be at least 1".into()));
        }

        let p = &self.preprocess;
        if p.canvas_width == 0 || p.canvas_height == 0 {
            return Err(ConfigError::Invalid("preprocess canvas must be non-empty".into()));
        }
        if p.base_width == 0 {
            return Err(ConfigError::Invalid("preprocess.base_width must be at least 1".into()));
        }
        if !p.blur_sigma.is_finite() || p.blur_sigma <= 0.0 {
            return Err(ConfigError::Invalid("preprocess.blur_sigma must be positive".into()));
        }

        let f = &self.fetch;
        if f.delay_secs < 0.0 || Duration::try_from_secs_f64(f.delay_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "fetch.delay_secs must be a finite number of seconds, got {}",
                f.delay_secs
            )));
        }
        if f.placeholder_size == 0 {
            return Err(ConfigError::Invalid("fetch.placeholder_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Which half of the dataset a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub base_dir: PathBuf,
    pub train_csv: PathBuf,
    pub test_csv: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("processed_data"),
            train_csv: PathBuf::from("train.csv"),
            test_csv: PathBuf::from("test.csv"),
        }
    }
}

impl PathsConfig {
    pub fn manifest_csv(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train_csv,
            Split::Test => &self.test_csv,
        }
    }

    /// `{base}/{split}_images`
    pub fn raw_dir(&self, split: Split) -> PathBuf {
        self.base_dir.join(format!("{split}_images"))
    }

    /// `{base}/{split}_preprocessed`
    pub fn processed_dir(&self, split: Split) -> PathBuf {
        self.base_dir.join(format!("{split}_preprocessed"))
    }

    /// `{base}/{split}_labeled.csv`
    pub fn labeled_csv(&self, split: Split) -> PathBuf {
        self.base_dir.join(format!("{split}_labeled.csv"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub retries: u32,
    pub delay_secs: f64,
    pub timeout_secs: u64,
    pub placeholder_size: u32,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_secs: 3.0,
            timeout_secs: 30,
            placeholder_size: 100,
            user_agent: format!("imgprep/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    /// Out-of-range values collapse to no delay; `validate` rejects them.
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs).unwrap_or(Duration::ZERO)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Grayscale, median denoise, fit and pad onto a fixed canvas.
    Ocr,
    /// Grayscale, fixed-width resize, Gaussian blur, Otsu binarization.
    #[default]
    Vision,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ocr" => Ok(StrategyKind::Ocr),
            "vision" => Ok(StrategyKind::Vision),
            other => Err(format!("Unknown preprocess strategy: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub strategy: StrategyKind,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub median_radius: u32,
    pub base_width: u32,
    pub blur_sigma: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: StrategyKind::Vision,
            canvas_width: 256,
            canvas_height: 256,
            median_radius: 1,
            base_width: 500,
            // Matches a 5x5 Gaussian kernel with sigma derived from its size.
            blur_sigma: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// The whole manifest as one unit, bounded only by the worker count.
    #[default]
    Flat,
    /// Fixed-size batches, each in its own `batch_{n}` directory.
    Chunked,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(RunMode::Flat),
            "chunked" => Ok(RunMode::Chunked),
            other => Err(format!("Unknown run mode: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub mode: RunMode,
    pub batch_size: usize,
    /// Fixed worker count; `None` derives it from available parallelism.
    pub workers: Option<usize>,
    pub max_workers: usize,
    pub parallel: bool,
    pub progress: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Flat,
            batch_size: 10_000,
            workers: None,
            max_workers: DEFAULT_MAX_WORKERS,
            parallel: true,
            progress: true,
        }
    }
}

impl CoordinatorConfig {
    /// Worker count for a machine with `available` hardware threads.
    /// Never exceeds `max_workers`, never below one.
    pub fn effective_workers(&self, available: usize) -> usize {
        if !self.parallel {
            return 1;
        }
        self.workers
            .unwrap_or(available)
            .min(self.max_workers)
            .max(1)
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let c = PipelineConfig::default();
        assert_eq!(c.fetch.retries, 3);
        assert_eq!(c.fetch.delay(), Duration::from_secs(3));
        assert_eq!(c.fetch.placeholder_size, 100);
        assert_eq!((c.preprocess.canvas_width, c.preprocess.canvas_height), (256, 256));
        assert_eq!(c.preprocess.base_width, 500);
        assert_eq!(c.coordinator.batch_size, 10_000);
        assert_eq!(c.coordinator.max_workers, 60);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = PipelineConfig::from_toml(
            r#"
            [paths]
            base_dir = "/tmp/out"

            [fetch]
            retries = 5

            [preprocess]
            strategy = "ocr"

            [coordinator]
            mode = "chunked"
            batch_size = 250
            "#,
        )
        .unwrap();
        assert_eq!(c.paths.base_dir, PathBuf::from("/tmp/out"));
        assert_eq!(c.paths.train_csv, PathBuf::from("train.csv"));
        assert_eq!(c.fetch.retries, 5);
        assert_eq!(c.fetch.timeout_secs, 30);
        assert_eq!(c.preprocess.strategy, StrategyKind::Ocr);
        assert_eq!(c.coordinator.mode, RunMode::Chunked);
        assert_eq!(c.coordinator.batch_size, 250);
    }

    #[test]
    fn unrepresentable_delays_are_rejected() {
        for delay in ["inf", "-inf", "nan", "1e30", "-1.0"] {
            let err = PipelineConfig::from_toml(&format!("[fetch]\ndelay_secs = {delay}\n"))
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "delay_secs = {delay}");
        }
        let ok = PipelineConfig::from_toml("[fetch]\ndelay_secs = 0.5\n").unwrap();
        assert_eq!(ok.fetch.delay(), Duration::from_millis(500));
    }

    #[test]
    fn delay_never_panics_on_unvalidated_values() {
        let cfg = FetchConfig { delay_secs: f64::INFINITY, ..FetchConfig::default() };
        assert_eq!(cfg.delay(), Duration::ZERO);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = PipelineConfig::from_toml("[coordinator]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_strategy_is_a_parse_error() {
        let err = PipelineConfig::from_toml("[preprocess]\nstrategy = \"sepia\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn workers_are_capped() {
        let c = CoordinatorConfig::default();
        assert_eq!(c.effective_workers(8), 8);
        assert_eq!(c.effective_workers(128), 60);

        let fixed = CoordinatorConfig { workers: Some(200), ..CoordinatorConfig::default() };
        assert_eq!(fixed.effective_workers(4), 60);

        let serial = CoordinatorConfig { parallel: false, ..CoordinatorConfig::default() };
        assert_eq!(serial.effective_workers(64), 1);

        assert_eq!(c.effective_workers(0), 1);
    }

    #[test]
    fn split_paths() {
        let p = PathsConfig { base_dir: PathBuf::from("/data"), ..PathsConfig::default() };
        assert_eq!(p.raw_dir(Split::Train), PathBuf::from("/data/train_images"));
        assert_eq!(p.processed_dir(Split::Test), PathBuf::from("/data/test_preprocessed"));
        assert_eq!(p.labeled_csv(Split::Train), PathBuf::from("/data/train_labeled.csv"));
        assert_eq!(p.manifest_csv(Split::Test), Path::new("test.csv"));
    }

    #[test]
    fn mode_and_strategy_from_str() {
        use std::str::FromStr;
        assert_eq!(RunMode::from_str("Chunked").unwrap(), RunMode::Chunked);
        assert_eq!(StrategyKind::from_str("ocr").unwrap(), StrategyKind::Ocr);
        assert!(StrategyKind::from_str("blur").is_err());
    }
}
