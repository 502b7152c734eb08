//! CLI commands implementation.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use imgprep_core::{
    ArtifactLayout, ArtifactNaming, PipelineConfig, RunMode, Split, StrategyKind,
};
use imgprep_manifest::{load_manifest, write_labeled, Labeler, Manifest, PathColumn};
use imgprep_pipeline::{BatchCoordinator, DatasetRunner};

use crate::settings::{load_config, Overrides};

#[derive(Parser, Debug)]
#[command(name = "imgprep")]
#[command(about = "Download, preprocess and label product images from CSV manifests")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ./imgprep.toml, then the user config dir)
    #[arg(long, global = true, env = "IMGPREP_CONFIG")]
    config: Option<PathBuf>,

    /// Root for all generated directories and labeled manifests
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Concurrent workers (capped by `max_workers`)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Hide progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline for the configured train and test manifests
    Run {
        #[arg(long, value_enum, default_value = "all")]
        split: SplitArg,
        /// Override the configured mode (flat or chunked)
        #[arg(long)]
        mode: Option<RunMode>,
        /// Label raw downloads instead of preprocessed images
        #[arg(long)]
        no_preprocess: bool,
    },

    /// Download every image in a manifest as {index}_{entity_name}.jpg
    Download {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Preprocess every .jpg in a directory
    Preprocess {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Override the configured strategy (ocr or vision)
        #[arg(long)]
        strategy: Option<StrategyKind>,
    },

    /// Download and preprocess a manifest in batch_{n}/ directories
    Batch {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        batch_size: Option<NonZeroUsize>,
    },

    /// Write a labeled manifest for the images already on disk
    Label {
        #[arg(long)]
        manifest: PathBuf,
        /// Directory holding the artifacts
        #[arg(long)]
        images: PathBuf,
        /// Labeled CSV to write
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "preprocessed-image-path")]
        column: ColumnArg,
        #[arg(long, value_enum, default_value = "index-entity")]
        naming: NamingArg,
        /// Artifacts live in batch_{n}/ directories of this size
        #[arg(long)]
        batch_size: Option<NonZeroUsize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SplitArg {
    Train,
    Test,
    All,
}

impl SplitArg {
    fn splits(self) -> &'static [Split] {
        match self {
            SplitArg::Train => &[Split::Train],
            SplitArg::Test => &[Split::Test],
            SplitArg::All => &Split::ALL,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnArg {
    ImagePath,
    PreprocessedImagePath,
}

impl From<ColumnArg> for PathColumn {
    fn from(arg: ColumnArg) -> Self {
        match arg {
            ColumnArg::ImagePath => PathColumn::ImagePath,
            ColumnArg::PreprocessedImagePath => PathColumn::PreprocessedImagePath,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum NamingArg {
    IndexEntity,
    IndexOnly,
}

impl From<NamingArg> for ArtifactNaming {
    fn from(arg: NamingArg) -> Self {
        match arg {
            NamingArg::IndexEntity => ArtifactNaming::IndexEntity,
            NamingArg::IndexOnly => ArtifactNaming::IndexOnly,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.as_deref())?;
    Overrides {
        base_dir: cli.base_dir,
        workers: cli.workers,
        no_progress: cli.no_progress,
    }
    .apply(&mut cfg);

    match cli.command {
        Commands::Run {
            split,
            mode,
            no_preprocess,
        } => cmd_run(cfg, split, mode, no_preprocess).await,
        Commands::Download { manifest, out } => cmd_download(&cfg, &manifest, &out).await,
        Commands::Preprocess {
            input,
            out,
            strategy,
        } => cmd_preprocess(cfg, &input, &out, strategy).await,
        Commands::Batch {
            manifest,
            out,
            batch_size,
        } => cmd_batch(cfg, &manifest, &out, batch_size).await,
        Commands::Label {
            manifest,
            images,
            out,
            column,
            naming,
            batch_size,
        } => cmd_label(&manifest, &images, &out, column.into(), naming.into(), batch_size),
    }
}

fn read_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let manifest =
        load_manifest(path).with_context(|| format!("Failed to read manifest {}", path.display()))?;
    tracing::info!("Loaded {} records from {}", manifest.len(), path.display());
    Ok(manifest)
}

async fn cmd_run(
    mut cfg: PipelineConfig,
    split: SplitArg,
    mode: Option<RunMode>,
    no_preprocess: bool,
) -> anyhow::Result<()> {
    if let Some(mode) = mode {
        cfg.coordinator.mode = mode;
    }
    if no_preprocess {
        cfg.preprocess.enabled = false;
    }

    let runner = DatasetRunner::new(cfg)?;
    for report in runner.run_all(split.splits()).await? {
        println!("{report}");
    }
    Ok(())
}

async fn cmd_download(cfg: &PipelineConfig, manifest: &Path, out: &Path) -> anyhow::Result<()> {
    let manifest = read_manifest(manifest)?;
    let coordinator = BatchCoordinator::from_config(cfg)?;
    let report = coordinator.download_all(&manifest, out).await?;
    println!("{report}");
    Ok(())
}

async fn cmd_preprocess(
    mut cfg: PipelineConfig,
    input: &Path,
    out: &Path,
    strategy: Option<StrategyKind>,
) -> anyhow::Result<()> {
    if let Some(strategy) = strategy {
        cfg.preprocess.strategy = strategy;
    }
    if !input.is_dir() {
        anyhow::bail!("Input directory {} does not exist", input.display());
    }
    let coordinator = BatchCoordinator::from_config(&cfg)?;
    let report = coordinator.preprocess_dir(input, out).await?;
    println!("{report}");
    Ok(())
}

async fn cmd_batch(
    mut cfg: PipelineConfig,
    manifest: &Path,
    out: &Path,
    batch_size: Option<NonZeroUsize>,
) -> anyhow::Result<()> {
    if let Some(size) = batch_size {
        cfg.coordinator.batch_size = size.get();
    }
    cfg.coordinator.mode = RunMode::Chunked;

    let manifest = read_manifest(manifest)?;
    let coordinator = BatchCoordinator::from_config(&cfg)?;
    let report = coordinator.run_chunked(&manifest, out).await?;
    println!("{report}");
    Ok(())
}

fn cmd_label(
    manifest: &Path,
    images: &Path,
    out: &Path,
    column: PathColumn,
    naming: ArtifactNaming,
    batch_size: Option<NonZeroUsize>,
) -> anyhow::Result<()> {
    let manifest = read_manifest(manifest)?;
    for (name, indices) in manifest.collisions(naming) {
        tracing::warn!("Records {indices:?} all map to {name}; their labels share one image");
    }

    let layout = match batch_size {
        Some(size) => ArtifactLayout::batched(images, naming, size),
        None => ArtifactLayout::flat(images, naming),
    };
    let labeler = Labeler::new(layout);
    let written = write_labeled(out, labeler.label(&manifest), column)?;
    println!("{written} of {} records labeled -> {}", manifest.len(), out.display());
    Ok(())
}
