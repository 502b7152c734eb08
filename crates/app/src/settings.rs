use anyhow::Context;
use imgprep_core::PipelineConfig;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "imgprep.toml";

/// Config file to use: the explicit path, else `./imgprep.toml`, else the
/// platform config directory. `None` means run on defaults.
pub fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    directories::ProjectDirs::from("", "", "imgprep")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .filter(|path| path.is_file())
}

pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match locate_config(explicit) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            PipelineConfig::load(&path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))
        }
        None => Ok(PipelineConfig::default()),
    }
}

/// Flags shared by every subcommand, applied on top of the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub no_progress: bool,
}

impl Overrides {
    pub fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(base) = &self.base_dir {
            cfg.paths.base_dir = base.clone();
        }
        if let Some(workers) = self.workers {
            cfg.coordinator.workers = Some(workers);
        }
        if self.no_progress {
            cfg.coordinator.progress = false;
        }
    }
}
