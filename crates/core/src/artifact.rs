use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::record::Record;

pub const ARTIFACT_EXT: &str = "jpg";

/// How artifact filenames are derived from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactNaming {
    /// `{index}_{entity_name}.jpg`, used by the flat download/label pipeline.
    #[default]
    IndexEntity,
    /// `{index}.jpg`, used by the chunked batch pipeline.
    IndexOnly,
}

impl ArtifactNaming {
    pub fn file_name(self, record: &Record) -> String {
        match self {
            ArtifactNaming::IndexEntity => format!(
                "{}_{}.{ARTIFACT_EXT}",
                record.index,
                sanitize_component(&record.entity_name)
            ),
            ArtifactNaming::IndexOnly => format!("{}.{ARTIFACT_EXT}", record.index),
        }
    }
}

impl std::fmt::Display for ArtifactNaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactNaming::IndexEntity => write!(f, "index-entity"),
            ArtifactNaming::IndexOnly => write!(f, "index-only"),
        }
    }
}

/// Path separators would let an entity name escape the artifact directory.
fn sanitize_component(s: &str) -> String {
    s.replace(['/', '\\'], "_")
}

/// Where the artifact for a given manifest position lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    naming: ArtifactNaming,
    batch_size: Option<NonZeroUsize>,
}

impl ArtifactLayout {
    pub fn flat(root: impl Into<PathBuf>, naming: ArtifactNaming) -> Self {
        Self { root: root.into(), naming, batch_size: None }
    }

    /// Nest artifacts under `batch_{n}/`, `n = position / batch_size`.
    pub fn batched(root: impl Into<PathBuf>, naming: ArtifactNaming, batch_size: NonZeroUsize) -> Self {
        Self { root: root.into(), naming, batch_size: Some(batch_size) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> ArtifactNaming {
        self.naming
    }

    pub fn batch_size(&self) -> Option<NonZeroUsize> {
        self.batch_size
    }

    /// Directory holding the artifact of the record at `position`.
    pub fn dir_for(&self, position: usize) -> PathBuf {
        match self.batch_size {
            Some(b) => batch_dir(&self.root, position / b.get()),
            None => self.root.clone(),
        }
    }

    pub fn path_for(&self, position: usize, record: &Record) -> PathBuf {
        self.dir_for(position).join(self.naming.file_name(record))
    }
}

pub fn batch_dir(root: &Path, batch_number: usize) -> PathBuf {
    root.join(format!("batch_{batch_number}"))
}
