use imgprep_core::LabeledRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::reader::{ManifestError, COL_ENTITY_NAME, COL_GROUP_ID, COL_INDEX};

/// Header used for the artifact path column of the labeled manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathColumn {
    /// Raw downloads.
    ImagePath,
    /// Output of the preprocessor.
    #[default]
    PreprocessedImagePath,
}

impl PathColumn {
    pub fn header(self) -> &'static str {
        match self {
            PathColumn::ImagePath => "image_path",
            PathColumn::PreprocessedImagePath => "preprocessed_image_path",
        }
    }
}

/// Write `records` as CSV. The header is always written, even for an empty run.
pub fn export_labeled<W, I>(out: W, records: I, column: PathColumn) -> Result<usize, ManifestError>
where
    W: Write,
    I: IntoIterator<Item = LabeledRecord>,
{
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([COL_INDEX, column.header(), COL_ENTITY_NAME, COL_GROUP_ID])?;

    let mut written = 0;
    for r in records {
        let index = r.index.to_string();
        let path = r.artifact_path.to_string_lossy();
        let group = r.group_id.map(|g| g.to_string()).unwrap_or_default();
        writer.write_record([index.as_str(), &*path, r.entity_name.as_str(), group.as_str()])?;
        written += 1;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(written)
}

/// Overwrite `path` with the labeled manifest. Returns the number of rows.
pub fn write_labeled<I>(path: &Path, records: I, column: PathColumn) -> Result<usize, ManifestError>
where
    I: IntoIterator<Item = LabeledRecord>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ManifestError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = std::fs::File::create(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let written = export_labeled(std::io::BufWriter::new(file), records, column)?;
    tracing::info!("Wrote {written} labeled records to {}", path.display());
    Ok(written)
}
