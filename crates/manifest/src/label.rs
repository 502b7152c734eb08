use imgprep_core::{ArtifactLayout, LabeledRecord, Record};

use crate::reader::Manifest;

/// Joins a manifest against the artifacts present on disk.
///
/// Read-only: the scan happens lazily as the returned iterator is consumed,
/// so calling [`Labeler::label`] again re-checks the filesystem. Artifact
/// content is never inspected; placeholders are labeled like real images.
#[derive(Debug, Clone)]
pub struct Labeler {
    layout: ArtifactLayout,
}

impl Labeler {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn label<'a>(&'a self, manifest: &'a Manifest) -> impl Iterator<Item = LabeledRecord> + 'a {
        manifest
            .iter()
            .enumerate()
            .filter_map(move |(position, record)| self.label_one(position, record))
    }

    fn label_one(&self, position: usize, record: &Record) -> Option<LabeledRecord> {
        let path = self.layout.path_for(position, record);
        path.is_file().then(|| LabeledRecord::from_record(record, path))
    }
}
