use imgprep_core::{ArtifactNaming, Record};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub const COL_INDEX: &str = "index";
pub const COL_IMAGE_LINK: &str = "image_link";
pub const COL_ENTITY_NAME: &str = "entity_name";
pub const COL_GROUP_ID: &str = "group_id";

const REQUIRED_COLUMNS: [&str; 2] = [COL_IMAGE_LINK, COL_ENTITY_NAME];

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// Fatal: raised before any record is fetched.
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid index {value:?} on row {row}")]
    InvalidIndex { row: usize, value: String },
    #[error("Invalid group_id {value:?} on row {row}")]
    InvalidGroupId { row: usize, value: String },
}

/// The ordered record set a run works from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: Vec<Record>,
}

impl Manifest {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Artifact names shared by more than one record, with the colliding indices.
    pub fn collisions(&self, naming: ArtifactNaming) -> Vec<(String, Vec<u64>)> {
        let mut by_name: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for r in &self.records {
            by_name.entry(naming.file_name(r)).or_default().push(r.index);
        }
        by_name.into_iter().filter(|(_, ids)| ids.len() > 1).collect()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

struct Columns {
    index: Option<usize>,
    image_link: usize,
    entity_name: usize,
    group_id: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, ManifestError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        for name in REQUIRED_COLUMNS {
            if find(name).is_none() {
                return Err(ManifestError::MissingColumn(name.to_string()));
            }
        }
        Ok(Columns {
            index: find(COL_INDEX),
            image_link: find(COL_IMAGE_LINK).unwrap_or_default(),
            entity_name: find(COL_ENTITY_NAME).unwrap_or_default(),
            group_id: find(COL_GROUP_ID),
        })
    }
}

pub struct ManifestReader;

impl ManifestReader {
    pub fn parse<R: Read>(reader: &mut csv::Reader<R>) -> Result<Manifest, ManifestError> {
        let headers = reader.headers()?.clone();
        let cols = Columns::resolve(&headers)?;
        let mut records = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let record = result?;

            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            let index = match cols
                .index
                .and_then(|c| record.get(c))
                .filter(|s| !s.trim().is_empty())
            {
                Some(raw) => parse_index(raw).ok_or_else(|| ManifestError::InvalidIndex {
                    row,
                    value: raw.to_string(),
                })?,
                None => row as u64,
            };

            let group_id = cols
                .group_id
                .and_then(|c| record.get(c))
                .filter(|s| !s.trim().is_empty())
                .map(|raw| {
                    parse_group_id(raw).ok_or_else(|| ManifestError::InvalidGroupId {
                        row,
                        value: raw.to_string(),
                    })
                })
                .transpose()?;

            records.push(Record::new(
                index,
                record.get(cols.image_link).unwrap_or_default(),
                record.get(cols.entity_name).unwrap_or_default().trim(),
                group_id,
            ));
        }

        Ok(Manifest::new(records))
    }
}

fn parse_index(s: &str) -> Option<u64> {
    s.trim().parse::<u64>().ok()
}

/// Tabular exports write integer columns containing blanks as floats (`7.0`).
fn parse_group_id(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

pub fn import_manifest<R: Read>(data: R) -> Result<Manifest, ManifestError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(data);
    ManifestReader::parse(&mut reader)
}

pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let file = std::fs::File::open(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import_manifest(std::io::BufReader::new(file))
}
