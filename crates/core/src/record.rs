use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// The `image_link` cell of a manifest row.
///
/// Only absolute `http`/`https` URLs are fetchable. Everything else (empty
/// cells, bare numbers, relative paths) is kept verbatim so it can be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLink {
    Valid(Url),
    Invalid(String),
}

impl ImageLink {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
                ImageLink::Valid(url)
            }
            _ => ImageLink::Invalid(raw.to_string()),
        }
    }

    pub fn url(&self) -> Option<&Url> {
        match self {
            ImageLink::Valid(url) => Some(url),
            ImageLink::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ImageLink::Valid(_))
    }
}

impl fmt::Display for ImageLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLink::Valid(url) => write!(f, "{url}"),
            ImageLink::Invalid(raw) => write!(f, "{raw:?}"),
        }
    }
}

/// One manifest row. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub index: u64,
    pub image_link: ImageLink,
    pub entity_name: String,
    pub group_id: Option<i64>,
}

impl Record {
    pub fn new(index: u64, image_link: &str, entity_name: &str, group_id: Option<i64>) -> Self {
        Record {
            index,
            image_link: ImageLink::parse(image_link),
            entity_name: entity_name.to_string(),
            group_id,
        }
    }
}

/// A manifest entry confirmed to have an artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub index: u64,
    pub artifact_path: PathBuf,
    pub entity_name: String,
    pub group_id: Option<i64>,
}

impl LabeledRecord {
    pub fn from_record(record: &Record, artifact_path: PathBuf) -> Self {
        LabeledRecord {
            index: record.index,
            artifact_path,
            entity_name: record.entity_name.clone(),
            group_id: record.group_id,
        }
    }
}
