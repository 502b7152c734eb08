pub mod label;
pub mod reader;
pub mod writer;

pub use label::Labeler;
pub use reader::{import_manifest, load_manifest, Manifest, ManifestError, ManifestReader};
pub use writer::{export_labeled, write_labeled, PathColumn};
