pub mod fs;

pub use fs::{
    artifact_exists, ensure_dir, list_with_extension, write_atomic, write_atomic_blocking,
    StorageError,
};
