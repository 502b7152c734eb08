//! Flat-file artifact store.
//!
//! Artifacts are only ever written whole: bytes go to a hidden sibling file
//! which is then renamed over the final name, so a killed run leaves either
//! the previous state or the complete file, never a truncated artifact.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Path has no file name: {}", .0.display())]
    NoFileName(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io { path: path.to_path_buf(), source }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_sibling(path: &Path) -> Result<PathBuf, StorageError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::NoFileName(path.to_path_buf()))?;
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(path.with_file_name(format!(".{name}.{}.{n}.part", std::process::id())))
}

/// Whether an artifact exists. Existence is the only state the pipeline tracks;
/// an unreadable directory counts as absent.
pub async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub async fn ensure_dir(dir: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))
}

/// Replace `path` with `data` in one rename.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }
    let tmp = temp_sibling(path)?;
    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(&tmp)(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(path)(e));
    }
    Ok(())
}

/// Blocking counterpart of [`write_atomic`] for CPU-bound workers.
pub fn write_atomic_blocking(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp = temp_sibling(path)?;
    if let Err(e) = std::fs::write(&tmp, data) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&tmp)(e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path)(e));
    }
    Ok(())
}

/// Regular files in `dir` whose extension matches `ext` (case-insensitive),
/// sorted by path. Hidden in-flight `.part` files never match.
pub async fn list_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, StorageError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err(dir))?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if matches && is_file {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
