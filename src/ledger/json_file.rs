//! Merge-on-write JSON files
//!
//! Callers take the per-file lock, read the current content, apply their
//! change and write the result back through a temp file + rename, so a
//! reader never observes a half-written file.

use crate::core::error::{DepupError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio::fs;

/// One async mutex per file path
#[derive(Debug, Default)]
pub(crate) struct FileLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileLocks {
    pub(crate) fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Read a JSON file, treating an absent or empty file as `T::default()`
pub(crate) async fn read_json<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content).map_err(|e| DepupError::StoreCorrupted {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(DepupError::store(path, e)),
    }
}

/// Serialise `value` and replace `path` with it atomically
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| DepupError::store(path, e))?;
    let target = path.to_path_buf();

    tokio::task::spawn_blocking(move || persist_atomic(&target, (json + "\n").as_bytes()))
        .await
        .map_err(|e| DepupError::store(path, e))?
}

/// Atomic write: write to a temp file in the same directory, then rename.
/// The temp file is removed on every error path when it is dropped.
fn persist_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| DepupError::store(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| DepupError::store(parent, e))?;
    tmp.write_all(data)
        .map_err(|e| DepupError::store(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| DepupError::store(path, e.error))?;
    Ok(())
}
