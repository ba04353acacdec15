//! Flat-file storage backend
//!
//! Each key maps to a file below a root directory.

use crate::config::StorageMode;
use crate::storage::traits::{CssStore, StorageError, StorageResult, StoredCss};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path, rejecting keys that would leave the root
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if key.is_empty() || escapes {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

impl CssStore for FileStore {
    fn mode(&self) -> StorageMode {
        StorageMode::File
    }

    fn put(&self, key: &str, css: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Readers inline this file on every page view; never expose a partial write.
        let tmp = temp_path_for(&path);
        std::fs::write(&tmp, css).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;

        tracing::debug!("Wrote {} bytes to {}", css.len(), path.display());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<StoredCss>> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };

        let css = match std::fs::read_to_string(&path) {
            Ok(css) => css,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };

        let modified = std::fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(io_err)?;

        Ok(Some(StoredCss {
            css,
            updated_at: DateTime::<Utc>::from(modified),
        }))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn describe(&self, key: &str) -> String {
        match self.path_for(key) {
            Ok(path) => path.display().to_string(),
            Err(_) => key.to_string(),
        }
    }
}

/// Sibling of `path` unique to one write, keeping the full file name
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}
