//! Filesystem model store
//!
//! A model id is a relative path under the workspace root, e.g.
//! `machines/coffee.json`. Writes go through `atomic_write`.

#![allow(clippy::result_large_err)]

use crate::errors::{invalid_model_id, io_error, Result};
use crate::storage::atomic::{atomic_write, TEMP_SUFFIX};
use crate::storage::ModelStore;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Stores each model as one file below a root directory
#[derive(Debug, Clone)]
pub struct FsModelStore {
    root: PathBuf,
}

impl FsModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model id to a file path inside the root
    ///
    /// Rejects empty, absolute and parent-escaping ids.
    pub fn path_for(&self, model_id: &str) -> Result<PathBuf> {
        if model_id.trim().is_empty() {
            return Err(invalid_model_id(model_id, "empty"));
        }
        let relative = Path::new(model_id);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(invalid_model_id(
                        model_id,
                        "must be a relative path inside the workspace",
                    ))
                }
            }
        }
        if model_id.ends_with(TEMP_SUFFIX) {
            return Err(invalid_model_id(model_id, "reserved suffix"));
        }
        Ok(self.root.join(relative))
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("list_models", e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_error("list_models", e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| io_error("list_models", e))?;
            if file_type.is_dir() {
                self.collect(&path, out)?;
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !id.ends_with(TEMP_SUFFIX) {
                out.push(id);
            }
        }
        Ok(())
    }
}

impl ModelStore for FsModelStore {
    fn load(&self, model_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(model_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read_model", e).with_model_id(model_id)),
        }
    }

    fn store(&self, model_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(model_id)?;
        atomic_write(&path, bytes).map_err(|e| e.with_model_id(model_id))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        self.collect(&self.root, &mut ids)?;
        ids.sort();
        Ok(ids)
    }
}
