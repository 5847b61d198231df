//! Atomic write primitives
//!
//! Uses temp→rename pattern to ensure no partial writes

#![allow(clippy::result_large_err)]

use crate::errors::{io_error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of in-flight temp files; listings skip them
pub const TEMP_SUFFIX: &str = ".tmp";

fn temp_path_for(target_path: &Path) -> PathBuf {
    let mut name = target_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    target_path.with_file_name(name)
}

/// Atomically write bytes to a file
///
/// The target either keeps its old content or holds the new content in
/// full; a failed write removes its temp file.
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create_model_dir", e))?;
    }

    // Temp file keeps the full name so `a.json` and `a.yaml` never collide
    let temp_path = temp_path_for(target_path);

    if let Err(e) = fs::write(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error("write_model_temp", e));
    }

    if let Err(e) = fs::rename(&temp_path, target_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error("rename_model_temp", e));
    }

    Ok(())
}
