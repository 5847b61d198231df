//! Server configuration
//!
//! Loaded from TOML; every field has a default so an empty file is a
//! valid configuration.

#![allow(clippy::result_large_err)]

use modelhub_core::{ExError, ExErrorKind};
use modelhub_store::{FsModelStore, MemoryModelStore, ModelStore, Result, SqliteModelStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// When the controller writes a model after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutosavePolicy {
    /// Only explicit saves persist
    #[default]
    Never,
    /// Every committed execute/undo/redo is persisted
    AfterCommand,
}

/// What happens when a subscriber's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Close the lagging session
    #[default]
    Disconnect,
    /// Discard the notification for that session only
    Drop,
}

/// How error diagnostics after a command are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationPolicy {
    /// Diagnostics are reported; the command stays committed
    #[default]
    Advisory,
    /// An error diagnostic revokes the command
    RejectOnError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// One file per model under `workspace_root`
    #[default]
    Fs,
    /// `models.db` under `workspace_root`
    Sqlite,
    /// Nothing survives the process
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub workspace_root: PathBuf,
    pub storage_backend: StorageBackend,
    /// Codec for stored models whose id has no recognised extension
    pub storage_format: String,
    /// Codec for requests and responses that name no format
    pub default_format: String,
    pub autosave: AutosavePolicy,
    /// Keep the model locked until an autosave completes
    pub persist_inside_lock: bool,
    pub lock_timeout_ms: u64,
    pub subscriber_queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub validation: ValidationPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            storage_backend: StorageBackend::Fs,
            storage_format: "json".to_string(),
            default_format: "json".to_string(),
            autosave: AutosavePolicy::Never,
            persist_inside_lock: false,
            lock_timeout_ms: 5000,
            subscriber_queue_capacity: 32,
            overflow: OverflowPolicy::Disconnect,
            validation: ValidationPolicy::Advisory,
        }
    }
}

fn config_error(message: String) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("load_config")
        .with_message(message)
}

impl ServerConfig {
    /// Parse and check a TOML document
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for malformed TOML, unknown keys, or values
    /// rejected by [`ServerConfig::check`].
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| config_error(format!("failed to parse config: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Read a TOML file
    ///
    /// A relative `workspace_root` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as
    /// [`ServerConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            modelhub_store::errors::io_error("read_config", e)
                .with_message(format!("failed to read {}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if config.workspace_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.workspace_root = dir.join(&config.workspace_root);
            }
        }
        Ok(config)
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the offending key.
    pub fn check(&self) -> Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(config_error("lock_timeout_ms must be positive".to_string()));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(config_error(
                "subscriber_queue_capacity must be positive".to_string(),
            ));
        }
        for (key, value) in [
            ("storage_format", &self.storage_format),
            ("default_format", &self.default_format),
        ] {
            if value.trim().is_empty() {
                return Err(config_error(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Open the configured backing store
    ///
    /// # Errors
    ///
    /// Returns storage errors from opening the SQLite database.
    pub fn open_store(&self) -> Result<Arc<dyn ModelStore>> {
        Ok(match self.storage_backend {
            StorageBackend::Fs => Arc::new(FsModelStore::new(&self.workspace_root)),
            StorageBackend::Sqlite => {
                std::fs::create_dir_all(&self.workspace_root)
                    .map_err(|e| modelhub_store::errors::io_error("create_workspace", e))?;
                Arc::new(SqliteModelStore::open(
                    self.workspace_root.join("models.db"),
                )?)
            }
            StorageBackend::Memory => Arc::new(MemoryModelStore::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(ServerConfig::from_toml_str("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_policies_parse_kebab_case() {
        let config = ServerConfig::from_toml_str(
            r#"
            autosave = "after-command"
            overflow = "drop"
            validation = "reject-on-error"
            storage_backend = "sqlite"
            lock_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.autosave, AutosavePolicy::AfterCommand);
        assert_eq!(config.overflow, OverflowPolicy::Drop);
        assert_eq!(config.validation, ValidationPolicy::RejectOnError);
        assert_eq!(config.storage_backend, StorageBackend::Sqlite);
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ServerConfig::from_toml_str("autosaev = \"never\"").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ServerConfig::from_toml_str("subscriber_queue_capacity = 0").unwrap_err();
        assert!(err.message().contains("subscriber_queue_capacity"));
    }

    #[test]
    fn test_relative_root_resolved_against_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("modelhub.toml");
        std::fs::write(&path, "workspace_root = \"models\"").unwrap();

        let config = ServerConfig::load(&path).unwrap();

        assert_eq!(config.workspace_root, dir.path().join("models"));
    }
}
