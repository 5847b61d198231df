//! In-memory model store
//!
//! Backs tests and ephemeral servers. Writes can be made to fail on demand
//! to exercise persistence error paths.

#![allow(clippy::result_large_err)]

use crate::errors::{io_error, Result};
use crate::storage::ModelStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemoryModelStore {
    models: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a model without counting it as a write
    pub fn with_model(self, model_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.models.write().insert(model_id.into(), bytes.into());
        self
    }

    /// Make every subsequent `store` fail with an IO error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ModelStore for MemoryModelStore {
    fn load(&self, model_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.models.read().get(model_id).cloned())
    }

    fn store(&self, model_id: &str, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io_error(
                "write_model",
                std::io::Error::other("storage unavailable"),
            )
            .with_model_id(model_id));
        }
        self.models
            .write()
            .insert(model_id.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.models.read().keys().cloned().collect())
    }
}
