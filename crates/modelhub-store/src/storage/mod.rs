//! Backing storage for model documents
//!
//! A `ModelStore` maps a model id to the encoded bytes of that model. The
//! repository decides the encoding; stores only move bytes. All methods
//! block and are called from `spawn_blocking`.

#![allow(clippy::result_large_err)]

pub mod atomic;
pub mod fs_store;
pub mod memory_store;
pub mod sqlite_store;

use crate::errors::Result;

pub use fs_store::FsModelStore;
pub use memory_store::MemoryModelStore;
pub use sqlite_store::SqliteModelStore;

/// Byte-level storage keyed by model id
pub trait ModelStore: Send + Sync + 'static {
    /// Read a model's bytes; `None` when no resource exists for the id
    fn load(&self, model_id: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a model's bytes; readers never observe a partial write
    fn store(&self, model_id: &str, bytes: &[u8]) -> Result<()>;

    /// Ids of every stored model, sorted
    fn list(&self) -> Result<Vec<String>>;
}
