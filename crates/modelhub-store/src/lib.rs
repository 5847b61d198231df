//! ModelHub Store - backing storage and the live model repository
//!
//! Provides:
//! - `ModelStore` trait with filesystem, SQLite and in-memory backends
//! - SQLite schema with an embedded migrations framework
//! - `ModelRepository`: one live instance per model id, per-model
//!   serialization handles, dirty tracking and persistence

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;
pub mod storage;

// Re-export key types
pub use errors::Result;
pub use repo::{
    canonical_id, ModelGuard, ModelHandle, ModelRepository, ModelSlot, RepositoryOptions,
    SaveWriter, Snapshot, SubscriptionIndex,
};
pub use storage::{FsModelStore, MemoryModelStore, ModelStore, SqliteModelStore};
