//! Model repository
//!
//! Owns the set of live models keyed by id. Each live model sits behind a
//! `ModelHandle`, the unit of serialization for every operation on it.

pub mod handle;
pub mod hydration;
pub mod model_repo;

pub use handle::{ModelGuard, ModelHandle, ModelSlot, SaveWriter};
pub use model_repo::{canonical_id, ModelRepository, RepositoryOptions, Snapshot, SubscriptionIndex};
