//! Per-model handle
//!
//! A handle pairs the model, its package and its command stack behind one
//! fair async mutex. Waiters acquire it in arrival order, which gives
//! per-model request ordering. Dirty state is tracked as a pair of version
//! counters so a save only clears dirty if no edit landed after the
//! snapshot it wrote. A handle evicted by `close` is flagged under the
//! lock, so a waiter that acquires it afterwards can tell it is stale.

#![allow(clippy::result_large_err)]

use crate::errors::{lock_timeout, Result};
use modelhub_core::{CommandStack, Model, Package};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// State guarded by the per-model lock
#[derive(Debug)]
pub struct ModelSlot {
    pub model: Model,
    pub package: Arc<Package>,
    pub stack: CommandStack,
}

pub type ModelGuard = OwnedMutexGuard<ModelSlot>;

/// Exclusive right to write a model's storage resource
pub type SaveWriter<'a> = MutexGuard<'a, ()>;

#[derive(Debug)]
pub struct ModelHandle {
    model_id: String,
    slot: Arc<Mutex<ModelSlot>>,
    save_lock: Mutex<()>,
    evicted: AtomicBool,
    edit_version: AtomicU64,
    saved_version: AtomicU64,
    lock_timeout: Duration,
}

impl ModelHandle {
    /// Handle for a model whose in-memory state matches storage
    pub(crate) fn clean(model: Model, package: Arc<Package>, lock_timeout: Duration) -> Self {
        let model_id = model.id.clone();
        Self {
            slot: Arc::new(Mutex::new(ModelSlot {
                stack: CommandStack::new(model_id.clone()),
                model,
                package,
            })),
            model_id,
            save_lock: Mutex::new(()),
            evicted: AtomicBool::new(false),
            edit_version: AtomicU64::new(0),
            saved_version: AtomicU64::new(0),
            lock_timeout,
        }
    }

    /// Handle for a model that exists only in memory
    pub(crate) fn unsaved(model: Model, package: Arc<Package>, lock_timeout: Duration) -> Self {
        let handle = Self::clean(model, package, lock_timeout);
        handle.mark_dirty();
        handle
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Acquire the model's serialization point
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the lock is not granted within the handle's
    /// timeout; the request is then dropped from the queue.
    pub async fn lock(&self) -> Result<ModelGuard> {
        match tokio::time::timeout(self.lock_timeout, self.slot.clone().lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(lock_timeout(
                &self.model_id,
                self.lock_timeout.as_millis() as u64,
            )),
        }
    }

    /// True once `close` dropped this handle from the repository
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    /// Flag the handle stale; the caller holds its lock
    pub(crate) fn mark_evicted(&self, _held: &ModelGuard) {
        self.evicted.store(true, Ordering::SeqCst);
    }

    /// Serializes writers of this model's storage resource
    ///
    /// `close` claims it under the model lock, so a writer claimed before
    /// the model lock is released finishes before the model can close.
    pub async fn writer(&self) -> SaveWriter<'_> {
        self.save_lock.lock().await
    }

    /// Record an edit; returns the new edit version
    pub fn mark_dirty(&self) -> u64 {
        self.edit_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn edit_version(&self) -> u64 {
        self.edit_version.load(Ordering::SeqCst)
    }

    pub fn saved_version(&self) -> u64 {
        self.saved_version.load(Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.edit_version() > self.saved_version()
    }

    /// Record that the state at `version` reached storage
    pub(crate) fn mark_saved(&self, version: u64) {
        self.saved_version.fetch_max(version, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelhub_core::metamodel::coffee;
    use modelhub_core::ExErrorKind;

    fn handle(timeout_ms: u64) -> ModelHandle {
        ModelHandle::clean(
            coffee::sample_model("coffee.json"),
            Arc::new(coffee::package()),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_dirty_tracking_by_version() {
        let handle = handle(100);
        assert!(!handle.is_dirty());

        let v1 = handle.mark_dirty();
        let v2 = handle.mark_dirty();
        assert!(handle.is_dirty());

        // A save of an older snapshot leaves newer edits dirty
        handle.mark_saved(v1);
        assert!(handle.is_dirty());

        handle.mark_saved(v2);
        assert!(!handle.is_dirty());

        // Saved version never moves backwards
        handle.mark_saved(v1);
        assert_eq!(handle.saved_version(), v2);
    }

    #[test]
    fn test_unsaved_handle_starts_dirty() {
        let handle = ModelHandle::unsaved(
            coffee::sample_model("new.json"),
            Arc::new(coffee::package()),
            Duration::from_millis(100),
        );
        assert!(handle.is_dirty());
    }

    #[tokio::test]
    async fn test_lock_times_out_while_held() {
        let handle = handle(20);
        let _held = handle.lock().await.unwrap();

        let err = handle.lock().await.unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Timeout);
        assert_eq!(err.model_id(), Some("coffee.json"));
    }

    #[tokio::test]
    async fn test_eviction_is_seen_by_next_holder() {
        let handle = handle(100);
        assert!(!handle.is_evicted());

        let held = handle.lock().await.unwrap();
        handle.mark_evicted(&held);
        drop(held);

        let _next = handle.lock().await.unwrap();
        assert!(handle.is_evicted());
    }
}
