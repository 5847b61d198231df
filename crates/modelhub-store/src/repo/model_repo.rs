//! Model repository
//!
//! Holds at most one live instance per model id. The id map is guarded by
//! a short synchronous lock; loading happens outside it, through a
//! per-id `OnceCell`, so concurrent first accesses share one load and
//! models never block each other. Ids are keyed in canonical form.

#![allow(clippy::result_large_err)]

use crate::errors::{invalid_model_id, persistence_error, task_failed, Result};
use crate::repo::handle::{ModelGuard, ModelHandle, ModelSlot, SaveWriter};
use crate::repo::hydration::hydrate;
use crate::storage::ModelStore;
use modelhub_core::{
    log_op_end, log_op_error, log_op_start, Codec, CodecRegistry, ExError, HubError, Model,
    PackageRegistry,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

type Cell = Arc<OnceCell<Arc<ModelHandle>>>;

/// Read access to live subscriptions, consulted by `close`
pub trait SubscriptionIndex: Send + Sync {
    fn subscriber_count(&self, model_id: &str) -> usize;
}

/// Encoded state of a model at an edit version
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub model_id: String,
    pub version: u64,
    pub format: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Format used for ids without a recognised extension
    pub storage_format: String,
    pub lock_timeout: Duration,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            storage_format: "json".to_string(),
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

pub struct ModelRepository {
    store: Arc<dyn ModelStore>,
    codecs: Arc<CodecRegistry>,
    packages: Arc<PackageRegistry>,
    options: RepositoryOptions,
    models: RwLock<HashMap<String, Cell>>,
}

/// Canonical form of a model id, the key a live model is held under
///
/// Empty and `.` segments are dropped, so `./coffee.json` and
/// `coffee.json` name the same model.
///
/// # Errors
///
/// Returns `InvalidInput` for empty or absolute ids and ids with `..`.
pub fn canonical_id(model_id: &str) -> Result<String> {
    if model_id.starts_with('/') {
        return Err(invalid_model_id(model_id, "absolute path"));
    }
    let mut segments = Vec::new();
    for segment in model_id.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(invalid_model_id(model_id, "parent directory component")),
            segment => segments.push(segment),
        }
    }
    if segments.is_empty() {
        return Err(invalid_model_id(model_id, "empty"));
    }
    Ok(segments.join("/"))
}

fn busy(model_id: &str, subscribers: usize) -> ExError {
    HubError::ModelBusy {
        model_id: model_id.to_string(),
        subscribers,
    }
    .into()
}

fn not_found(model_id: &str) -> ExError {
    HubError::ModelNotFound {
        model_id: model_id.to_string(),
    }
    .into()
}

impl ModelRepository {
    pub fn new(
        store: Arc<dyn ModelStore>,
        codecs: Arc<CodecRegistry>,
        packages: Arc<PackageRegistry>,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            store,
            codecs,
            packages,
            options,
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn packages(&self) -> &Arc<PackageRegistry> {
        &self.packages
    }

    /// Storage codec for a model id
    ///
    /// An extension naming a registered format wins (`coffee.yaml` is
    /// stored as YAML); otherwise the configured storage format is used.
    pub fn codec_for(&self, model_id: &str) -> Result<Arc<dyn Codec>> {
        let by_extension = Path::new(model_id)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.codecs.resolve(ext).ok());
        match by_extension {
            Some(codec) => Ok(codec),
            None => Ok(self.codecs.resolve(&self.options.storage_format)?),
        }
    }

    /// Get a live model, loading it on first access
    ///
    /// # Errors
    ///
    /// - `ModelNotFound` if the store has no resource for the id
    /// - `CorruptModel` if it loads but does not conform to its package
    /// - storage errors surfaced by the backing store
    pub async fn get(&self, model_id: &str) -> Result<Arc<ModelHandle>> {
        let key = canonical_id(model_id)?;
        let model_id = key.as_str();
        let cell = {
            if let Some(cell) = self.models.read().get(model_id) {
                if let Some(handle) = cell.get() {
                    return Ok(handle.clone());
                }
            }
            self.models
                .write()
                .entry(model_id.to_string())
                .or_default()
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.load(model_id))
            .await
            .cloned();

        if result.is_err() {
            // Forget the failed cell so a later get retries the load
            let mut models = self.models.write();
            if let Some(current) = models.get(model_id) {
                if Arc::ptr_eq(current, &cell) && current.get().is_none() {
                    models.remove(model_id);
                }
            }
        }
        result
    }

    /// Lock a live model, loading it on first access
    ///
    /// A handle evicted by `close` while this call waited is let go and the
    /// model is fetched again, so work never lands on a closed instance.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ModelRepository::get`] and `Timeout`.
    pub async fn lock(&self, model_id: &str) -> Result<(Arc<ModelHandle>, ModelGuard)> {
        loop {
            let handle = self.get(model_id).await?;
            let guard = handle.lock().await?;
            if !handle.is_evicted() {
                return Ok((handle, guard));
            }
            tracing::debug!(model_id = handle.model_id(), "handle evicted while waiting");
        }
    }

    async fn load(&self, model_id: &str) -> Result<Arc<ModelHandle>> {
        log_op_start!("load_model", model_id = model_id);
        let start = Instant::now();

        let outcome = self.load_inner(model_id).await;
        match &outcome {
            Ok(_) => log_op_end!(
                "load_model",
                duration_ms = start.elapsed().as_millis() as u64,
                model_id = model_id
            ),
            Err(err) => log_op_error!(
                "load_model",
                err.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                model_id = model_id
            ),
        }
        outcome
    }

    async fn load_inner(&self, model_id: &str) -> Result<Arc<ModelHandle>> {
        let codec = self.codec_for(model_id)?;
        let bytes = self
            .read_stored(model_id)
            .await?
            .ok_or_else(|| not_found(model_id))?;

        let (model, package) = hydrate(codec.as_ref(), &self.packages, model_id, &bytes)?;
        Ok(Arc::new(ModelHandle::clean(
            model,
            package,
            self.options.lock_timeout,
        )))
    }

    async fn read_stored(&self, model_id: &str) -> Result<Option<Vec<u8>>> {
        let store = self.store.clone();
        let id = model_id.to_string();
        tokio::task::spawn_blocking(move || store.load(&id))
            .await
            .map_err(|e| task_failed("load_model", e))?
    }

    /// Register a model that exists only in memory; it starts dirty
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the id is live or present in storage
    /// - `UnknownPackage` if the model's package is not registered
    pub async fn create(&self, mut model: Model) -> Result<Arc<ModelHandle>> {
        model.id = canonical_id(&model.id)?;
        let model_id = model.id.clone();
        let exists = || -> ExError {
            HubError::ModelAlreadyExists {
                model_id: model_id.clone(),
            }
            .into()
        };

        if self.models.read().contains_key(&model_id) {
            return Err(exists());
        }
        self.codec_for(&model_id)?;
        let package = self.packages.get(&model.package)?;
        if self.read_stored(&model_id).await?.is_some() {
            return Err(exists());
        }

        let handle = Arc::new(ModelHandle::unsaved(
            model,
            package,
            self.options.lock_timeout,
        ));
        let mut models = self.models.write();
        if models.contains_key(&model_id) {
            return Err(exists());
        }
        models.insert(
            model_id.clone(),
            Arc::new(OnceCell::new_with(Some(handle.clone()))),
        );
        tracing::info!(model_id = model_id.as_str(), "model created");
        Ok(handle)
    }

    /// Live handle without triggering a load
    pub fn loaded(&self, model_id: &str) -> Option<Arc<ModelHandle>> {
        let key = canonical_id(model_id).ok()?;
        self.models
            .read()
            .get(&key)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.loaded(model_id).is_some()
    }

    /// Ids of every live model, sorted
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .models
            .read()
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of every model in the backing store
    pub async fn stored_ids(&self) -> Result<Vec<String>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.list())
            .await
            .map_err(|e| task_failed("list_models", e))?
    }

    /// # Errors
    ///
    /// Returns `ModelNotFound` if the model is not live.
    pub fn is_dirty(&self, model_id: &str) -> Result<bool> {
        self.loaded(model_id)
            .map(|h| h.is_dirty())
            .ok_or_else(|| not_found(model_id))
    }

    /// # Errors
    ///
    /// Returns `ModelNotFound` if the model is not live.
    pub fn mark_dirty(&self, model_id: &str) -> Result<u64> {
        self.loaded(model_id)
            .map(|h| h.mark_dirty())
            .ok_or_else(|| not_found(model_id))
    }

    /// Encode the locked model state at the handle's current edit version
    pub fn snapshot(&self, handle: &ModelHandle, slot: &ModelSlot) -> Result<Snapshot> {
        let codec = self.codec_for(handle.model_id())?;
        let bytes = codec.encode_model(&slot.model)?;
        Ok(Snapshot {
            model_id: handle.model_id().to_string(),
            version: handle.edit_version(),
            format: codec.format().to_string(),
            bytes,
        })
    }

    /// Write a snapshot to the backing store
    ///
    /// Writers of one model are serialized; a snapshot older than one
    /// already saved is skipped. Dirty clears only if no edit landed after
    /// the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` carrying the storage cause; the in-memory
    /// model and its dirty flag are left as they were.
    pub async fn persist(&self, handle: &ModelHandle, snapshot: Snapshot) -> Result<()> {
        let writer = handle.writer().await;
        self.persist_with(handle, snapshot, writer).await
    }

    /// [`ModelRepository::persist`] with a writer slot claimed beforehand
    ///
    /// Claiming the writer while the model lock is still held orders the
    /// write before any later `close` of the model.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` carrying the storage cause.
    pub async fn persist_with(
        &self,
        handle: &ModelHandle,
        snapshot: Snapshot,
        _writer: SaveWriter<'_>,
    ) -> Result<()> {
        if snapshot.version < handle.saved_version() {
            tracing::debug!(
                model_id = snapshot.model_id.as_str(),
                version = snapshot.version,
                "skipping stale snapshot"
            );
            return Ok(());
        }

        log_op_start!("save_model", model_id = snapshot.model_id.as_str());
        let start = Instant::now();

        let store = self.store.clone();
        let id = snapshot.model_id.clone();
        let bytes = snapshot.bytes;
        let written = tokio::task::spawn_blocking(move || store.store(&id, &bytes))
            .await
            .map_err(|e| task_failed("save_model", e))
            .and_then(|r| r);

        match written {
            Ok(()) => {
                handle.mark_saved(snapshot.version);
                log_op_end!(
                    "save_model",
                    duration_ms = start.elapsed().as_millis() as u64,
                    model_id = snapshot.model_id.as_str(),
                    version = snapshot.version
                );
                Ok(())
            }
            Err(cause) => {
                let err = persistence_error(&snapshot.model_id, cause);
                log_op_error!(
                    "save_model",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    model_id = snapshot.model_id.as_str()
                );
                Err(err)
            }
        }
    }

    /// Persist a live model's current state
    ///
    /// The model lock is held only while encoding and claiming the writer.
    ///
    /// # Errors
    ///
    /// - `ModelNotFound` if the model is not live or closes meanwhile
    /// - `Timeout` if the model stays busy
    /// - `Persistence` if the store rejects the write
    pub async fn save(&self, model_id: &str) -> Result<()> {
        let handle = self.loaded(model_id).ok_or_else(|| not_found(model_id))?;
        let slot = handle.lock().await?;
        if handle.is_evicted() {
            return Err(not_found(handle.model_id()));
        }
        let snapshot = self.snapshot(&handle, &slot)?;
        let writer = handle.writer().await;
        drop(slot);
        self.persist_with(&handle, snapshot, writer).await
    }

    /// Save every dirty live model; one failure does not stop the others
    pub async fn save_all(&self) -> Vec<(String, Result<()>)> {
        let mut results = Vec::new();
        for model_id in self.loaded_ids() {
            if !self.is_dirty(&model_id).unwrap_or(false) {
                continue;
            }
            let outcome = self.save(&model_id).await;
            results.push((model_id, outcome));
        }
        results
    }

    /// Evict a live model
    ///
    /// Waits for in-flight work and writes on the model, then drops it.
    /// Subscriptions are checked again under the model lock, the same lock
    /// subscribers take, so a subscriber that arrived meanwhile keeps the
    /// model live. Unsaved edits are discarded with a warning. Closing a
    /// model that is not live is a no-op.
    ///
    /// # Errors
    ///
    /// - `ModelBusy` if sessions still subscribe to the model
    /// - `Timeout` if the model stays busy
    pub async fn close(&self, model_id: &str, subscriptions: &dyn SubscriptionIndex) -> Result<()> {
        let key = canonical_id(model_id)?;
        let model_id = key.as_str();
        let subscribers = subscriptions.subscriber_count(model_id);
        if subscribers > 0 {
            return Err(busy(model_id, subscribers));
        }

        let Some(handle) = self.loaded(model_id) else {
            return Ok(());
        };
        let slot = handle.lock().await?;
        if handle.is_evicted() {
            return Ok(());
        }
        let subscribers = subscriptions.subscriber_count(model_id);
        if subscribers > 0 {
            return Err(busy(model_id, subscribers));
        }
        let _writer = handle.writer().await;

        if handle.is_dirty() {
            tracing::warn!(model_id, "closing model with unsaved edits");
        }
        handle.mark_evicted(&slot);
        let mut models = self.models.write();
        let current = models.get(model_id).and_then(|cell| cell.get());
        if current.is_some_and(|live| Arc::ptr_eq(live, &handle)) {
            models.remove(model_id);
        }
        tracing::info!(model_id, "model closed");
        Ok(())
    }
}

impl std::fmt::Debug for ModelRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRepository")
            .field("options", &self.options)
            .field("loaded", &self.loaded_ids())
            .finish_non_exhaustive()
    }
}
