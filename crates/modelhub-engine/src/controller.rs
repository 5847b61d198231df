//! Model controller
//!
//! Entry point for every operation on a hosted model. Each operation takes
//! the model's lock and, while holding it, decodes against the current
//! state, runs the stack, validates, marks dirty and notifies subscribers.
//! A notification therefore reaches every queue before the next operation
//! on the same model starts. Autosave runs inside the lock or right after
//! it, per configuration; dirty-state broadcasts also go out under the
//! lock so they stay ordered with command notifications.

#![allow(clippy::result_large_err)]

use crate::config::{AutosavePolicy, ServerConfig, ValidationPolicy};
use crate::notification::{CommandResult, MutationKind, Notification, NotificationPayload, Persisted};
use crate::session::SessionController;
use modelhub_core::rules::max_severity;
use modelhub_core::{
    log_op_end, log_op_error, log_op_start, CodecRegistry, Command, CommandCodec, Diagnostic,
    ExError, HubError, Model, ModelValidator, PackageRegistry, Severity,
};
use modelhub_core_types::{RequestId, SessionId};
use modelhub_store::{
    canonical_id, ModelGuard, ModelHandle, ModelRepository, RepositoryOptions, Result,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Controller behaviour taken from `ServerConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerPolicy {
    pub autosave: AutosavePolicy,
    pub persist_inside_lock: bool,
    pub validation: ValidationPolicy,
}

impl From<&ServerConfig> for ControllerPolicy {
    fn from(config: &ServerConfig) -> Self {
        Self {
            autosave: config.autosave,
            persist_inside_lock: config.persist_inside_lock,
            validation: config.validation,
        }
    }
}

impl Default for ControllerPolicy {
    fn default() -> Self {
        (&ServerConfig::default()).into()
    }
}

pub struct ModelController {
    repository: Arc<ModelRepository>,
    sessions: Arc<SessionController>,
    codec: CommandCodec,
    validator: ModelValidator,
    policy: ControllerPolicy,
    sequences: Mutex<HashMap<String, u64>>,
}

impl ModelController {
    pub fn new(
        repository: Arc<ModelRepository>,
        sessions: Arc<SessionController>,
        validator: ModelValidator,
        policy: ControllerPolicy,
    ) -> Self {
        let codec = CommandCodec::new(repository.codecs().clone());
        Self {
            repository,
            sessions,
            codec,
            validator,
            policy,
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Wire a controller from configuration
    ///
    /// # Errors
    ///
    /// - `UnknownFormat` if a configured format has no codec
    /// - storage errors from opening the backing store
    pub fn from_config(
        config: &ServerConfig,
        packages: Arc<PackageRegistry>,
        validator: ModelValidator,
    ) -> Result<Self> {
        let mut codecs = CodecRegistry::with_defaults();
        codecs.set_preferred(&config.default_format)?;
        codecs.resolve(&config.storage_format)?;

        let repository = ModelRepository::new(
            config.open_store()?,
            Arc::new(codecs),
            packages,
            RepositoryOptions {
                storage_format: config.storage_format.clone(),
                lock_timeout: config.lock_timeout(),
            },
        );
        Ok(Self::new(
            Arc::new(repository),
            Arc::new(SessionController::new(config.overflow)),
            validator,
            config.into(),
        ))
    }

    pub fn repository(&self) -> &Arc<ModelRepository> {
        &self.repository
    }

    pub fn sessions(&self) -> &Arc<SessionController> {
        &self.sessions
    }

    pub fn policy(&self) -> ControllerPolicy {
        self.policy
    }

    fn next_sequence(&self, model_id: &str) -> u64 {
        let mut sequences = self.sequences.lock();
        let next = sequences.entry(model_id.to_string()).or_insert(0);
        *next += 1;
        *next
    }

    /// Decode and execute a command on a model
    ///
    /// # Errors
    ///
    /// - `UnknownFormat`, `MalformedCommand`, `UnresolvedReference` before
    ///   any mutation
    /// - `ModelNotFound` / `CorruptModel` if the model cannot be loaded
    /// - `Timeout` if the model stays busy past the lock timeout
    /// - `CommandExecutionFailed` with model and history unchanged
    /// - `ValidationRejected` under the reject-on-error policy, after the
    ///   command is revoked
    ///
    /// A failed autosave is not an error: the command stays committed and
    /// the failure is reported in [`CommandResult::persisted`].
    pub async fn handle(
        &self,
        model_id: &str,
        raw: &[u8],
        format: Option<&str>,
    ) -> Result<CommandResult> {
        let request_id = RequestId::new();
        log_op_start!(
            "handle",
            model_id = model_id,
            request_id = request_id.as_str()
        );
        let start = Instant::now();

        let outcome = self.handle_inner(model_id, raw, format).await;
        self.log_outcome("handle", model_id, &request_id, start, outcome)
    }

    async fn handle_inner(
        &self,
        model_id: &str,
        raw: &[u8],
        format: Option<&str>,
    ) -> Result<CommandResult> {
        let format = self.resolve_format(format)?;
        let (handle, mut guard) = self.repository.lock(model_id).await?;

        let slot = &mut *guard;
        let command = self.codec.decode(&format, raw, &slot.model)?;
        slot.stack
            .execute(&mut slot.model, &slot.package, command.clone())?;

        let encoded = match self.codec.encode_as(&format, &command) {
            Ok(bytes) => bytes,
            Err(err) => {
                slot.stack.revoke_last(&mut slot.model)?;
                return Err(err.into());
            }
        };

        let diagnostics = self.validator.validate(&slot.model);
        if self.policy.validation == ValidationPolicy::RejectOnError
            && max_severity(&diagnostics) == Severity::Error
        {
            slot.stack.revoke_last(&mut slot.model)?;
            return Err(rejected(model_id, &diagnostics));
        }

        self.commit(
            &handle,
            guard,
            MutationKind::Execute,
            format,
            encoded,
            diagnostics,
        )
        .await
    }

    /// Revert the last executed command
    ///
    /// The payload carries the reverted command encoded in `format`.
    ///
    /// # Errors
    ///
    /// Returns `NothingToUndo` at the start of history, or the load and
    /// lock errors of [`ModelController::handle`].
    pub async fn undo(&self, model_id: &str, format: Option<&str>) -> Result<CommandResult> {
        self.step(model_id, format, MutationKind::Undo).await
    }

    /// Re-apply the last undone command
    ///
    /// # Errors
    ///
    /// Returns `NothingToRedo` with no redo tail, or the load and lock
    /// errors of [`ModelController::handle`].
    pub async fn redo(&self, model_id: &str, format: Option<&str>) -> Result<CommandResult> {
        self.step(model_id, format, MutationKind::Redo).await
    }

    async fn step(
        &self,
        model_id: &str,
        format: Option<&str>,
        kind: MutationKind,
    ) -> Result<CommandResult> {
        let request_id = RequestId::new();
        log_op_start!(
            kind.as_str(),
            model_id = model_id,
            request_id = request_id.as_str()
        );
        let start = Instant::now();

        let outcome: Result<CommandResult> = async {
            let format = self.resolve_format(format)?;
            let (handle, mut guard) = self.repository.lock(model_id).await?;

            let slot = &mut *guard;
            let command: Command = match kind {
                MutationKind::Redo => slot.stack.redo(&mut slot.model)?.clone(),
                _ => slot.stack.undo(&mut slot.model)?.clone(),
            };
            let encoded = self.codec.encode_as(&format, &command)?;
            let diagnostics = self.validator.validate(&slot.model);

            self.commit(&handle, guard, kind, format, encoded, diagnostics)
                .await
        }
        .await;

        self.log_outcome(kind.as_str(), model_id, &request_id, start, outcome)
    }

    /// Mark dirty, notify, then autosave; consumes the model lock
    async fn commit(
        &self,
        handle: &ModelHandle,
        guard: ModelGuard,
        kind: MutationKind,
        format: String,
        command: Vec<u8>,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<CommandResult> {
        let model_id = handle.model_id();
        handle.mark_dirty();

        let payload = Arc::new(NotificationPayload {
            model_id: model_id.to_string(),
            sequence: self.next_sequence(model_id),
            kind,
            format,
            command,
            diagnostics,
            dirty: handle.is_dirty(),
        });
        self.sessions
            .notify(Notification::Command(payload.clone()));

        let persisted = match self.policy.autosave {
            AutosavePolicy::Never => {
                drop(guard);
                Persisted::NotRequested
            }
            AutosavePolicy::AfterCommand => {
                let snapshot = self.repository.snapshot(handle, &guard);
                let written = match snapshot {
                    Err(err) => {
                        drop(guard);
                        Err(err)
                    }
                    Ok(snapshot) if self.policy.persist_inside_lock => {
                        let written = self.repository.persist(handle, snapshot).await;
                        if written.is_ok() {
                            self.notify_dirty_state(handle);
                        }
                        drop(guard);
                        written
                    }
                    Ok(snapshot) => {
                        let writer = handle.writer().await;
                        drop(guard);
                        let written = self
                            .repository
                            .persist_with(handle, snapshot, writer)
                            .await;
                        if written.is_ok() {
                            self.announce_dirty_state(handle).await;
                        }
                        written
                    }
                };
                match written {
                    Ok(()) => Persisted::Saved,
                    Err(err) => {
                        tracing::warn!(
                            model_id,
                            err.code = err.code(),
                            "autosave failed, model stays dirty"
                        );
                        Persisted::Failed(err)
                    }
                }
            }
        };

        Ok(CommandResult { payload, persisted })
    }

    /// Broadcast dirty state; the caller holds the model lock
    fn notify_dirty_state(&self, handle: &ModelHandle) {
        self.sessions.notify(Notification::DirtyState {
            model_id: handle.model_id().to_string(),
            dirty: handle.is_dirty(),
        });
    }

    /// Take the model lock briefly and broadcast dirty state
    async fn announce_dirty_state(&self, handle: &ModelHandle) {
        match handle.lock().await {
            Ok(_slot) if !handle.is_evicted() => self.notify_dirty_state(handle),
            Ok(_) => {}
            Err(err) => tracing::debug!(
                model_id = handle.model_id(),
                err.code = err.code(),
                "dirty state not announced"
            ),
        }
    }

    /// Persist a live model and broadcast its dirty state
    ///
    /// # Errors
    ///
    /// - `ModelNotFound` if the model is not live
    /// - `Timeout` if the model stays busy
    /// - `Persistence` if the store rejects the write; the model stays dirty
    pub async fn save(&self, model_id: &str) -> Result<()> {
        self.repository.save(model_id).await?;
        if let Some(handle) = self.repository.loaded(model_id) {
            self.announce_dirty_state(&handle).await;
        }
        Ok(())
    }

    /// Run the validator on a model's current state
    ///
    /// # Errors
    ///
    /// Returns load and lock errors.
    pub async fn validate(&self, model_id: &str) -> Result<Vec<Diagnostic>> {
        let (_, slot) = self.repository.lock(model_id).await?;
        Ok(self.validator.validate(&slot.model))
    }

    /// Encode a model's current state
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat`, load and lock errors.
    pub async fn snapshot(&self, model_id: &str, format: Option<&str>) -> Result<Vec<u8>> {
        let codec = self.repository.codecs().resolve_or_default(format)?;
        let (_, slot) = self.repository.lock(model_id).await?;
        Ok(codec.encode_model(&slot.model)?)
    }

    /// Register a new in-memory model
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` or `UnknownPackage`.
    pub async fn create(&self, model: Model) -> Result<()> {
        self.repository.create(model).await.map(|_| ())
    }

    /// Subscribe a session to a model, loading it first
    ///
    /// Runs under the model lock, so it orders with `close`: either the
    /// close sees the subscriber, or the subscription lands on the model
    /// loaded again after it.
    ///
    /// # Errors
    ///
    /// Returns load and lock errors, and `SessionClosed` for an unknown
    /// session.
    pub async fn subscribe(&self, session_id: &SessionId, model_id: &str) -> Result<()> {
        let (handle, _slot) = self.repository.lock(model_id).await?;
        self.sessions.subscribe(session_id, handle.model_id())
    }

    /// Remove a subscription; unknown ids are a no-op
    pub fn unsubscribe(&self, session_id: &SessionId, model_id: &str) {
        if let Ok(key) = canonical_id(model_id) {
            self.sessions.unsubscribe(session_id, &key);
        }
    }

    /// Evict a model that no session subscribes to
    ///
    /// # Errors
    ///
    /// Returns `ModelBusy` while subscribers remain.
    pub async fn close(&self, model_id: &str) -> Result<()> {
        self.repository.close(model_id, self.sessions.as_ref()).await
    }

    fn resolve_format(&self, format: Option<&str>) -> Result<String> {
        Ok(self
            .repository
            .codecs()
            .resolve_or_default(format)?
            .format()
            .to_string())
    }

    /// Log the end of a request and stamp its id on a failure
    fn log_outcome(
        &self,
        op: &str,
        model_id: &str,
        request_id: &RequestId,
        start: Instant,
        outcome: Result<CommandResult>,
    ) -> Result<CommandResult> {
        match outcome {
            Ok(result) => {
                log_op_end!(
                    op,
                    duration_ms = start.elapsed().as_millis() as u64,
                    model_id = model_id,
                    request_id = request_id.as_str(),
                    sequence = result.payload.sequence,
                    diagnostics = result.payload.diagnostics.len(),
                    saved = result.persisted.is_saved()
                );
                Ok(result)
            }
            Err(err) => {
                let err = err.with_request_id(request_id.clone());
                log_op_error!(
                    op,
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    model_id = model_id,
                    request_id = request_id.as_str()
                );
                Err(err)
            }
        }
    }
}

fn rejected(model_id: &str, diagnostics: &[Diagnostic]) -> ExError {
    let reason = diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .unwrap_or_default();
    HubError::ValidationRejected {
        model_id: model_id.to_string(),
        reason,
    }
    .into()
}

impl std::fmt::Debug for ModelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelController")
            .field("repository", &self.repository)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
