//! Notifications delivered to subscribed sessions

use modelhub_core::{Diagnostic, ExError};
use serde::Serialize;
use std::sync::Arc;

/// Which stack operation produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Execute,
    Undo,
    Redo,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Execute => "execute",
            MutationKind::Undo => "undo",
            MutationKind::Redo => "redo",
        }
    }
}

/// Result of one committed mutation, sent to the originator and to every
/// subscriber of the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub model_id: String,
    /// Per-model, strictly increasing
    pub sequence: u64,
    pub kind: MutationKind,
    /// Format of `command`
    pub format: String,
    /// The executed command, encoded; for undo the reverted command
    pub command: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Command(Arc<NotificationPayload>),
    /// Sent after a save changes a model's dirty flag
    DirtyState { model_id: String, dirty: bool },
}

impl Notification {
    pub fn model_id(&self) -> &str {
        match self {
            Notification::Command(payload) => &payload.model_id,
            Notification::DirtyState { model_id, .. } => model_id,
        }
    }
}

/// Outcome of the persistence step of a mutation
#[derive(Debug, Clone)]
pub enum Persisted {
    /// Autosave is off
    NotRequested,
    Saved,
    /// The command stays committed and the model stays dirty
    Failed(ExError),
}

impl Persisted {
    pub fn is_saved(&self) -> bool {
        matches!(self, Persisted::Saved)
    }
}

/// What `handle`, `undo` and `redo` return to their caller
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub payload: Arc<NotificationPayload>,
    pub persisted: Persisted,
}
