//! Engine-level requests, one variant per controller operation.

#![allow(clippy::result_large_err)]

use crate::controller::ModelController;
use crate::notification::CommandResult;
use modelhub_core::Diagnostic;
use modelhub_core_types::SessionId;
use modelhub_store::Result;

/// A request addressed to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Decode and execute an encoded command
    Execute {
        model_id: String,
        payload: Vec<u8>,
        /// Wire format; `None` selects the preferred format
        format: Option<String>,
    },
    Undo {
        model_id: String,
        format: Option<String>,
    },
    Redo {
        model_id: String,
        format: Option<String>,
    },
    Save {
        model_id: String,
    },
    Validate {
        model_id: String,
    },
    /// Encode the model's current state
    Snapshot {
        model_id: String,
        format: Option<String>,
    },
    Subscribe {
        session_id: SessionId,
        model_id: String,
    },
    Unsubscribe {
        session_id: SessionId,
        model_id: String,
    },
    Close {
        model_id: String,
    },
}

impl EngineCommand {
    pub fn model_id(&self) -> &str {
        match self {
            EngineCommand::Execute { model_id, .. }
            | EngineCommand::Undo { model_id, .. }
            | EngineCommand::Redo { model_id, .. }
            | EngineCommand::Save { model_id }
            | EngineCommand::Validate { model_id }
            | EngineCommand::Snapshot { model_id, .. }
            | EngineCommand::Subscribe { model_id, .. }
            | EngineCommand::Unsubscribe { model_id, .. }
            | EngineCommand::Close { model_id } => model_id,
        }
    }
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    /// Execute, undo or redo committed
    Mutated(CommandResult),
    Saved,
    Diagnostics(Vec<Diagnostic>),
    Snapshot(Vec<u8>),
    Subscribed,
    Unsubscribed,
    Closed,
}

/// Apply an engine command against a controller.
pub async fn apply_engine_command(
    cmd: EngineCommand,
    controller: &ModelController,
) -> Result<EngineCommandResult> {
    match cmd {
        EngineCommand::Execute {
            model_id,
            payload,
            format,
        } => controller
            .handle(&model_id, &payload, format.as_deref())
            .await
            .map(EngineCommandResult::Mutated),
        EngineCommand::Undo { model_id, format } => controller
            .undo(&model_id, format.as_deref())
            .await
            .map(EngineCommandResult::Mutated),
        EngineCommand::Redo { model_id, format } => controller
            .redo(&model_id, format.as_deref())
            .await
            .map(EngineCommandResult::Mutated),
        EngineCommand::Save { model_id } => {
            controller.save(&model_id).await?;
            Ok(EngineCommandResult::Saved)
        }
        EngineCommand::Validate { model_id } => controller
            .validate(&model_id)
            .await
            .map(EngineCommandResult::Diagnostics),
        EngineCommand::Snapshot { model_id, format } => controller
            .snapshot(&model_id, format.as_deref())
            .await
            .map(EngineCommandResult::Snapshot),
        EngineCommand::Subscribe {
            session_id,
            model_id,
        } => {
            controller.subscribe(&session_id, &model_id).await?;
            Ok(EngineCommandResult::Subscribed)
        }
        EngineCommand::Unsubscribe {
            session_id,
            model_id,
        } => {
            controller.unsubscribe(&session_id, &model_id);
            Ok(EngineCommandResult::Unsubscribed)
        }
        EngineCommand::Close { model_id } => {
            controller.close(&model_id).await?;
            Ok(EngineCommandResult::Closed)
        }
    }
}
