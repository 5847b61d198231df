//! Per-model undo/redo history and execution gate
//!
//! The stack owns an ordered list of executed commands, each with the
//! journal its execution produced, and a cursor marking the undo/redo
//! boundary. Execution is isolated: an apply error or a panic is caught
//! here, the partial journal is reverted, and the caller receives
//! `CommandExecutionFailed` with history and model unchanged.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::apply::apply;
use crate::commands::Command;
use crate::errors::{HubError, Result};
use crate::journal::Journal;
use crate::metamodel::Package;
use crate::model::Model;
use crate::{log_op_end, log_op_error, log_op_start};

/// Execution state of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    Idle,
    Executing,
}

#[derive(Debug, Clone)]
struct StackEntry {
    command: Command,
    journal: Journal,
}

/// Linear undo/redo history for one model
///
/// Invariant: `0 <= cursor <= len`. Entries at `cursor..` form the redo
/// tail and are discarded by the next successful `execute`.
#[derive(Debug, Clone)]
pub struct CommandStack {
    model_id: String,
    entries: Vec<StackEntry>,
    cursor: usize,
    state: StackState,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic during apply: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic during apply: {}", s)
    } else {
        "panic during apply".to_string()
    }
}

impl CommandStack {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            entries: Vec::new(),
            cursor: 0,
            state: StackState::Idle,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn state(&self) -> StackState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Every retained command in execution order, including the redo tail
    pub fn history(&self) -> Vec<&Command> {
        self.entries.iter().map(|e| &e.command).collect()
    }

    /// Command the next `undo` would revert
    pub fn undo_command(&self) -> Option<&Command> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| &e.command)
    }

    /// Command the next `redo` would re-apply
    pub fn redo_command(&self) -> Option<&Command> {
        self.entries.get(self.cursor).map(|e| &e.command)
    }

    /// Execute a command against the model
    ///
    /// # Errors
    ///
    /// Returns `CommandExecutionFailed` if apply fails or panics; the model
    /// and history are then exactly as before the call.
    pub fn execute(
        &mut self,
        model: &mut Model,
        package: &Package,
        command: Command,
    ) -> Result<()> {
        self.execute_with(model, command, |model, cmd, journal| {
            apply(model, package, cmd, journal)
        })
    }

    /// Execute with a caller-supplied apply function
    ///
    /// The applier must record every mutation it makes in the journal; on
    /// error or panic the journal is reverted.
    pub fn execute_with<F>(
        &mut self,
        model: &mut Model,
        command: Command,
        applier: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Model, &Command, &mut Journal) -> Result<()>,
    {
        let kind = command.kind();
        log_op_start!(
            "execute",
            model_id = self.model_id.as_str(),
            command_kind = kind.as_str()
        );
        let start = std::time::Instant::now();

        self.state = StackState::Executing;
        let mut journal = Journal::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| applier(model, &command, &mut journal)));
        self.state = StackState::Idle;

        let cause = match outcome {
            Ok(Ok(())) => {
                self.entries.truncate(self.cursor);
                self.entries.push(StackEntry { command, journal });
                self.cursor += 1;
                log_op_end!(
                    "execute",
                    duration_ms = start.elapsed().as_millis() as u64,
                    model_id = self.model_id.as_str(),
                    command_kind = kind.as_str(),
                    cursor = self.cursor
                );
                return Ok(());
            }
            Ok(Err(err)) => {
                journal.revert(model);
                err.to_string()
            }
            Err(payload) => {
                journal.revert(model);
                panic_message(payload.as_ref())
            }
        };

        let err = HubError::CommandExecutionFailed {
            model_id: self.model_id.clone(),
            command_kind: kind.as_str().to_string(),
            cause: cause.clone(),
        };
        log_op_error!(
            "execute",
            err.clone(),
            duration_ms = start.elapsed().as_millis() as u64,
            model_id = self.model_id.as_str(),
            command_kind = kind.as_str(),
            cause = cause.as_str()
        );
        Err(err)
    }

    /// Revert the command before the cursor
    ///
    /// # Errors
    ///
    /// Returns `NothingToUndo` if the cursor is at the start of history.
    pub fn undo(&mut self, model: &mut Model) -> Result<&Command> {
        if self.cursor == 0 {
            return Err(HubError::NothingToUndo {
                model_id: self.model_id.clone(),
            });
        }
        self.cursor -= 1;
        let entry = &self.entries[self.cursor];
        entry.journal.revert(model);
        tracing::debug!(
            model_id = self.model_id.as_str(),
            command_kind = entry.command.kind().as_str(),
            cursor = self.cursor,
            "undo"
        );
        Ok(&entry.command)
    }

    /// Re-apply the command at the cursor
    ///
    /// # Errors
    ///
    /// Returns `NothingToRedo` if there is no redo tail.
    pub fn redo(&mut self, model: &mut Model) -> Result<&Command> {
        if self.cursor >= self.entries.len() {
            return Err(HubError::NothingToRedo {
                model_id: self.model_id.clone(),
            });
        }
        self.entries[self.cursor].journal.replay(model);
        self.cursor += 1;
        let entry = &self.entries[self.cursor - 1];
        tracing::debug!(
            model_id = self.model_id.as_str(),
            command_kind = entry.command.kind().as_str(),
            cursor = self.cursor,
            "redo"
        );
        Ok(&entry.command)
    }

    /// Undo the last command and drop it from history, including any redo tail
    ///
    /// # Errors
    ///
    /// Returns `NothingToUndo` if the cursor is at the start of history.
    pub fn revoke_last(&mut self, model: &mut Model) -> Result<Command> {
        self.undo(model)?;
        let mut tail = self.entries.split_off(self.cursor);
        let revoked = tail.remove(0);
        Ok(revoked.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Change;
    use crate::metamodel::coffee;
    use crate::model::{FeatureValue, Value};

    fn setup() -> (Model, Package, CommandStack) {
        (
            coffee::sample_model("coffee.json"),
            coffee::package(),
            CommandStack::new("coffee.json"),
        )
    }

    fn vendor(v: &str) -> Command {
        Command::set("cpu", "vendor", Value::Str(v.to_string()))
    }

    #[test]
    fn test_execute_undo_redo_cycle() {
        let (mut model, package, mut stack) = setup();
        let original = model.clone();

        stack.execute(&mut model, &package, vendor("Intel")).unwrap();
        let edited = model.clone();
        assert_eq!(stack.cursor(), 1);
        assert!(stack.can_undo());
        assert!(!stack.can_redo());

        stack.undo(&mut model).unwrap();
        assert_eq!(model, original);
        assert_eq!(stack.redo_command(), Some(&vendor("Intel")));

        stack.redo(&mut model).unwrap();
        assert_eq!(model, edited);
        assert_eq!(stack.cursor(), 1);
    }

    #[test]
    fn test_new_execute_discards_redo_tail() {
        let (mut model, package, mut stack) = setup();

        stack.execute(&mut model, &package, vendor("A")).unwrap();
        stack.execute(&mut model, &package, vendor("B")).unwrap();
        stack.undo(&mut model).unwrap();
        stack.execute(&mut model, &package, vendor("C")).unwrap();

        assert_eq!(stack.history(), vec![&vendor("A"), &vendor("C")]);
        assert!(matches!(
            stack.redo(&mut model),
            Err(HubError::NothingToRedo { .. })
        ));
    }

    #[test]
    fn test_undo_on_empty_stack() {
        let (mut model, _, mut stack) = setup();
        assert!(matches!(
            stack.undo(&mut model),
            Err(HubError::NothingToUndo { .. })
        ));
    }

    #[test]
    fn test_failed_execute_leaves_history_untouched() {
        let (mut model, package, mut stack) = setup();
        stack.execute(&mut model, &package, vendor("A")).unwrap();
        let before = model.clone();

        let err = stack
            .execute(&mut model, &package, Command::delete("ghost"))
            .unwrap_err();

        assert!(matches!(
            err,
            HubError::CommandExecutionFailed { ref command_kind, .. } if command_kind == "delete"
        ));
        assert_eq!(model, before);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.cursor(), 1);
        assert_eq!(stack.state(), StackState::Idle);
    }

    #[test]
    fn test_panicking_applier_is_rolled_back() {
        let (mut model, _, mut stack) = setup();
        let before = model.clone();

        let err = stack
            .execute_with(&mut model, vendor("boom"), |model, _, journal| {
                let half = FeatureValue::Single(Value::Str("half".to_string()));
                let cpu = model.objects.get_mut("cpu").unwrap();
                let before = cpu.features.insert("vendor".to_string(), half.clone());
                journal.record(Change::Feature {
                    object: "cpu".to_string(),
                    feature: "vendor".to_string(),
                    before,
                    after: Some(half),
                });
                panic!("invariant broken mid-apply");
            })
            .unwrap_err();

        match err {
            HubError::CommandExecutionFailed { cause, .. } => {
                assert!(cause.contains("invariant broken mid-apply"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(model, before);
        assert!(stack.is_empty());
        assert_eq!(stack.state(), StackState::Idle);
    }

    #[test]
    fn test_revoke_last_discards_entry() {
        let (mut model, package, mut stack) = setup();
        let original = model.clone();
        stack.execute(&mut model, &package, vendor("A")).unwrap();

        let revoked = stack.revoke_last(&mut model).unwrap();

        assert_eq!(revoked, vendor("A"));
        assert_eq!(model, original);
        assert!(stack.is_empty());
        assert!(!stack.can_redo());
    }
}
