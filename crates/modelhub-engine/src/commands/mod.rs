//! Command orchestration layer.
//!
//! Transport-neutral requests dispatched onto the model controller.

pub mod engine_command;

pub use engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
