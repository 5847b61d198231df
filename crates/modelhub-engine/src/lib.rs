//! ModelHub Engine - Orchestration layer
//!
//! Serializes work per model and ties the core kernel to storage and to
//! live sessions:
//! - `ServerConfig` loaded from TOML
//! - `SessionController`: subscriptions and bounded notification fan-out
//! - `ModelController`: execute/undo/redo/validate/persist/notify under the
//!   per-model lock
//! - `EngineCommand`: transport-neutral requests onto the controller

pub mod commands;
pub mod config;
pub mod controller;
pub mod notification;
pub mod session;

pub use commands::{apply_engine_command, EngineCommand, EngineCommandResult};
pub use config::{AutosavePolicy, OverflowPolicy, ServerConfig, StorageBackend, ValidationPolicy};
pub use controller::{ControllerPolicy, ModelController};
pub use notification::{CommandResult, MutationKind, Notification, NotificationPayload, Persisted};
pub use session::{DeliveryReport, SessionController};
