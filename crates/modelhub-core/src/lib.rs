//! ModelHub Core - command execution kernel for hosted model documents
//!
//! This crate provides the in-memory half of the model server:
//! - Metamodel packages and the typed model graph
//! - Edit commands with a journaled, all-or-nothing `apply()`
//! - Per-model command stack with undo/redo and failure isolation
//! - Structural and domain validation producing diagnostics
//! - Codec registry and command codec for wire formats
//! - Error and logging facilities shared by the other crates

pub mod apply;
pub mod codecs;
pub mod command_codec;
pub mod command_stack;
pub mod commands;
pub mod errors;
pub mod journal;
pub mod logging_facility;
pub mod metamodel;
pub mod model;
pub mod rules;

// Re-export commonly used types
pub use apply::apply;
pub use codecs::{Codec, CodecRegistry};
pub use command_codec::CommandCodec;
pub use command_stack::{CommandStack, StackState};
pub use commands::{Command, CommandKind, NewObject};
pub use errors::{ExError, ExErrorKind, HubError, Result};
pub use metamodel::{Package, PackageRegistry};
pub use model::{FeatureValue, Model, ModelObject, Value};
pub use rules::{Diagnostic, DomainCheck, ModelValidator, Severity};
