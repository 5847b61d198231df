//! Command codec
//!
//! Decodes wire payloads into executable `Command`s and encodes commands
//! back for clients and audit. Decoding resolves object references against
//! the current state of the target model, so it must run inside the same
//! serialized section as execution on that model.

use std::collections::HashSet;
use std::sync::Arc;

use crate::codecs::CodecRegistry;
use crate::commands::{Command, NewObject};
use crate::errors::{HubError, Result};
use crate::model::{Model, Value};

#[derive(Debug, Clone)]
pub struct CommandCodec {
    codecs: Arc<CodecRegistry>,
}

fn malformed(reason: impl Into<String>) -> HubError {
    HubError::MalformedCommand {
        reason: reason.into(),
    }
}

impl CommandCodec {
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self { codecs }
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Decode a payload into a command for `model`
    ///
    /// # Errors
    ///
    /// - `UnknownFormat` if no codec is registered for `format`
    /// - `MalformedCommand` if the payload does not parse or is structurally
    ///   invalid (empty ids, empty compound, non-finite numbers, ...)
    /// - `UnresolvedReference` if it names an object the model does not
    ///   contain and the command does not create
    pub fn decode(&self, format: &str, raw: &[u8], model: &Model) -> Result<Command> {
        let codec = self.codecs.resolve(format)?;
        let command = codec.decode_command(raw)?;
        check_shape(&command)?;
        check_created_ids(&command)?;
        let mut known = HashSet::new();
        resolve_refs(&command, model, &mut known)?;
        Ok(command)
    }

    /// Encode a command in the preferred format
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` only if the registry has no preferred format.
    pub fn encode(&self, command: &Command) -> Result<Vec<u8>> {
        self.codecs.resolve_or_default(None)?.encode_command(command)
    }

    /// Encode a command in a given format
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` if no codec is registered for `format`.
    pub fn encode_as(&self, format: &str, command: &Command) -> Result<Vec<u8>> {
        self.codecs.resolve(format)?.encode_command(command)
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(malformed(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<()> {
    for value in values {
        match value {
            Value::Float(x) if !x.is_finite() => {
                return Err(malformed(format!("non-finite number {}", x)));
            }
            Value::Ref(id) => require("reference", id)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_shape(command: &Command) -> Result<()> {
    match command {
        Command::Set {
            target,
            feature,
            value,
        } => {
            require("target", target)?;
            require("feature", feature)?;
            check_values(value.iter())
        }
        Command::Add {
            target,
            feature,
            values,
            ..
        }
        | Command::Remove {
            target,
            feature,
            values,
        } => {
            require("target", target)?;
            require("feature", feature)?;
            if values.is_empty() {
                return Err(malformed(format!(
                    "{} command carries no values",
                    command.kind()
                )));
            }
            check_values(values)
        }
        Command::CreateChild {
            parent,
            feature,
            child: NewObject {
                id,
                type_name,
                features,
            },
            ..
        } => {
            require("parent", parent)?;
            require("feature", feature)?;
            require("child id", id)?;
            require("child type", type_name)?;
            for (name, slot) in features {
                require("child feature", name)?;
                check_values(slot.values())?;
            }
            Ok(())
        }
        Command::Delete { target } => require("target", target),
        Command::Compound { commands, .. } => {
            if commands.is_empty() {
                return Err(malformed("compound command is empty"));
            }
            commands.iter().try_for_each(check_shape)
        }
    }
}

fn check_created_ids(command: &Command) -> Result<()> {
    let mut seen = HashSet::new();
    for id in command.created_ids() {
        if !seen.insert(id) {
            return Err(malformed(format!("object {} is created twice", id)));
        }
    }
    Ok(())
}

/// Walk the command in execution order; ids created by earlier steps count
/// as resolvable for later ones
fn resolve_refs<'a>(command: &'a Command, model: &Model, known: &mut HashSet<&'a str>) -> Result<()> {
    let check = |id: &str, known: &HashSet<&'a str>| -> Result<()> {
        if model.contains(id) || known.contains(id) {
            Ok(())
        } else {
            Err(HubError::UnresolvedReference {
                model_id: model.id.clone(),
                object_id: id.to_string(),
            })
        }
    };

    match command {
        Command::Set { target, value, .. } => {
            check(target, known)?;
            for id in value.iter().filter_map(Value::as_ref_id) {
                check(id, known)?;
            }
        }
        Command::Add { target, values, .. } | Command::Remove { target, values, .. } => {
            check(target, known)?;
            for id in values.iter().filter_map(Value::as_ref_id) {
                check(id, known)?;
            }
        }
        Command::CreateChild { parent, child, .. } => {
            check(parent, known)?;
            known.insert(child.id.as_str());
            for slot in child.features.values() {
                for id in slot.values().iter().filter_map(Value::as_ref_id) {
                    check(id, known)?;
                }
            }
        }
        Command::Delete { target } => check(target, known)?,
        Command::Compound { commands, .. } => {
            for child in commands {
                resolve_refs(child, model, known)?;
            }
        }
    }
    Ok(())
}
