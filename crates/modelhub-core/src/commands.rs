//! Edit commands against a model
//!
//! A `Command` is an immutable description of one edit. Commands are
//! executed by the command stack through `apply::apply`, which records a
//! reversible journal; a `Compound` executes and reverts as one unit.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{FeatureValue, Value};

/// Edit command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Command {
    /// Set a single-valued feature; `None` unsets it (many-valued: clears)
    Set {
        target: String,
        feature: String,
        #[serde(default)]
        value: Option<Value>,
    },

    /// Insert values into a many-valued feature, at `index` or at the end
    Add {
        target: String,
        feature: String,
        values: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },

    /// Remove the first occurrence of each value from a many-valued feature
    Remove {
        target: String,
        feature: String,
        values: Vec<Value>,
    },

    /// Create a new object inside a containment feature of `parent`
    CreateChild {
        parent: String,
        feature: String,
        child: NewObject,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },

    /// Delete an object with everything it contains and every reference to it
    Delete { target: String },

    /// Ordered sequence executed and undone as one unit
    Compound {
        #[serde(default)]
        label: String,
        commands: Vec<Command>,
    },
}

/// Object created by `CreateChild`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObject {
    pub id: String,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub features: BTreeMap<String, FeatureValue>,
}

impl NewObject {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            features: BTreeMap::new(),
        }
    }

    pub fn with(mut self, feature: impl Into<String>, value: FeatureValue) -> Self {
        self.features.insert(feature.into(), value);
        self
    }
}

/// Stable label of a command variant, used in logs and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Set,
    Add,
    Remove,
    CreateChild,
    Delete,
    Compound,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Set => "set",
            CommandKind::Add => "add",
            CommandKind::Remove => "remove",
            CommandKind::CreateChild => "create-child",
            CommandKind::Delete => "delete",
            CommandKind::Compound => "compound",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Set { .. } => CommandKind::Set,
            Command::Add { .. } => CommandKind::Add,
            Command::Remove { .. } => CommandKind::Remove,
            Command::CreateChild { .. } => CommandKind::CreateChild,
            Command::Delete { .. } => CommandKind::Delete,
            Command::Compound { .. } => CommandKind::Compound,
        }
    }

    pub fn set(target: impl Into<String>, feature: impl Into<String>, value: Value) -> Self {
        Command::Set {
            target: target.into(),
            feature: feature.into(),
            value: Some(value),
        }
    }

    pub fn unset(target: impl Into<String>, feature: impl Into<String>) -> Self {
        Command::Set {
            target: target.into(),
            feature: feature.into(),
            value: None,
        }
    }

    pub fn add(target: impl Into<String>, feature: impl Into<String>, values: Vec<Value>) -> Self {
        Command::Add {
            target: target.into(),
            feature: feature.into(),
            values,
            index: None,
        }
    }

    pub fn remove(
        target: impl Into<String>,
        feature: impl Into<String>,
        values: Vec<Value>,
    ) -> Self {
        Command::Remove {
            target: target.into(),
            feature: feature.into(),
            values,
        }
    }

    pub fn create_child(
        parent: impl Into<String>,
        feature: impl Into<String>,
        child: NewObject,
    ) -> Self {
        Command::CreateChild {
            parent: parent.into(),
            feature: feature.into(),
            child,
            index: None,
        }
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Command::Delete {
            target: target.into(),
        }
    }

    pub fn compound(label: impl Into<String>, commands: Vec<Command>) -> Self {
        Command::Compound {
            label: label.into(),
            commands,
        }
    }

    /// Ids this command refers to as existing objects, in visiting order
    ///
    /// Includes targets, parents and `Ref` values. Ids introduced by a
    /// `CreateChild` are not listed here; see `created_ids`.
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_refs(&mut ids);
        ids
    }

    fn collect_refs<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            Command::Set { target, value, .. } => {
                ids.push(target);
                ids.extend(value.iter().filter_map(Value::as_ref_id));
            }
            Command::Add { target, values, .. } | Command::Remove { target, values, .. } => {
                ids.push(target);
                ids.extend(values.iter().filter_map(Value::as_ref_id));
            }
            Command::CreateChild { parent, child, .. } => {
                ids.push(parent);
                for slot in child.features.values() {
                    ids.extend(slot.values().iter().filter_map(Value::as_ref_id));
                }
            }
            Command::Delete { target } => ids.push(target),
            Command::Compound { commands, .. } => {
                for cmd in commands {
                    cmd.collect_refs(ids);
                }
            }
        }
    }

    /// Ids of objects created by this command, in order
    pub fn created_ids(&self) -> Vec<&str> {
        match self {
            Command::CreateChild { child, .. } => vec![child.id.as_str()],
            Command::Compound { commands, .. } => {
                commands.iter().flat_map(Command::created_ids).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_on_the_wire() {
        let cmd = Command::set("cpu", "vendor", Value::Str("Intel".to_string()));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["kind"], "set");
        assert_eq!(json["target"], "cpu");

        let cmd = Command::create_child("wf", "nodes", NewObject::new("t", "Decision"));
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["kind"], "create-child");
        assert_eq!(json["child"]["type"], "Decision");
    }

    #[test]
    fn test_set_value_defaults_to_unset() {
        let cmd: Command = serde_json::from_value(serde_json::json!({
            "kind": "set",
            "target": "cpu",
            "feature": "vendor"
        }))
        .unwrap();
        assert_eq!(cmd, Command::unset("cpu", "vendor"));
    }

    #[test]
    fn test_referenced_and_created_ids_walk_compounds() {
        let cmd = Command::compound(
            "add task",
            vec![
                Command::create_child(
                    "wf",
                    "nodes",
                    NewObject::new("t-new", "Decision"),
                ),
                Command::create_child(
                    "wf",
                    "flows",
                    NewObject::new("f-new", "Flow")
                        .with("source", FeatureValue::Single(Value::Ref("t-brew".to_string())))
                        .with("target", FeatureValue::Single(Value::Ref("t-new".to_string()))),
                ),
            ],
        );

        assert_eq!(cmd.referenced_ids(), vec!["wf", "wf", "t-brew", "t-new"]);
        assert_eq!(cmd.created_ids(), vec!["t-new", "f-new"]);
        assert_eq!(cmd.kind().as_str(), "compound");
    }
}
