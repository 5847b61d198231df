//! Journaled apply function
//!
//! `apply()` is the single entry point that mutates a model. Each primitive
//! mutation is recorded in the caller's `Journal` so the command stack can
//! undo and redo it later.
//!
//! ## Atomicity Contract
//!
//! - **All-or-nothing**: on error every change this call recorded is
//!   reverted and removed from the journal before returning
//! - **No panics**: invalid commands return typed errors
//! - **Checked against the package**: features, value types, multiplicity
//!   and containment are enforced before each mutation
//!
//! ## Example
//!
//! ```
//! use modelhub_core::apply::apply;
//! use modelhub_core::journal::Journal;
//! use modelhub_core::metamodel::coffee;
//! use modelhub_core::model::Value;
//! use modelhub_core::Command;
//!
//! let package = coffee::package();
//! let mut model = coffee::sample_model("coffee.json");
//! let mut journal = Journal::new();
//!
//! let cmd = Command::set("cpu", "vendor", Value::Str("Intel".to_string()));
//! apply(&mut model, &package, &cmd, &mut journal).unwrap();
//! assert_eq!(journal.len(), 1);
//! ```

use std::collections::HashSet;

use crate::commands::{Command, NewObject};
use crate::errors::{HubError, Result};
use crate::journal::{Change, Journal};
use crate::metamodel::{FeatureDef, Package};
use crate::model::{Container, FeatureValue, Model, ModelObject, Value};

/// Apply a command to a model, recording its changes
///
/// # Errors
///
/// Returns the apply-level fault (`ObjectNotFound`, `UnknownFeature`,
/// `TypeMismatch`, `MultiplicityViolation`, ...) of the first step that
/// cannot be performed. The model is left exactly as it was on entry.
pub fn apply(
    model: &mut Model,
    package: &Package,
    cmd: &Command,
    journal: &mut Journal,
) -> Result<()> {
    let mark = journal.len();
    let result = apply_step(model, package, cmd, journal);
    if result.is_err() {
        journal.rollback_to(mark, model);
    }
    result
}

fn apply_step(
    model: &mut Model,
    package: &Package,
    cmd: &Command,
    journal: &mut Journal,
) -> Result<()> {
    match cmd {
        Command::Set {
            target,
            feature,
            value,
        } => apply_set(model, package, journal, target, feature, value.as_ref()),
        Command::Add {
            target,
            feature,
            values,
            index,
        } => apply_add(model, package, journal, target, feature, values, *index),
        Command::Remove {
            target,
            feature,
            values,
        } => apply_remove(model, package, journal, target, feature, values),
        Command::CreateChild {
            parent,
            feature,
            child,
            index,
        } => apply_create_child(model, package, journal, parent, feature, child, *index),
        Command::Delete { target } => apply_delete(model, journal, target),
        Command::Compound { commands, .. } => {
            for child in commands {
                apply_step(model, package, child, journal)?;
            }
            Ok(())
        }
    }
}

/// Resolve a feature on an existing object
fn feature_def<'p>(
    model: &Model,
    package: &'p Package,
    object_id: &str,
    feature: &str,
) -> Result<FeatureDef<'p>> {
    let obj = model.object(object_id)?;
    package.feature(&obj.type_name, feature)
}

fn slot_values(model: &Model, object_id: &str, feature: &str) -> Result<Vec<Value>> {
    Ok(model
        .object(object_id)?
        .get(feature)
        .map(|slot| slot.values().to_vec())
        .unwrap_or_default())
}

/// Write a slot and journal its previous contents
fn write_slot(
    model: &mut Model,
    journal: &mut Journal,
    object_id: &str,
    feature: &str,
    after: Option<FeatureValue>,
) -> Result<()> {
    let obj = model.object_mut(object_id)?;
    let before = match &after {
        Some(v) => obj.features.insert(feature.to_string(), v.clone()),
        None => obj.features.remove(feature),
    };
    journal.record(Change::Feature {
        object: object_id.to_string(),
        feature: feature.to_string(),
        before,
        after,
    });
    Ok(())
}

fn many_slot(values: Vec<Value>) -> Option<FeatureValue> {
    if values.is_empty() {
        None
    } else {
        Some(FeatureValue::Many(values))
    }
}

/// Check a value against a feature declaration
fn check_value(
    model: &Model,
    package: &Package,
    feature: &str,
    def: &FeatureDef<'_>,
    value: &Value,
) -> Result<()> {
    match def {
        FeatureDef::Attribute(attr) => {
            if attr.kind.accepts(value) {
                Ok(())
            } else {
                Err(HubError::TypeMismatch {
                    feature: feature.to_string(),
                    expected: attr.kind.name().to_string(),
                    found: value.kind_name().to_string(),
                })
            }
        }
        FeatureDef::Reference(reference) => {
            let Some(target_id) = value.as_ref_id() else {
                return Err(HubError::TypeMismatch {
                    feature: feature.to_string(),
                    expected: def.type_label(),
                    found: value.kind_name().to_string(),
                });
            };
            let target = model.object(target_id)?;
            if package.conforms(&target.type_name, &reference.target) {
                Ok(())
            } else {
                Err(HubError::TypeMismatch {
                    feature: feature.to_string(),
                    expected: reference.target.clone(),
                    found: target.type_name.clone(),
                })
            }
        }
    }
}

fn reject_containment(feature: &str, def: &FeatureDef<'_>) -> Result<()> {
    if def.is_containment() {
        return Err(HubError::ContainmentViolation {
            feature: feature.to_string(),
            reason: "containment features change only through create-child and delete"
                .to_string(),
        });
    }
    Ok(())
}

fn apply_set(
    model: &mut Model,
    package: &Package,
    journal: &mut Journal,
    target: &str,
    feature: &str,
    value: Option<&Value>,
) -> Result<()> {
    let def = feature_def(model, package, target, feature)?;
    reject_containment(feature, &def)?;

    if def.many() {
        if value.is_some() {
            return Err(HubError::MultiplicityViolation {
                feature: feature.to_string(),
                reason: "many-valued feature takes add/remove; set only clears it".to_string(),
            });
        }
        return write_slot(model, journal, target, feature, None);
    }

    match value {
        Some(v) => {
            check_value(model, package, feature, &def, v)?;
            write_slot(
                model,
                journal,
                target,
                feature,
                Some(FeatureValue::Single(v.clone())),
            )
        }
        None => write_slot(model, journal, target, feature, None),
    }
}

fn apply_add(
    model: &mut Model,
    package: &Package,
    journal: &mut Journal,
    target: &str,
    feature: &str,
    values: &[Value],
    index: Option<usize>,
) -> Result<()> {
    let def = feature_def(model, package, target, feature)?;
    reject_containment(feature, &def)?;
    if !def.many() {
        return Err(HubError::MultiplicityViolation {
            feature: feature.to_string(),
            reason: "single-valued feature takes set".to_string(),
        });
    }

    let mut current = slot_values(model, target, feature)?;
    let at = index.unwrap_or(current.len());
    if at > current.len() {
        return Err(HubError::IndexOutOfBounds {
            feature: feature.to_string(),
            index: at,
            len: current.len(),
        });
    }

    for (i, value) in values.iter().enumerate() {
        check_value(model, package, feature, &def, value)?;
        if matches!(def, FeatureDef::Reference(_))
            && (current.contains(value) || values[..i].contains(value))
        {
            return Err(HubError::MultiplicityViolation {
                feature: feature.to_string(),
                reason: format!("reference {} already present", value),
            });
        }
    }

    current.splice(at..at, values.iter().cloned());
    write_slot(model, journal, target, feature, many_slot(current))
}

fn apply_remove(
    model: &mut Model,
    package: &Package,
    journal: &mut Journal,
    target: &str,
    feature: &str,
    values: &[Value],
) -> Result<()> {
    let def = feature_def(model, package, target, feature)?;
    reject_containment(feature, &def)?;
    if !def.many() {
        return Err(HubError::MultiplicityViolation {
            feature: feature.to_string(),
            reason: "single-valued feature takes set".to_string(),
        });
    }

    let mut current = slot_values(model, target, feature)?;
    for value in values {
        let Some(pos) = current.iter().position(|v| v == value) else {
            return Err(HubError::ValueNotPresent {
                object_id: target.to_string(),
                feature: feature.to_string(),
                value: value.to_string(),
            });
        };
        current.remove(pos);
    }

    write_slot(model, journal, target, feature, many_slot(current))
}

fn apply_create_child(
    model: &mut Model,
    package: &Package,
    journal: &mut Journal,
    parent: &str,
    feature: &str,
    child: &NewObject,
    index: Option<usize>,
) -> Result<()> {
    let def = feature_def(model, package, parent, feature)?;
    let FeatureDef::Reference(reference) = def else {
        return Err(HubError::ContainmentViolation {
            feature: feature.to_string(),
            reason: "not a containment reference".to_string(),
        });
    };
    if !reference.containment {
        return Err(HubError::ContainmentViolation {
            feature: feature.to_string(),
            reason: "not a containment reference".to_string(),
        });
    }

    if model.contains(&child.id) {
        return Err(HubError::DuplicateObject {
            object_id: child.id.clone(),
        });
    }

    let class = package.class(&child.type_name)?;
    if class.is_abstract || !package.conforms(&child.type_name, &reference.target) {
        return Err(HubError::TypeMismatch {
            feature: feature.to_string(),
            expected: reference.target.clone(),
            found: if class.is_abstract {
                format!("abstract {}", child.type_name)
            } else {
                child.type_name.clone()
            },
        });
    }

    let mut siblings = slot_values(model, parent, feature)?;
    if !reference.many {
        if let Some(existing) = siblings.first() {
            return Err(HubError::MultiplicityViolation {
                feature: feature.to_string(),
                reason: format!("single-valued containment already holds {}", existing),
            });
        }
    }
    let at = index.unwrap_or(siblings.len());
    if at > siblings.len() {
        return Err(HubError::IndexOutOfBounds {
            feature: feature.to_string(),
            index: at,
            len: siblings.len(),
        });
    }

    // Attach first so the child's own features may reference it
    let mut object = ModelObject::new(child.id.clone(), child.type_name.clone());
    object.container = Some(Container {
        object: parent.to_string(),
        feature: feature.to_string(),
    });
    model.objects.insert(object.id.clone(), object.clone());
    journal.record(Change::Attached { object });

    for (name, slot) in &child.features {
        let child_def = package.feature(&child.type_name, name)?;
        reject_containment(name, &child_def)?;
        let shape_ok = match slot {
            FeatureValue::Many(_) => child_def.many(),
            FeatureValue::Single(_) => !child_def.many(),
        };
        if !shape_ok {
            return Err(HubError::MultiplicityViolation {
                feature: name.clone(),
                reason: if child_def.many() {
                    "expected a list of values".to_string()
                } else {
                    "expected a single value".to_string()
                },
            });
        }
        for value in slot.values() {
            check_value(model, package, name, &child_def, value)?;
        }
        write_slot(model, journal, &child.id, name, Some(slot.clone()))?;
    }

    siblings.insert(at, Value::Ref(child.id.clone()));
    let slot = if reference.many {
        FeatureValue::Many(siblings)
    } else {
        FeatureValue::Single(Value::Ref(child.id.clone()))
    };
    write_slot(model, journal, parent, feature, Some(slot))
}

fn apply_delete(model: &mut Model, journal: &mut Journal, target: &str) -> Result<()> {
    if target == model.root {
        return Err(HubError::RootDeletion {
            object_id: target.to_string(),
        });
    }
    model.object(target)?;

    let subtree = model.subtree_ids(target);
    let doomed: HashSet<&str> = subtree.iter().map(String::as_str).collect();

    // Every reference into the subtree from outside it, including the
    // container's containment slot
    let mut rewrites = Vec::new();
    for obj in model.objects.values() {
        if doomed.contains(obj.id.as_str()) {
            continue;
        }
        for (feature, slot) in &obj.features {
            let hits = slot
                .values()
                .iter()
                .any(|v| v.as_ref_id().is_some_and(|id| doomed.contains(id)));
            if !hits {
                continue;
            }
            let after = match slot {
                FeatureValue::Single(_) => None,
                FeatureValue::Many(values) => many_slot(
                    values
                        .iter()
                        .filter(|v| !v.as_ref_id().is_some_and(|id| doomed.contains(id)))
                        .cloned()
                        .collect(),
                ),
            };
            rewrites.push((obj.id.clone(), feature.clone(), after));
        }
    }

    for (object_id, feature, after) in rewrites {
        write_slot(model, journal, &object_id, &feature, after)?;
    }

    for id in &subtree {
        if let Some(object) = model.objects.remove(id) {
            journal.record(Change::Detached { object });
        }
    }

    Ok(())
}
