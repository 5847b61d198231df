//! Reversible change journal
//!
//! Every mutation performed by `apply` is recorded as a `Change` holding
//! enough state to revert and replay it. Undo reverts a command's journal
//! in reverse order; redo replays it forward.

use crate::model::{FeatureValue, Model, ModelObject};

/// One primitive mutation of a model
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A feature slot changed; `None` means the slot was absent
    Feature {
        object: String,
        feature: String,
        before: Option<FeatureValue>,
        after: Option<FeatureValue>,
    },

    /// An object was inserted into the object table
    Attached { object: ModelObject },

    /// An object was removed from the object table
    Detached { object: ModelObject },
}

impl Change {
    fn revert(&self, model: &mut Model) {
        match self {
            Change::Feature {
                object,
                feature,
                before,
                ..
            } => write_slot(model, object, feature, before.clone()),
            Change::Attached { object } => {
                model.objects.remove(&object.id);
            }
            Change::Detached { object } => {
                model.objects.insert(object.id.clone(), object.clone());
            }
        }
    }

    fn replay(&self, model: &mut Model) {
        match self {
            Change::Feature {
                object,
                feature,
                after,
                ..
            } => write_slot(model, object, feature, after.clone()),
            Change::Attached { object } => {
                model.objects.insert(object.id.clone(), object.clone());
            }
            Change::Detached { object } => {
                model.objects.remove(&object.id);
            }
        }
    }
}

fn write_slot(model: &mut Model, object: &str, feature: &str, value: Option<FeatureValue>) {
    if let Some(obj) = model.objects.get_mut(object) {
        match value {
            Some(v) => {
                obj.features.insert(feature.to_string(), v);
            }
            None => {
                obj.features.remove(feature);
            }
        }
    }
}

/// Ordered record of the changes made by one command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    changes: Vec<Change>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Undo every recorded change, newest first
    pub fn revert(&self, model: &mut Model) {
        for change in self.changes.iter().rev() {
            change.revert(model);
        }
    }

    /// Revert and discard every change recorded after `mark`
    pub fn rollback_to(&mut self, mark: usize, model: &mut Model) {
        while self.changes.len() > mark {
            if let Some(change) = self.changes.pop() {
                change.revert(model);
            }
        }
    }

    /// Re-apply every recorded change in original order
    pub fn replay(&self, model: &mut Model) {
        for change in &self.changes {
            change.replay(model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::coffee;
    use crate::model::Value;

    #[test]
    fn test_revert_then_replay_restores_both_states() {
        let before = coffee::sample_model("coffee.json");
        let mut model = before.clone();
        let mut journal = Journal::new();

        let old = model.objects["cpu"].features.get("vendor").cloned();
        let new = Some(FeatureValue::Single(Value::Str("Intel".to_string())));
        write_slot(&mut model, "cpu", "vendor", new.clone());
        journal.record(Change::Feature {
            object: "cpu".to_string(),
            feature: "vendor".to_string(),
            before: old,
            after: new,
        });

        let detached = model.objects.remove("brewer").unwrap();
        journal.record(Change::Detached { object: detached });

        let after = model.clone();

        journal.revert(&mut model);
        assert_eq!(model, before);

        journal.replay(&mut model);
        assert_eq!(model, after);
    }
}
