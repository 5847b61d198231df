use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Value;

/// Contents of one feature slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Many(Vec<Value>),
    Single(Value),
}

impl FeatureValue {
    /// Values held by the slot, in order
    pub fn values(&self) -> &[Value] {
        match self {
            FeatureValue::Many(values) => values,
            FeatureValue::Single(value) => std::slice::from_ref(value),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values().contains(value)
    }
}

/// Where an object is contained: the owning object and its containment feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub object: String,
    pub feature: String,
}

/// One node of a model graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,

    #[serde(rename = "type")]
    pub type_name: String,

    /// None only for the model root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,

    #[serde(default)]
    pub features: BTreeMap<String, FeatureValue>,
}

impl ModelObject {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            container: None,
            features: BTreeMap::new(),
        }
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureValue> {
        self.features.get(feature)
    }

    /// Every (feature, target id) reference held by this object
    pub fn outgoing_refs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.features.iter().flat_map(|(name, slot)| {
            slot.values()
                .iter()
                .filter_map(move |v| v.as_ref_id().map(|id| (name.as_str(), id)))
        })
    }

    /// Ids of objects contained by this object, in feature then list order
    ///
    /// A reference counts as containment when the target's container points
    /// back at this object and feature.
    pub fn contained_ids<'a>(&'a self, model: &'a super::Model) -> Vec<&'a str> {
        self.outgoing_refs()
            .filter(|(feature, target)| {
                model.objects.get(*target).is_some_and(|child| {
                    child
                        .container
                        .as_ref()
                        .is_some_and(|c| c.object == self.id && c.feature == *feature)
                })
            })
            .map(|(_, target)| target)
            .collect()
    }
}
