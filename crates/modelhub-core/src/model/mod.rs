//! In-memory model graph
//!
//! A `Model` is a set of typed objects keyed by id, rooted at one object
//! and conforming to one metamodel package. Containment is recorded on
//! both sides: the container's feature holds a `Ref` to the child and the
//! child's `container` points back. Ordered maps keep state equality and
//! traversal order deterministic.

pub mod object;
pub mod value;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::{HubError, Result};

pub use object::{Container, FeatureValue, ModelObject};
pub use value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Logical path identifying the model; not part of the stored document
    #[serde(skip)]
    pub id: String,

    /// Namespace URI of the package the objects conform to
    pub package: String,

    /// Id of the root object
    pub root: String,

    pub objects: BTreeMap<String, ModelObject>,
}

impl Model {
    /// Create a model holding only its root object
    pub fn new(id: impl Into<String>, package: impl Into<String>, root: ModelObject) -> Self {
        let root_id = root.id.clone();
        let mut objects = BTreeMap::new();
        objects.insert(root_id.clone(), root);
        Self {
            id: id.into(),
            package: package.into(),
            root: root_id,
            objects,
        }
    }

    /// Get an object by id
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the model has no such object.
    pub fn object(&self, id: &str) -> Result<&ModelObject> {
        self.objects.get(id).ok_or_else(|| HubError::ObjectNotFound {
            object_id: id.to_string(),
        })
    }

    /// Get a mutable object by id
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the model has no such object.
    pub fn object_mut(&mut self, id: &str) -> Result<&mut ModelObject> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| HubError::ObjectNotFound {
                object_id: id.to_string(),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects reachable from the root through containment, depth-first
    pub fn traverse(&self) -> Vec<&ModelObject> {
        let mut order = Vec::with_capacity(self.objects.len());
        let mut seen = HashSet::new();
        let mut stack = vec![self.root.as_str()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(obj) = self.objects.get(id) else {
                continue;
            };
            order.push(obj);
            // Reverse so children pop in declaration order
            for child in obj.contained_ids(self).into_iter().rev() {
                stack.push(child);
            }
        }

        order
    }

    /// Id of `id` and every object it transitively contains
    pub fn subtree_ids(&self, id: &str) -> Vec<String> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];

        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(obj) = self.objects.get(&next) {
                for child in obj.contained_ids(self).into_iter().rev() {
                    stack.push(child.to_string());
                }
            }
            ids.push(next);
        }

        ids
    }

    /// Objects holding a reference to `target`, as (object id, feature)
    pub fn incoming_refs(&self, target: &str) -> Vec<(String, String)> {
        self.objects
            .values()
            .flat_map(|obj| {
                obj.outgoing_refs()
                    .filter(|(_, t)| *t == target)
                    .map(|(feature, _)| (obj.id.clone(), feature.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
