use std::collections::HashSet;

use crate::model::{Model, Value};

/// Find references whose target object does not exist
///
/// Returns list of (object_id, feature, target_id) tuples
pub fn find_dangling_refs(model: &Model) -> Vec<(String, String, String)> {
    let mut dangling = Vec::new();

    for obj in model.objects.values() {
        for (feature, target) in obj.outgoing_refs() {
            if !model.contains(target) {
                dangling.push((obj.id.clone(), feature.to_string(), target.to_string()));
            }
        }
    }

    dangling
}

/// Find objects whose container link disagrees with the container's slot
///
/// An object naming a container must appear as a `Ref` in that container's
/// feature. Returns list of (object_id, reason) tuples.
pub fn find_broken_containment(model: &Model) -> Vec<(String, String)> {
    let mut broken = Vec::new();

    for obj in model.objects.values() {
        let Some(container) = &obj.container else {
            if obj.id != model.root {
                broken.push((obj.id.clone(), "object has no container".to_string()));
            }
            continue;
        };

        if obj.id == model.root {
            broken.push((obj.id.clone(), "root object must not be contained".to_string()));
            continue;
        }

        match model.objects.get(&container.object) {
            None => broken.push((
                obj.id.clone(),
                format!("container {} does not exist", container.object),
            )),
            Some(owner) => {
                let listed = owner
                    .get(&container.feature)
                    .is_some_and(|slot| slot.contains(&Value::Ref(obj.id.clone())));
                if !listed {
                    broken.push((
                        obj.id.clone(),
                        format!(
                            "container {}.{} does not list this object",
                            container.object, container.feature
                        ),
                    ));
                }
            }
        }
    }

    broken
}

/// Find objects that cannot be reached from the root through containment
pub fn find_unreachable(model: &Model) -> Vec<String> {
    let reached: HashSet<&str> = model.traverse().iter().map(|o| o.id.as_str()).collect();

    model
        .objects
        .keys()
        .filter(|id| !reached.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Check if the root id names an existing object
pub fn root_exists(model: &Model) -> bool {
    model.contains(&model.root)
}
