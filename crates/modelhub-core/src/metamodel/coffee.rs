//! Sample "coffee machine" package
//!
//! Machines contain components and brewing workflows; workflows contain
//! task nodes connected by flows. Used by the CLI and throughout tests.

use std::collections::BTreeMap;

use super::{AttributeDef, ClassDef, Package, ReferenceDef, ValueKind};
use crate::model::{Container, FeatureValue, Model, ModelObject, Value};
use crate::rules::validation::{Diagnostic, DomainCheck};

pub const NS_URI: &str = "http://www.eclipsesource.com/modelserver/example/coffeemodel";

pub fn package() -> Package {
    Package::new(NS_URI)
        .with_class(
            ClassDef::new("Machine")
                .attribute("name", AttributeDef::single(ValueKind::Str).required())
                .reference("children", ReferenceDef::many("Component").containment())
                .reference("workflows", ReferenceDef::many("Workflow").containment()),
        )
        .with_class(
            ClassDef::new("Component")
                .abstract_class()
                .reference("children", ReferenceDef::many("Component").containment()),
        )
        .with_class(
            ClassDef::new("ControlUnit")
                .extends("Component")
                .attribute("userDescription", AttributeDef::single(ValueKind::Str))
                .reference("processor", ReferenceDef::single("Processor").containment().required()),
        )
        .with_class(ClassDef::new("BrewingUnit").extends("Component"))
        .with_class(ClassDef::new("WaterTank").extends("Component"))
        .with_class(
            ClassDef::new("Processor")
                .attribute("vendor", AttributeDef::single(ValueKind::Str))
                .attribute("clockSpeed", AttributeDef::single(ValueKind::Int))
                .attribute("numberOfCores", AttributeDef::single(ValueKind::Int))
                .attribute("thermalDesignPower", AttributeDef::single(ValueKind::Float)),
        )
        .with_class(
            ClassDef::new("Workflow")
                .attribute("name", AttributeDef::single(ValueKind::Str).required())
                .reference("nodes", ReferenceDef::many("Node").containment())
                .reference("flows", ReferenceDef::many("Flow").containment()),
        )
        .with_class(ClassDef::new("Node").abstract_class())
        .with_class(
            ClassDef::new("Task")
                .extends("Node")
                .abstract_class()
                .attribute("name", AttributeDef::single(ValueKind::Str).required())
                .attribute("duration", AttributeDef::single(ValueKind::Int)),
        )
        .with_class(
            ClassDef::new("AutomaticTask")
                .extends("Task")
                .attribute("component", AttributeDef::single(ValueKind::Str)),
        )
        .with_class(
            ClassDef::new("ManualTask")
                .extends("Task")
                .attribute("actor", AttributeDef::single(ValueKind::Str)),
        )
        .with_class(ClassDef::new("Decision").extends("Node"))
        .with_class(ClassDef::new("Merge").extends("Node"))
        .with_class(
            ClassDef::new("Flow")
                .reference("source", ReferenceDef::single("Node").required())
                .reference("target", ReferenceDef::single("Node").required()),
        )
        .with_class(
            ClassDef::new("WeightedFlow")
                .extends("Flow")
                .attribute("probability", AttributeDef::single(ValueKind::Float)),
        )
        .with_class(
            ClassDef::new("Tag").attribute("labels", AttributeDef::many(ValueKind::Str)),
        )
}

fn object(
    id: &str,
    type_name: &str,
    container: Option<(&str, &str)>,
    features: Vec<(&str, FeatureValue)>,
) -> ModelObject {
    ModelObject {
        id: id.to_string(),
        type_name: type_name.to_string(),
        container: container.map(|(object, feature)| Container {
            object: object.to_string(),
            feature: feature.to_string(),
        }),
        features: features
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn str_value(s: &str) -> FeatureValue {
    FeatureValue::Single(Value::Str(s.to_string()))
}

fn refs(ids: &[&str]) -> FeatureValue {
    FeatureValue::Many(ids.iter().map(|id| Value::Ref(id.to_string())).collect())
}

/// A small, structurally valid coffee machine model
///
/// Object ids: `machine`, `control`, `cpu`, `brewer`, `wf`, `t-grind`,
/// `t-brew`, `flow-1`.
pub fn sample_model(model_id: &str) -> Model {
    let objects = vec![
        object(
            "machine",
            "Machine",
            None,
            vec![
                ("name", str_value("Super Brewer 3000")),
                ("children", refs(&["control", "brewer"])),
                ("workflows", refs(&["wf"])),
            ],
        ),
        object(
            "control",
            "ControlUnit",
            Some(("machine", "children")),
            vec![("processor", FeatureValue::Single(Value::Ref("cpu".to_string())))],
        ),
        object(
            "cpu",
            "Processor",
            Some(("control", "processor")),
            vec![
                ("vendor", str_value("Acme")),
                ("clockSpeed", FeatureValue::Single(Value::Int(5))),
                ("numberOfCores", FeatureValue::Single(Value::Int(2))),
            ],
        ),
        object("brewer", "BrewingUnit", Some(("machine", "children")), vec![]),
        object(
            "wf",
            "Workflow",
            Some(("machine", "workflows")),
            vec![
                ("name", str_value("Simple")),
                ("nodes", refs(&["t-grind", "t-brew"])),
                ("flows", refs(&["flow-1"])),
            ],
        ),
        object(
            "t-grind",
            "AutomaticTask",
            Some(("wf", "nodes")),
            vec![
                ("name", str_value("Grind")),
                ("duration", FeatureValue::Single(Value::Int(10))),
            ],
        ),
        object(
            "t-brew",
            "ManualTask",
            Some(("wf", "nodes")),
            vec![
                ("name", str_value("Brew")),
                ("duration", FeatureValue::Single(Value::Int(30))),
            ],
        ),
        object(
            "flow-1",
            "Flow",
            Some(("wf", "flows")),
            vec![
                ("source", FeatureValue::Single(Value::Ref("t-grind".to_string()))),
                ("target", FeatureValue::Single(Value::Ref("t-brew".to_string()))),
            ],
        ),
    ];

    Model {
        id: model_id.to_string(),
        package: NS_URI.to_string(),
        root: "machine".to_string(),
        objects: objects.into_iter().map(|o| (o.id.clone(), o)).collect(),
    }
}

/// Warns about tasks with a negative duration
pub struct TaskDurationCheck;

impl DomainCheck for TaskDurationCheck {
    fn name(&self) -> &str {
        "coffee.task-duration"
    }

    fn check(&self, model: &Model) -> Vec<Diagnostic> {
        model
            .traverse()
            .into_iter()
            .filter_map(|obj| match obj.features.get("duration") {
                Some(FeatureValue::Single(Value::Int(d))) if *d < 0 => Some(
                    Diagnostic::warning(format!("task {} has negative duration {}", obj.id, d))
                        .on(&obj.id, Some("duration"))
                        .with_code("coffee.negative-duration"),
                ),
                _ => None,
            })
            .collect()
    }
}
