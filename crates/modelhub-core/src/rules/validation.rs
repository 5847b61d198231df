//! Model validation
//!
//! `ModelValidator::validate` is a pure function of the model: it runs the
//! metamodel-level structural checks (types, features, multiplicity,
//! reference resolution, containment) followed by every registered
//! `DomainCheck`, and returns diagnostics instead of failing. Diagnostics
//! follow the containment traversal order; objects unreachable from the
//! root are reported after it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::invariants;
use crate::metamodel::{FeatureDef, Package, PackageRegistry};
use crate::model::{FeatureValue, Model, ModelObject};

/// Diagnostic severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

/// A validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: String::new(),
            message: message.into(),
            object_id: None,
            feature: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Attach the object (and optionally feature) the finding concerns
    pub fn on(mut self, object_id: &str, feature: Option<&str>) -> Self {
        self.object_id = Some(object_id.to_string());
        self.feature = feature.map(str::to_string);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }
}

/// Highest severity in a set of diagnostics; `Ok` when empty
pub fn max_severity(diagnostics: &[Diagnostic]) -> Severity {
    diagnostics
        .iter()
        .map(|d| d.severity)
        .max()
        .unwrap_or(Severity::Ok)
}

/// A domain-specific check run after the structural checks
///
/// Checks must be pure. A panicking check is reported as an error
/// diagnostic and does not stop the others.
pub trait DomainCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, model: &Model) -> Vec<Diagnostic>;
}

/// Validates models against their package and registered domain checks
#[derive(Clone)]
pub struct ModelValidator {
    packages: Arc<PackageRegistry>,
    checks: Vec<Arc<dyn DomainCheck>>,
}

impl ModelValidator {
    pub fn new(packages: Arc<PackageRegistry>) -> Self {
        Self {
            packages,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: impl DomainCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Validate a model
    pub fn validate(&self, model: &Model) -> Vec<Diagnostic> {
        let mut diagnostics = match self.packages.get(&model.package) {
            Ok(package) => check_structure(model, &package),
            Err(err) => vec![Diagnostic::error(err.to_string()).with_code("structure.unknown-package")],
        };

        for check in &self.checks {
            match catch_unwind(AssertUnwindSafe(|| check.check(model))) {
                Ok(found) => diagnostics.extend(found),
                Err(_) => {
                    tracing::warn!(check = check.name(), model_id = model.id.as_str(), "domain check panicked");
                    diagnostics.push(
                        Diagnostic::error(format!("check {} panicked", check.name()))
                            .with_code("check.panicked"),
                    );
                }
            }
        }

        diagnostics
    }
}

impl std::fmt::Debug for ModelValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelValidator")
            .field("checks", &self.check_names())
            .finish()
    }
}

/// Metamodel-level checks of a model against its package
///
/// Used by the validator and by the repository when loading a model.
pub fn check_structure(model: &Model, package: &Package) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if !invariants::root_exists(model) {
        diagnostics.push(
            Diagnostic::error(format!("root object {} does not exist", model.root))
                .with_code("structure.missing-root"),
        );
        return diagnostics;
    }

    for obj in model.traverse() {
        check_object(model, package, obj, &mut diagnostics);
    }

    for (object_id, reason) in invariants::find_broken_containment(model) {
        diagnostics.push(
            Diagnostic::error(reason)
                .on(&object_id, None)
                .with_code("structure.containment"),
        );
    }

    for object_id in invariants::find_unreachable(model) {
        diagnostics.push(
            Diagnostic::error(format!("object {} is not reachable from the root", object_id))
                .on(&object_id, None)
                .with_code("structure.unreachable"),
        );
    }

    diagnostics
}

fn check_object(model: &Model, package: &Package, obj: &ModelObject, out: &mut Vec<Diagnostic>) {
    let class = match package.class(&obj.type_name) {
        Ok(class) => class,
        Err(err) => {
            out.push(
                Diagnostic::error(err.to_string())
                    .on(&obj.id, None)
                    .with_code("structure.unknown-type"),
            );
            return;
        }
    };
    if class.is_abstract {
        out.push(
            Diagnostic::error(format!("{} is abstract", obj.type_name))
                .on(&obj.id, None)
                .with_code("structure.abstract-type"),
        );
    }

    for (name, slot) in &obj.features {
        let def = match package.feature(&obj.type_name, name) {
            Ok(def) => def,
            Err(err) => {
                out.push(
                    Diagnostic::error(err.to_string())
                        .on(&obj.id, Some(name))
                        .with_code("structure.unknown-feature"),
                );
                continue;
            }
        };

        if matches!(slot, FeatureValue::Many(_)) != def.many() {
            out.push(
                Diagnostic::error(format!(
                    "feature {} expects {}",
                    name,
                    if def.many() { "a list" } else { "a single value" }
                ))
                .on(&obj.id, Some(name))
                .with_code("structure.multiplicity"),
            );
        }

        for value in slot.values() {
            match (&def, value.as_ref_id()) {
                (FeatureDef::Attribute(attr), _) => {
                    if !attr.kind.accepts(value) {
                        out.push(
                            Diagnostic::error(format!(
                                "feature {} expects {}, found {}",
                                name,
                                attr.kind.name(),
                                value.kind_name()
                            ))
                            .on(&obj.id, Some(name))
                            .with_code("structure.type"),
                        );
                    }
                }
                (FeatureDef::Reference(_), None) => out.push(
                    Diagnostic::error(format!(
                        "feature {} expects {}, found {}",
                        name,
                        def.type_label(),
                        value.kind_name()
                    ))
                    .on(&obj.id, Some(name))
                    .with_code("structure.type"),
                ),
                (FeatureDef::Reference(reference), Some(target_id)) => {
                    match model.objects.get(target_id) {
                        None => out.push(
                            Diagnostic::error(format!("unresolved reference to {}", target_id))
                                .on(&obj.id, Some(name))
                                .with_code("structure.unresolved-reference"),
                        ),
                        Some(target) if !package.conforms(&target.type_name, &reference.target) => {
                            out.push(
                                Diagnostic::error(format!(
                                    "{} is a {}, expected {}",
                                    target_id, target.type_name, reference.target
                                ))
                                .on(&obj.id, Some(name))
                                .with_code("structure.type"),
                            )
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    for (name, def) in package.features(&obj.type_name) {
        let present = obj
            .get(name)
            .is_some_and(|slot| !slot.values().is_empty());
        if def.required() && !present {
            out.push(
                Diagnostic::error(format!("required feature {} is not set", name))
                    .on(&obj.id, Some(name))
                    .with_code("structure.required"),
            );
        }
    }
}
