//! Metamodel: packages of typed classes that model objects conform to
//!
//! A `Package` is identified by its namespace URI and declares classes with
//! attributes and references. Packages are registered once in a
//! `PackageRegistry` that is shared (behind `Arc`) by the command codec,
//! the command stack and the validator.

pub mod coffee;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{HubError, Result};
use crate::model::Value;

/// Primitive type of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
        }
    }

    /// Whether `value` is an instance of this kind
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueKind::Bool, Value::Bool(_))
                | (ValueKind::Int, Value::Int(_))
                | (ValueKind::Float, Value::Float(_))
                | (ValueKind::Str, Value::Str(_))
        )
    }
}

/// Attribute declaration
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub kind: ValueKind,
    pub many: bool,
    pub required: bool,
}

impl AttributeDef {
    pub fn single(kind: ValueKind) -> Self {
        Self {
            kind,
            many: false,
            required: false,
        }
    }

    pub fn many(kind: ValueKind) -> Self {
        Self {
            kind,
            many: true,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Reference declaration
///
/// Containment references own their targets: an object lives in exactly
/// one containment feature of its container.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDef {
    pub target: String,
    pub many: bool,
    pub required: bool,
    pub containment: bool,
}

impl ReferenceDef {
    pub fn single(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            many: false,
            required: false,
            containment: false,
        }
    }

    pub fn many(target: impl Into<String>) -> Self {
        Self {
            many: true,
            ..Self::single(target)
        }
    }

    pub fn containment(mut self) -> Self {
        self.containment = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A feature resolved on a class (declared or inherited)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureDef<'a> {
    Attribute(&'a AttributeDef),
    Reference(&'a ReferenceDef),
}

impl FeatureDef<'_> {
    pub fn many(&self) -> bool {
        match self {
            FeatureDef::Attribute(a) => a.many,
            FeatureDef::Reference(r) => r.many,
        }
    }

    pub fn required(&self) -> bool {
        match self {
            FeatureDef::Attribute(a) => a.required,
            FeatureDef::Reference(r) => r.required,
        }
    }

    pub fn is_containment(&self) -> bool {
        matches!(self, FeatureDef::Reference(r) if r.containment)
    }

    /// Human-readable type name used in diagnostics
    pub fn type_label(&self) -> String {
        match self {
            FeatureDef::Attribute(a) => a.kind.name().to_string(),
            FeatureDef::Reference(r) => format!("ref<{}>", r.target),
        }
    }
}

/// Class declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub super_type: Option<String>,
    pub is_abstract: bool,
    pub attributes: BTreeMap<String, AttributeDef>,
    pub references: BTreeMap<String, ReferenceDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_type: None,
            is_abstract: false,
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn extends(mut self, super_type: impl Into<String>) -> Self {
        self.super_type = Some(super_type.into());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, def: AttributeDef) -> Self {
        self.attributes.insert(name.into(), def);
        self
    }

    pub fn reference(mut self, name: impl Into<String>, def: ReferenceDef) -> Self {
        self.references.insert(name.into(), def);
        self
    }
}

/// A metamodel package
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub uri: String,
    classes: BTreeMap<String, ClassDef>,
}

impl Package {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            classes: BTreeMap::new(),
        }
    }

    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    /// Look up a class by name
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` if the package does not declare the class.
    pub fn class(&self, type_name: &str) -> Result<&ClassDef> {
        self.classes
            .get(type_name)
            .ok_or_else(|| HubError::UnknownType {
                package: self.uri.clone(),
                type_name: type_name.to_string(),
            })
    }

    pub fn has_class(&self, type_name: &str) -> bool {
        self.classes.contains_key(type_name)
    }

    /// The class and its super types, most specific first
    ///
    /// Stops at an unknown super type or at a cycle.
    fn lineage(&self, type_name: &str) -> Vec<&ClassDef> {
        let mut chain: Vec<&ClassDef> = Vec::new();
        let mut next = self.classes.get(type_name);
        while let Some(class) = next {
            if chain.iter().any(|c| c.name == class.name) {
                break;
            }
            chain.push(class);
            next = class
                .super_type
                .as_deref()
                .and_then(|s| self.classes.get(s));
        }
        chain
    }

    /// Resolve a feature on a type, searching super types
    ///
    /// # Errors
    ///
    /// `UnknownType` if the type is not declared, `UnknownFeature` if no
    /// class in its lineage declares the feature.
    pub fn feature(&self, type_name: &str, feature: &str) -> Result<FeatureDef<'_>> {
        self.class(type_name)?;
        for class in self.lineage(type_name) {
            if let Some(attr) = class.attributes.get(feature) {
                return Ok(FeatureDef::Attribute(attr));
            }
            if let Some(reference) = class.references.get(feature) {
                return Ok(FeatureDef::Reference(reference));
            }
        }
        Err(HubError::UnknownFeature {
            type_name: type_name.to_string(),
            feature: feature.to_string(),
        })
    }

    /// All features of a type including inherited ones, ordered by name
    pub fn features(&self, type_name: &str) -> BTreeMap<&str, FeatureDef<'_>> {
        let mut features = BTreeMap::new();
        // Walk from the root super type down so subclasses shadow
        for class in self.lineage(type_name).into_iter().rev() {
            for (name, attr) in &class.attributes {
                features.insert(name.as_str(), FeatureDef::Attribute(attr));
            }
            for (name, reference) in &class.references {
                features.insert(name.as_str(), FeatureDef::Reference(reference));
            }
        }
        features
    }

    /// Whether `type_name` is `target` or a subtype of it
    pub fn conforms(&self, type_name: &str, target: &str) -> bool {
        self.lineage(type_name).iter().any(|c| c.name == target)
    }
}

/// Registry of known packages keyed by namespace URI
#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
    packages: BTreeMap<String, Arc<Package>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the sample coffee package
    pub fn with_samples() -> Self {
        let mut registry = Self::new();
        registry.packages.insert(coffee::NS_URI.to_string(), Arc::new(coffee::package()));
        registry
    }

    /// Register a package
    ///
    /// # Errors
    ///
    /// Returns `PackageAlreadyRegistered` if the URI is taken.
    pub fn register(&mut self, package: Package) -> Result<()> {
        if self.packages.contains_key(&package.uri) {
            return Err(HubError::PackageAlreadyRegistered { uri: package.uri });
        }
        self.packages.insert(package.uri.clone(), Arc::new(package));
        Ok(())
    }

    /// Look up a package by URI
    ///
    /// # Errors
    ///
    /// Returns `UnknownPackage` if the URI is not registered.
    pub fn get(&self, uri: &str) -> Result<Arc<Package>> {
        self.packages
            .get(uri)
            .cloned()
            .ok_or_else(|| HubError::UnknownPackage {
                uri: uri.to_string(),
            })
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}
