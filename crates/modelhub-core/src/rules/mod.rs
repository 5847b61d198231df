//! Structural invariants and model validation

pub mod invariants;
pub mod validation;

pub use validation::{max_severity, Diagnostic, DomainCheck, ModelValidator, Severity};
