//! Hydration - turns stored bytes into a checked in-memory model
//!
//! A model hydrates only if it decodes, names a registered package, and
//! passes the structural checks with no error-severity diagnostics.

#![allow(clippy::result_large_err)]

use crate::errors::Result;
use modelhub_core::rules::validation::check_structure;
use modelhub_core::{Codec, ExError, HubError, Model, Package, PackageRegistry, Severity};
use std::sync::Arc;

fn corrupt(model_id: &str, reason: impl Into<String>) -> ExError {
    HubError::CorruptModel {
        model_id: model_id.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Decode and check a stored model
///
/// # Errors
///
/// Returns `CorruptModel` if the bytes do not decode, the package is not
/// registered, or the structure does not conform to the package.
pub fn hydrate(
    codec: &dyn Codec,
    packages: &PackageRegistry,
    model_id: &str,
    bytes: &[u8],
) -> Result<(Model, Arc<Package>)> {
    let model = codec.decode_model(model_id, bytes)?;

    let package = packages
        .get(&model.package)
        .map_err(|e| corrupt(model_id, e.to_string()))?;

    let errors: Vec<_> = check_structure(&model, &package)
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if let Some(first) = errors.first() {
        return Err(corrupt(
            model_id,
            format!(
                "{} structural error(s), first: {}",
                errors.len(),
                first.message
            ),
        ));
    }

    Ok((model, package))
}
