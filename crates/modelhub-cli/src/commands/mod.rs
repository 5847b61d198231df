pub mod apply;
pub mod new;
pub mod save;
pub mod show;
pub mod validate;

use modelhub_core::{Diagnostic, Severity};

pub(crate) fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Ok => "ok",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

pub(crate) fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        let location = match (&d.object_id, &d.feature) {
            (Some(object), Some(feature)) => format!("{}.{}", object, feature),
            (Some(object), None) => object.clone(),
            _ => "-".to_string(),
        };
        println!(
            "  {} [{}] {}: {}",
            severity_label(d.severity),
            d.code,
            location,
            d.message
        );
    }
}
