//! Error handling for modelhub-store
//!
//! Wraps modelhub-core ExError with store-specific helpers

use modelhub_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error for an already-applied migration
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create a persistence error for a model, keeping the storage cause
pub fn persistence_error(model_id: &str, cause: ExError) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("save")
        .with_model_id(model_id)
        .with_message(format!("failed to persist model {}", model_id))
        .with_source(cause)
}

/// Create an error for a stored document whose checksum no longer matches
pub fn corrupt_content(model_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::CorruptModel)
        .with_op("load")
        .with_model_id(model_id)
        .with_message(format!(
            "stored checksum {} does not match content checksum {}",
            expected, actual
        ))
}

/// Create an error for a model id that cannot name a storage location
pub fn invalid_model_id(model_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_model_id(model_id)
        .with_message(format!("invalid model id '{}': {}", model_id, reason))
}

/// Create a timeout error for a model whose serialization point stayed busy
pub fn lock_timeout(model_id: &str, waited_ms: u64) -> ExError {
    ExError::new(ExErrorKind::Timeout)
        .with_op("lock_model")
        .with_model_id(model_id)
        .with_message(format!(
            "model {} stayed busy for {} ms",
            model_id, waited_ms
        ))
}

/// Create an error for a blocking storage task that did not complete
pub fn task_failed(operation: &str, err: tokio::task::JoinError) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(operation.to_string())
        .with_message(format!("storage task failed: {}", err))
}
