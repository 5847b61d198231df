use modelhub_core_types::{RequestId, SessionId};
use thiserror::Error;

/// Result type alias using HubError
pub type Result<T> = std::result::Result<T, HubError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by the model server maps to exactly one kind, and
/// every kind maps to a stable error code for programmatic handling by
/// transports and clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Request decoding
    UnknownFormat,
    FormatAlreadyRegistered,
    MalformedCommand,
    UnresolvedReference,

    // Repository
    ModelNotFound,
    CorruptModel,
    ModelBusy,
    AlreadyExists,
    Persistence,

    // Command stack
    CommandExecutionFailed,
    NothingToUndo,
    NothingToRedo,
    ValidationRejected,

    // Metamodel
    UnknownPackage,
    PackageAlreadyRegistered,

    // Scheduling
    Timeout,
    SessionClosed,

    // Integration/IO
    Io,
    Serialization,
    InvalidInput,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::UnknownFormat => "ERR_UNKNOWN_FORMAT",
            ExErrorKind::FormatAlreadyRegistered => "ERR_FORMAT_ALREADY_REGISTERED",
            ExErrorKind::MalformedCommand => "ERR_MALFORMED_COMMAND",
            ExErrorKind::UnresolvedReference => "ERR_UNRESOLVED_REFERENCE",
            ExErrorKind::ModelNotFound => "ERR_MODEL_NOT_FOUND",
            ExErrorKind::CorruptModel => "ERR_CORRUPT_MODEL",
            ExErrorKind::ModelBusy => "ERR_MODEL_BUSY",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::CommandExecutionFailed => "ERR_COMMAND_EXECUTION_FAILED",
            ExErrorKind::NothingToUndo => "ERR_NOTHING_TO_UNDO",
            ExErrorKind::NothingToRedo => "ERR_NOTHING_TO_REDO",
            ExErrorKind::ValidationRejected => "ERR_VALIDATION_REJECTED",
            ExErrorKind::UnknownPackage => "ERR_UNKNOWN_PACKAGE",
            ExErrorKind::PackageAlreadyRegistered => "ERR_PACKAGE_ALREADY_REGISTERED",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::SessionClosed => "ERR_SESSION_CLOSED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the classification kind plus the context a caller needs to
/// report the failure: the operation, the model and object involved, and
/// correlation ids of the originating request.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    model_id: Option<String>,
    object_id: Option<String>,
    session_id: Option<SessionId>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            model_id: None,
            object_id: None,
            session_id: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add model ID context
    pub fn with_model_id(mut self, id: impl Into<String>) -> Self {
        self.model_id = Some(id.into());
        self
    }

    /// Add object ID context
    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    /// Add session ID context
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the model ID context, if any
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Get the object ID context, if any
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Get the session ID context, if any
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(model_id) = &self.model_id {
            write!(f, " (model_id: {})", model_id)?;
        }
        if let Some(object_id) = &self.object_id {
            write!(f, " (object_id: {})", object_id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for model server operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    // ===== Codec Errors =====
    /// No codec registered for the requested format
    #[error("Unknown format: {format}")]
    UnknownFormat { format: String },

    /// A codec is already registered for this format
    #[error("Format already registered: {format}")]
    FormatAlreadyRegistered { format: String },

    /// The payload is not a structurally valid command
    #[error("Malformed command: {reason}")]
    MalformedCommand { reason: String },

    /// The payload references an object the target model does not contain
    #[error("Unresolved reference to object {object_id} in model {model_id}")]
    UnresolvedReference { model_id: String, object_id: String },

    // ===== Repository Errors =====
    /// No backing resource exists for the model id
    #[error("Model not found: {model_id}")]
    ModelNotFound { model_id: String },

    /// The stored model loaded but does not conform to its metamodel
    #[error("Corrupt model {model_id}: {reason}")]
    CorruptModel { model_id: String, reason: String },

    /// The model still has subscribers and cannot be closed
    #[error("Model {model_id} is busy: {subscribers} active subscriber(s)")]
    ModelBusy { model_id: String, subscribers: usize },

    /// A model with this id is already loaded or stored
    #[error("Model already exists: {model_id}")]
    ModelAlreadyExists { model_id: String },

    /// The storage layer failed to persist the model
    #[error("Persistence error for model {model_id}: {message}")]
    Persistence { model_id: String, message: String },

    // ===== Command Stack Errors =====
    /// The command failed mid-execution and was rolled back
    #[error("Command {command_kind} failed on model {model_id}: {cause}")]
    CommandExecutionFailed {
        model_id: String,
        command_kind: String,
        cause: String,
    },

    /// Undo requested with the cursor at the start of history
    #[error("Nothing to undo on model {model_id}")]
    NothingToUndo { model_id: String },

    /// Redo requested with the cursor at the end of history
    #[error("Nothing to redo on model {model_id}")]
    NothingToRedo { model_id: String },

    /// The command committed but produced error diagnostics and was revoked
    #[error("Command rejected by validation on model {model_id}: {reason}")]
    ValidationRejected { model_id: String, reason: String },

    // ===== Apply Errors (raised mid-execution) =====
    /// Target object does not exist in the model
    #[error("Object not found: {object_id}")]
    ObjectNotFound { object_id: String },

    /// Object type does not declare the feature
    #[error("Type {type_name} has no feature '{feature}'")]
    UnknownFeature { type_name: String, feature: String },

    /// Type is not declared by the model's package
    #[error("Unknown type {type_name} in package {package}")]
    UnknownType { package: String, type_name: String },

    /// Value does not match the declared feature type
    #[error("Type mismatch on feature '{feature}': expected {expected}, found {found}")]
    TypeMismatch {
        feature: String,
        expected: String,
        found: String,
    },

    /// Operation is not valid for the feature's multiplicity
    #[error("Multiplicity violation on feature '{feature}': {reason}")]
    MultiplicityViolation { feature: String, reason: String },

    /// Insertion index is beyond the end of a many-valued feature
    #[error("Index {index} out of bounds for feature '{feature}' (len {len})")]
    IndexOutOfBounds {
        feature: String,
        index: usize,
        len: usize,
    },

    /// Value to remove is not held by the feature
    #[error("Feature '{feature}' of {object_id} does not contain {value}")]
    ValueNotPresent {
        object_id: String,
        feature: String,
        value: String,
    },

    /// Object id is already in use
    #[error("Object already exists: {object_id}")]
    DuplicateObject { object_id: String },

    /// Containment features only accept children created in place
    #[error("Containment violation on feature '{feature}': {reason}")]
    ContainmentViolation { feature: String, reason: String },

    /// The model root cannot be deleted
    #[error("Cannot delete model root {object_id}")]
    RootDeletion { object_id: String },

    // ===== Metamodel Errors =====
    /// Package URI is not registered
    #[error("Unknown package: {uri}")]
    UnknownPackage { uri: String },

    /// Package URI is already registered
    #[error("Package already registered: {uri}")]
    PackageAlreadyRegistered { uri: String },

    // ===== Generic Errors =====
    /// Serialization error (encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl HubError {
    /// True for faults raised while a command is being applied
    ///
    /// The command stack wraps these into `CommandExecutionFailed`.
    pub fn is_apply_fault(&self) -> bool {
        matches!(
            self,
            HubError::ObjectNotFound { .. }
                | HubError::UnknownFeature { .. }
                | HubError::UnknownType { .. }
                | HubError::TypeMismatch { .. }
                | HubError::MultiplicityViolation { .. }
                | HubError::IndexOutOfBounds { .. }
                | HubError::ValueNotPresent { .. }
                | HubError::DuplicateObject { .. }
                | HubError::ContainmentViolation { .. }
                | HubError::RootDeletion { .. }
        )
    }
}

/// Conversion from HubError to ExError
///
/// Every domain variant maps to exactly one stable kind.
impl From<HubError> for ExError {
    fn from(err: HubError) -> Self {
        let message = err.to_string();
        match err {
            HubError::UnknownFormat { .. } => {
                ExError::new(ExErrorKind::UnknownFormat).with_message(message)
            }
            HubError::FormatAlreadyRegistered { .. } => {
                ExError::new(ExErrorKind::FormatAlreadyRegistered).with_message(message)
            }
            HubError::MalformedCommand { .. } => {
                ExError::new(ExErrorKind::MalformedCommand).with_message(message)
            }
            HubError::UnresolvedReference {
                model_id,
                object_id,
            } => ExError::new(ExErrorKind::UnresolvedReference)
                .with_model_id(model_id)
                .with_object_id(object_id)
                .with_message(message),
            HubError::ModelNotFound { model_id } => ExError::new(ExErrorKind::ModelNotFound)
                .with_model_id(model_id)
                .with_message(message),
            HubError::CorruptModel { model_id, .. } => ExError::new(ExErrorKind::CorruptModel)
                .with_model_id(model_id)
                .with_message(message),
            HubError::ModelBusy { model_id, .. } => ExError::new(ExErrorKind::ModelBusy)
                .with_model_id(model_id)
                .with_message(message),
            HubError::ModelAlreadyExists { model_id } => ExError::new(ExErrorKind::AlreadyExists)
                .with_model_id(model_id)
                .with_message(message),
            HubError::Persistence { model_id, .. } => ExError::new(ExErrorKind::Persistence)
                .with_model_id(model_id)
                .with_message(message),
            HubError::CommandExecutionFailed { model_id, .. } => {
                ExError::new(ExErrorKind::CommandExecutionFailed)
                    .with_op("execute")
                    .with_model_id(model_id)
                    .with_message(message)
            }
            HubError::NothingToUndo { model_id } => ExError::new(ExErrorKind::NothingToUndo)
                .with_op("undo")
                .with_model_id(model_id)
                .with_message(message),
            HubError::NothingToRedo { model_id } => ExError::new(ExErrorKind::NothingToRedo)
                .with_op("redo")
                .with_model_id(model_id)
                .with_message(message),
            HubError::ValidationRejected { model_id, .. } => {
                ExError::new(ExErrorKind::ValidationRejected)
                    .with_op("validate")
                    .with_model_id(model_id)
                    .with_message(message)
            }

            // Apply faults reaching a caller unwrapped are execution failures
            HubError::ObjectNotFound { ref object_id }
            | HubError::DuplicateObject { ref object_id }
            | HubError::RootDeletion { ref object_id } => {
                ExError::new(ExErrorKind::CommandExecutionFailed)
                    .with_object_id(object_id.clone())
                    .with_message(message)
            }
            HubError::ValueNotPresent { ref object_id, .. } => {
                ExError::new(ExErrorKind::CommandExecutionFailed)
                    .with_object_id(object_id.clone())
                    .with_message(message)
            }
            HubError::UnknownFeature { .. }
            | HubError::UnknownType { .. }
            | HubError::TypeMismatch { .. }
            | HubError::MultiplicityViolation { .. }
            | HubError::IndexOutOfBounds { .. }
            | HubError::ContainmentViolation { .. } => {
                ExError::new(ExErrorKind::CommandExecutionFailed).with_message(message)
            }

            HubError::UnknownPackage { .. } => {
                ExError::new(ExErrorKind::UnknownPackage).with_message(message)
            }
            HubError::PackageAlreadyRegistered { .. } => {
                ExError::new(ExErrorKind::PackageAlreadyRegistered).with_message(message)
            }
            HubError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
            HubError::Internal { .. } => ExError::new(ExErrorKind::Internal).with_message(message),
        }
    }
}
