//! Codec registry
//!
//! Maps a format identifier to a stateless `Codec` that turns models and
//! commands into wire bytes and back. Format identifiers are matched
//! case-insensitively. One format is preferred for responses when a client
//! does not name one.

pub mod json;
pub mod yaml;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::commands::Command;
use crate::errors::{HubError, Result};
use crate::model::Model;

pub use json::JsonCodec;
pub use yaml::YamlCodec;

/// Encoder/decoder pair bound to one wire format
pub trait Codec: Send + Sync {
    /// Format identifier, lowercase
    fn format(&self) -> &str;

    fn encode_model(&self, model: &Model) -> Result<Vec<u8>>;

    /// Decode a model document; fails with `CorruptModel`
    fn decode_model(&self, model_id: &str, bytes: &[u8]) -> Result<Model>;

    fn encode_command(&self, command: &Command) -> Result<Vec<u8>>;

    /// Decode a command payload; fails with `MalformedCommand`
    fn decode_command(&self, bytes: &[u8]) -> Result<Command>;
}

fn normalize(format: &str) -> String {
    format.trim().to_ascii_lowercase()
}

/// Registry of codecs keyed by format
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
    preferred: Option<String>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `json` and `yaml` codecs; `json` preferred
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .codecs
            .insert(json::FORMAT.to_string(), Arc::new(JsonCodec));
        registry
            .codecs
            .insert(yaml::FORMAT.to_string(), Arc::new(YamlCodec));
        registry.preferred = Some(json::FORMAT.to_string());
        registry
    }

    /// Register a codec under its format
    ///
    /// The first registered codec becomes the preferred format.
    ///
    /// # Errors
    ///
    /// Returns `FormatAlreadyRegistered` if the format is taken; the
    /// existing mapping is never replaced.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Result<()> {
        let format = normalize(codec.format());
        if self.codecs.contains_key(&format) {
            return Err(HubError::FormatAlreadyRegistered { format });
        }
        if self.preferred.is_none() {
            self.preferred = Some(format.clone());
        }
        self.codecs.insert(format, codec);
        Ok(())
    }

    /// Change the format used when a request names none
    ///
    /// Only default resolution changes; the format mapping is untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` if the format is not registered.
    pub fn set_preferred(&mut self, format: &str) -> Result<()> {
        let format = normalize(format);
        if !self.codecs.contains_key(&format) {
            return Err(HubError::UnknownFormat { format });
        }
        self.preferred = Some(format);
        Ok(())
    }

    pub fn preferred_format(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    /// Resolve the codec for a format
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` if no codec is registered for it.
    pub fn resolve(&self, format: &str) -> Result<Arc<dyn Codec>> {
        let key = normalize(format);
        self.codecs
            .get(&key)
            .cloned()
            .ok_or(HubError::UnknownFormat { format: key })
    }

    /// Resolve a format, falling back to the preferred one when absent
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormat` for an unregistered format, or when no format
    /// is given and none is preferred.
    pub fn resolve_or_default(&self, format: Option<&str>) -> Result<Arc<dyn Codec>> {
        match format.or(self.preferred.as_deref()) {
            Some(format) => self.resolve(format),
            None => Err(HubError::UnknownFormat {
                format: String::new(),
            }),
        }
    }

    pub fn formats(&self) -> Vec<&str> {
        self.codecs.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("formats", &self.formats())
            .field("preferred", &self.preferred)
            .finish()
    }
}
