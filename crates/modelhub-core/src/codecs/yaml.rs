use crate::commands::Command;
use crate::errors::{HubError, Result};
use crate::model::Model;

use super::Codec;

/// YAML wire format (`serde_yaml`)
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

pub const FORMAT: &str = "yaml";

fn utf8(bytes: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("payload is not UTF-8: {}", e))
}

impl Codec for YamlCodec {
    fn format(&self) -> &str {
        FORMAT
    }

    fn encode_model(&self, model: &Model) -> Result<Vec<u8>> {
        serde_yaml::to_string(model)
            .map(String::into_bytes)
            .map_err(|e| HubError::Serialization {
                message: format!("failed to encode model {}: {}", model.id, e),
            })
    }

    fn decode_model(&self, model_id: &str, bytes: &[u8]) -> Result<Model> {
        let corrupt = |reason: String| HubError::CorruptModel {
            model_id: model_id.to_string(),
            reason,
        };
        let text = utf8(bytes).map_err(corrupt)?;
        let mut model: Model = serde_yaml::from_str(text).map_err(|e| corrupt(e.to_string()))?;
        model.id = model_id.to_string();
        Ok(model)
    }

    fn encode_command(&self, command: &Command) -> Result<Vec<u8>> {
        serde_yaml::to_string(command)
            .map(String::into_bytes)
            .map_err(|e| HubError::Serialization {
                message: format!("failed to encode {} command: {}", command.kind(), e),
            })
    }

    fn decode_command(&self, bytes: &[u8]) -> Result<Command> {
        let malformed = |reason: String| HubError::MalformedCommand { reason };
        let text = utf8(bytes).map_err(malformed)?;
        serde_yaml::from_str(text).map_err(|e| malformed(e.to_string()))
    }
}
