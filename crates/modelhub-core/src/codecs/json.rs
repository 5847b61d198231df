use crate::commands::Command;
use crate::errors::{HubError, Result};
use crate::model::Model;

use super::Codec;

/// JSON wire format (`serde_json`)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

pub const FORMAT: &str = "json";

impl Codec for JsonCodec {
    fn format(&self) -> &str {
        FORMAT
    }

    fn encode_model(&self, model: &Model) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(model).map_err(|e| HubError::Serialization {
            message: format!("failed to encode model {}: {}", model.id, e),
        })
    }

    fn decode_model(&self, model_id: &str, bytes: &[u8]) -> Result<Model> {
        let mut model: Model =
            serde_json::from_slice(bytes).map_err(|e| HubError::CorruptModel {
                model_id: model_id.to_string(),
                reason: e.to_string(),
            })?;
        model.id = model_id.to_string();
        Ok(model)
    }

    fn encode_command(&self, command: &Command) -> Result<Vec<u8>> {
        serde_json::to_vec(command).map_err(|e| HubError::Serialization {
            message: format!("failed to encode {} command: {}", command.kind(), e),
        })
    }

    fn decode_command(&self, bytes: &[u8]) -> Result<Command> {
        serde_json::from_slice(bytes).map_err(|e| HubError::MalformedCommand {
            reason: e.to_string(),
        })
    }
}
