//! Save command
//!
//! Usage: modelhub save <MODEL_ID>...
//!
//! Loads each model and writes it back in its storage encoding.

use clap::Args;
use modelhub_engine::{apply_engine_command, EngineCommand, ModelController};

#[derive(Debug, Args)]
pub struct SaveArgs {
    #[arg(required = true)]
    pub model_ids: Vec<String>,
}

pub async fn execute(
    controller: &ModelController,
    args: SaveArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    for model_id in args.model_ids {
        // Only live models are saved
        controller.repository().get(&model_id).await?;
        apply_engine_command(
            EngineCommand::Save {
                model_id: model_id.clone(),
            },
            controller,
        )
        .await?;
        println!("Saved {}", model_id);
    }
    Ok(())
}
