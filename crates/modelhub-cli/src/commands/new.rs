//! New command
//!
//! Usage: modelhub new <MODEL_ID>

use clap::Args;
use modelhub_core::metamodel::coffee;
use modelhub_engine::ModelController;

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Id of the model to create; its extension picks the storage format
    pub model_id: String,
}

/// Create the coffee machine sample under `model_id` and save it
pub async fn execute(
    controller: &ModelController,
    args: NewArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    controller
        .create(coffee::sample_model(&args.model_id))
        .await?;
    controller.save(&args.model_id).await?;
    println!("Created {}", args.model_id);
    Ok(())
}
