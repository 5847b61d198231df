//! Validate command
//!
//! Usage: modelhub validate <MODEL_ID>

use super::print_diagnostics;
use clap::Args;
use modelhub_core::rules::{max_severity, Severity};
use modelhub_engine::{apply_engine_command, EngineCommand, EngineCommandResult, ModelController};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    pub model_id: String,
}

/// Print diagnostics; fails when any has error severity
pub async fn execute(
    controller: &ModelController,
    args: ValidateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let diagnostics = match apply_engine_command(
        EngineCommand::Validate {
            model_id: args.model_id.clone(),
        },
        controller,
    )
    .await?
    {
        EngineCommandResult::Diagnostics(d) => d,
        other => return Err(format!("unexpected result: {:?}", other).into()),
    };

    println!("{}: {} diagnostic(s)", args.model_id, diagnostics.len());
    print_diagnostics(&diagnostics);

    if max_severity(&diagnostics) == Severity::Error {
        return Err(format!("{} failed validation", args.model_id).into());
    }
    Ok(())
}
