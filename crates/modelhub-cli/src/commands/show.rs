//! Show command
//!
//! Usage: modelhub show <MODEL_ID> [--format <FORMAT>] [--output <FILE>]

use clap::Args;
use modelhub_engine::{apply_engine_command, EngineCommand, EngineCommandResult, ModelController};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub model_id: String,

    /// Wire format (default: the configured default format)
    #[arg(long)]
    pub format: Option<String>,

    /// Output file path (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(
    controller: &ModelController,
    args: ShowArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = match apply_engine_command(
        EngineCommand::Snapshot {
            model_id: args.model_id.clone(),
            format: args.format.clone(),
        },
        controller,
    )
    .await?
    {
        EngineCommandResult::Snapshot(bytes) => bytes,
        other => return Err(format!("unexpected result: {:?}", other).into()),
    };

    match args.output {
        Some(path) => {
            std::fs::write(&path, &bytes)?;
            println!("Wrote {} to {}", args.model_id, path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
