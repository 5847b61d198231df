//! Apply command
//!
//! Usage: modelhub apply <MODEL_ID> <STEP>... [--format <FORMAT>] [--dry-run]
//!
//! A step is a path to an encoded command file, or the literal `undo` or
//! `redo`. Steps run in order; the first failure stops the batch.

use super::print_diagnostics;
use clap::Args;
use modelhub_engine::{
    apply_engine_command, CommandResult, EngineCommand, EngineCommandResult, ModelController,
    Persisted,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Target model id
    pub model_id: String,

    /// Command files, `undo` or `redo`
    #[arg(required = true)]
    pub steps: Vec<String>,

    /// Wire format of the command files (default: from each file's extension)
    #[arg(long)]
    pub format: Option<String>,

    /// Leave the model unsaved after the batch
    #[arg(long)]
    pub dry_run: bool,
}

fn format_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(if ext == "yml" { "yaml".to_string() } else { ext })
}

fn step_command(model_id: &str, step: &str, format: Option<&str>) -> std::io::Result<EngineCommand> {
    let format = format.map(str::to_string);
    Ok(match step {
        "undo" => EngineCommand::Undo {
            model_id: model_id.to_string(),
            format,
        },
        "redo" => EngineCommand::Redo {
            model_id: model_id.to_string(),
            format,
        },
        path => {
            let path = PathBuf::from(path);
            EngineCommand::Execute {
                model_id: model_id.to_string(),
                payload: std::fs::read(&path)?,
                format: format.or_else(|| format_of(&path)),
            }
        }
    })
}

fn report(step: &str, result: &CommandResult) {
    let payload = &result.payload;
    println!(
        "#{} {} {} ({} diagnostic(s))",
        payload.sequence,
        payload.kind.as_str(),
        step,
        payload.diagnostics.len()
    );
    print_diagnostics(&payload.diagnostics);
    if let Persisted::Failed(e) = &result.persisted {
        println!("  autosave failed: {}", e);
    }
}

pub async fn execute(
    controller: &ModelController,
    args: ApplyArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    for step in &args.steps {
        let cmd = step_command(&args.model_id, step, args.format.as_deref())?;
        match apply_engine_command(cmd, controller).await? {
            EngineCommandResult::Mutated(result) => report(step, &result),
            other => return Err(format!("unexpected result for step {}: {:?}", step, other).into()),
        }
    }

    if args.dry_run {
        println!("Dry run: {} left unsaved", args.model_id);
        return Ok(());
    }

    apply_engine_command(
        EngineCommand::Save {
            model_id: args.model_id.clone(),
        },
        controller,
    )
    .await?;
    println!("Saved {}", args.model_id);
    Ok(())
}
