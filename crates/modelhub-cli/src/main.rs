//! ModelHub CLI
//!
//! Drives the model controller against a local workspace

use clap::{Parser, Subcommand};

mod commands;
mod workspace;

#[derive(Debug, Parser)]
#[command(name = "modelhub")]
#[command(about = "ModelHub - command execution for hosted models", long_about = None)]
struct Cli {
    #[command(flatten)]
    workspace: workspace::WorkspaceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a model from a bundled sample
    New(commands::new::NewArgs),
    /// Run command files and undo/redo steps against a model
    Apply(commands::apply::ApplyArgs),
    /// Print a model's diagnostics
    Validate(commands::validate::ValidateArgs),
    /// Print a model in a wire format
    Show(commands::show::ShowArgs),
    /// Rewrite models in their storage encoding
    Save(commands::save::SaveArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match workspace::open(&cli.workspace) {
        Ok(controller) => match cli.command {
            Commands::New(args) => commands::new::execute(&controller, args).await,
            Commands::Apply(args) => commands::apply::execute(&controller, args).await,
            Commands::Validate(args) => commands::validate::execute(&controller, args).await,
            Commands::Show(args) => commands::show::execute(&controller, args).await,
            Commands::Save(args) => commands::save::execute(&controller, args).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
