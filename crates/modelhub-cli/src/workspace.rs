//! Workspace resolution shared by every subcommand

use clap::Args;
use modelhub_core::logging_facility::{self, Profile};
use modelhub_core::metamodel::coffee::TaskDurationCheck;
use modelhub_core::{ModelValidator, PackageRegistry};
use modelhub_engine::{ModelController, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Config file picked up from the workspace root when `--config` is absent
pub const CONFIG_FILE: &str = "modelhub.toml";

#[derive(Debug, Args)]
pub struct WorkspaceArgs {
    /// Directory holding the hosted models
    #[arg(long, short = 'w', global = true)]
    pub workspace: Option<PathBuf>,

    /// Server configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Logging profile: dev, prod or test
    #[arg(long, global = true, default_value = "test")]
    pub log_profile: Profile,
}

/// Load configuration, initialize logging and build a controller
pub fn open(args: &WorkspaceArgs) -> Result<ModelController, Box<dyn std::error::Error>> {
    logging_facility::init(args.log_profile);

    let mut config = match (&args.config, &args.workspace) {
        (Some(path), _) => ServerConfig::load(path)?,
        (None, Some(root)) if root.join(CONFIG_FILE).is_file() => {
            ServerConfig::load(&root.join(CONFIG_FILE))?
        }
        (None, _) => ServerConfig::default(),
    };
    if let Some(root) = &args.workspace {
        config.workspace_root = root.clone();
    }
    config.check()?;
    std::fs::create_dir_all(&config.workspace_root)?;

    let packages = Arc::new(PackageRegistry::with_samples());
    let validator = ModelValidator::new(packages.clone()).with_check(TaskDurationCheck);
    Ok(ModelController::from_config(&config, packages, validator)?)
}
