use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::init_logging;
use crate::config::{load_config, LoadedConfig};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    // Logging settings live in the config file, so load it before the
    // subscriber exists.
    let LoadedConfig { config, path } = load_config(cli.config.as_deref())?;

    let level = config.logging.level.as_deref().unwrap_or(&cli.log_level);
    let log_file = cli.log_file.as_deref().or(config.logging.file.as_deref());
    let _log_guard = init_logging(level, cli.debug, cli.log_json || config.logging.json, log_file)?;

    info!("Starting carousel-driver v{}", env!("CARGO_PKG_VERSION"));
    match &path {
        Some(path) => info!(path = %path.display(), "Loaded configuration"),
        None => info!("No configuration file; using defaults and environment"),
    }

    let cli_context = CliContext::new(config, path, cli.output);

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
