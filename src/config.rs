//! Application configuration
//!
//! Layers, lowest first: built-in defaults, a YAML/JSON/TOML file, then
//! `CAROUSEL__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use batch_flow::DriverConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_PREFIX: &str = "CAROUSEL";
const APP_DIR: &str = "carousel-driver";
const CONFIG_FILE: &str = "driver.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Overrides `--log-level` when set
    pub level: Option<String>,
    pub json: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub driver: DriverConfig,
    /// Directory holding one checkpoint record per job key
    pub checkpoint_dir: PathBuf,
    pub job_key: String,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            checkpoint_dir: default_checkpoint_dir(),
            job_key: "default".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_checkpoint_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR).join("checkpoints"))
        .unwrap_or_else(|| PathBuf::from(".carousel").join("checkpoints"))
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File that contributed, if any
    pub path: Option<PathBuf>,
}

/// Explicit path, else `./config/driver.yaml`, else the user config dir.
pub fn config_search_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("config").join(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let candidate = config_search_path(explicit);
    let mut builder = Config::builder();

    let path = match candidate {
        Some(path) if explicit.is_some() || path.exists() => {
            builder = builder.add_source(File::from(path.as_path()).required(true));
            Some(path)
        }
        Some(path) => {
            debug!(path = %path.display(), "no configuration file; using defaults");
            None
        }
        None => None,
    };

    let config: AppConfig = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to assemble configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config
        .driver
        .validate()
        .context("Invalid driver configuration")?;

    Ok(LoadedConfig { config, path })
}
