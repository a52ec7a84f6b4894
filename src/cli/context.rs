use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use carousel_checkpoint_store::FileCheckpointStore;

use super::output::OutputFormat;
use crate::config::AppConfig;

pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: Option<PathBuf>,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Store for `job`, or for the configured job key.
    pub fn checkpoint_store(&self, job: Option<&str>) -> Result<Arc<FileCheckpointStore>> {
        let key = job.unwrap_or(&self.config.job_key);
        FileCheckpointStore::open(&self.config.checkpoint_dir, key).with_context(|| {
            format!(
                "opening checkpoint store {} for job {}",
                self.config.checkpoint_dir.display(),
                key
            )
        })
    }
}
