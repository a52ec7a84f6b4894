use anyhow::Result;

use super::context::CliContext;
use super::output::{emit, OutputFormat};

pub async fn cmd_config(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    if !ctx.output().is_human() {
        return emit(ctx.output(), config, || {});
    }

    match ctx.config_path() {
        Some(path) => println!("Effective configuration (file: {}):", path.display()),
        None => println!("Effective configuration (defaults and environment):"),
    }
    emit(OutputFormat::Yaml, config, || {})
}
