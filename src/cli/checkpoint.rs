use std::time::Duration;

use anyhow::{Context, Result};
use carousel_checkpoint_store::CheckpointStore;
use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::json;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    pub action: CheckpointAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CheckpointAction {
    /// Show the stored checkpoint
    Show {
        /// Job key (defaults to the configured one)
        #[arg(long)]
        job: Option<String>,
    },

    /// Delete the stored checkpoint so the next run starts fresh
    Clear {
        #[arg(long)]
        job: Option<String>,
    },
}

pub async fn cmd_checkpoint(args: CheckpointArgs, ctx: &CliContext) -> Result<()> {
    match args.action {
        CheckpointAction::Show { job } => {
            let store = ctx.checkpoint_store(job.as_deref())?;
            let record = store.record().await.context("reading checkpoint")?;
            emit(ctx.output(), &record, || match &record {
                Some(record) => {
                    let age = (Utc::now() - record.timestamp)
                        .to_std()
                        .map(|age| Duration::from_secs(age.as_secs()))
                        .map(|age| humantime::format_duration(age).to_string())
                        .unwrap_or_else(|_| "just now".to_string());
                    println!("Checkpoint {}", store.path().display());
                    println!("- Last completed item: {}", record.index);
                    println!("- Next item: {}", record.index + 1);
                    println!("- Address: {}", record.address);
                    println!("- Fingerprint: {}", record.fingerprint);
                    println!(
                        "- Saved: {} ({} ago)",
                        humantime::format_rfc3339_seconds(record.timestamp.into()),
                        age
                    );
                    if let Some(run_id) = &record.run_id {
                        println!("- Run: {}", run_id);
                    }
                }
                None => println!("No checkpoint at {}", store.path().display()),
            })
        }
        CheckpointAction::Clear { job } => {
            let store = ctx.checkpoint_store(job.as_deref())?;
            let removed = store.clear().await.context("clearing checkpoint")?;
            let summary = json!({
                "path": store.path().display().to_string(),
                "removed": removed,
            });
            emit(ctx.output(), &summary, || {
                if removed {
                    println!("Removed checkpoint {}", store.path().display());
                } else {
                    println!("No checkpoint at {}", store.path().display());
                }
            })
        }
    }
}
