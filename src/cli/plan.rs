use anyhow::Result;
use batch_flow::plan_batches;
use clap::Args;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    /// Items in the work list
    #[arg(long)]
    pub total: usize,

    /// Items per batch (defaults to the configured batch size)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// First item to act on
    #[arg(long, default_value_t = 0)]
    pub start_index: usize,

    /// Plan as a resumed run
    #[arg(long)]
    pub resume: bool,
}

pub async fn cmd_plan(args: PlanArgs, ctx: &CliContext) -> Result<()> {
    let batch_size = args
        .batch_size
        .unwrap_or(ctx.config().driver.batch_size);
    let schedule = plan_batches(args.total, batch_size, args.start_index, args.resume)?;

    emit(ctx.output(), &schedule, || {
        println!(
            "{} items from index {} in batches of {} ({} total batches)",
            schedule.remaining_items(),
            schedule.first_index,
            schedule.batch_size,
            schedule.total_batches
        );
        for batch in &schedule.batches {
            println!(
                "  batch {:>3}: items {:>4}..={:<4} ({} items{})",
                batch.batch_number,
                batch.start_index,
                batch.last_index(),
                batch.size,
                if batch.is_resume { ", resumes from checkpoint" } else { "" }
            );
        }
    })
}
