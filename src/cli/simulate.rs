use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use batch_flow::{run_until_done, BatchOrchestrator, DriverConfig, FlowError, RunReport, RunRequest};
use carousel_core_types::{ActionKind, ActionSpec, DriverPhase, ProgressUpdate};
use carousel_event_bus::{to_mpsc, InMemoryBus, ProgressBus};
use carousel_sim::{FaultPlan, SimCarousel, SimConfig};
use clap::Args;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Items in the carousel (and in the work list)
    #[arg(long, default_value_t = 12)]
    pub total: usize,

    /// Items per simulated job
    #[arg(long, default_value_t = 4)]
    pub job_size: usize,

    /// Items per batch (defaults to the configured batch size)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Action issued on every item
    #[arg(long, default_value = "upscale_subtle")]
    pub action: String,

    /// Continue after the stored checkpoint
    #[arg(long)]
    pub resume: bool,

    /// First item when no checkpoint is used
    #[arg(long, default_value_t = 0)]
    pub start_index: usize,

    /// Stop cleanly after this many batches
    #[arg(long)]
    pub stop_after: Option<usize>,

    /// Seed for the simulated job ids; keep it to resume across invocations
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Checkpoint job key (defaults to the configured one)
    #[arg(long)]
    pub job: Option<String>,

    /// No remote latency and millisecond poll intervals
    #[arg(long)]
    pub fast: bool,

    /// Run once instead of re-running after retryable failures
    #[arg(long)]
    pub no_retry: bool,

    /// Steps stop taking effect at this index
    #[arg(long)]
    pub stuck_from: Option<usize>,

    /// Drop one step leaving each of these indices
    #[arg(long, value_delimiter = ',')]
    pub drop_step_at: Vec<usize>,

    /// Ignore triggers at these indices
    #[arg(long, value_delimiter = ',')]
    pub ignore_action_at: Vec<usize>,

    /// Ignore only the first trigger at each --ignore-action-at index
    #[arg(long)]
    pub ignore_once: bool,

    /// Make the next N jumps miss their target
    #[arg(long, default_value_t = 0)]
    pub lands_behind: u32,

    /// Where a missed jump lands relative to its target
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub landing_offset: isize,

    #[arg(long)]
    pub queue_never_drains: bool,

    #[arg(long)]
    pub queue_unreadable: bool,
}

impl SimulateArgs {
    fn faults(&self) -> FaultPlan {
        let mut faults =
            FaultPlan::none().goto_lands_off_by(self.lands_behind, self.landing_offset);
        if let Some(index) = self.stuck_from {
            faults = faults.stuck_from(index);
        }
        for index in &self.drop_step_at {
            faults = faults.drop_step_at(*index);
        }
        for index in &self.ignore_action_at {
            faults = faults.ignore_action_at(*index);
        }
        if self.ignore_once {
            faults = faults.ignore_once();
        }
        if self.queue_never_drains {
            faults = faults.queue_never_drains();
        }
        if self.queue_unreadable {
            faults = faults.queue_unreadable();
        }
        faults
    }
}

#[derive(Serialize)]
struct SimulationOutput<'a> {
    report: &'a RunReport,
    /// Indices the simulated remote registered an action for, in order
    remote_actions: Vec<usize>,
    elapsed_ms: u64,
}

pub async fn cmd_simulate(args: SimulateArgs, ctx: &CliContext) -> Result<()> {
    let mut driver = ctx.config().driver.clone();
    if let Some(batch_size) = args.batch_size {
        driver.batch_size = batch_size;
    }
    let mut sim_config = SimConfig::default()
        .with_total(args.total)
        .with_job_size(args.job_size)
        .with_seed(args.seed);
    if args.fast {
        sim_config = sim_config.instant();
        apply_fast_profile(&mut driver);
    }

    let sim = SimCarousel::new(sim_config, args.faults());
    let store = ctx.checkpoint_store(args.job.as_deref())?;
    let bus: Arc<ProgressBus> = InMemoryBus::new(256);
    let orchestrator = BatchOrchestrator::new(sim.clone(), store, driver)
        .context("building orchestrator")?
        .with_progress(bus.clone());

    let mut request = RunRequest::new(ActionSpec::repeat(
        ActionKind::parse(&args.action),
        args.total,
    ))
    .resuming(args.resume)
    .starting_at(args.start_index);
    if let Some(batches) = args.stop_after {
        request = request.stop_after(batches);
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping at the next item boundary");
                cancel.cancel();
            }
        })
    };
    let printer = ctx
        .output()
        .is_human()
        .then(|| spawn_progress_printer(bus.clone()));

    let started = Instant::now();
    let result = if args.no_retry {
        orchestrator.run(&request, &cancel).await
    } else {
        run_until_done(&orchestrator, request, &cancel).await
    };
    let elapsed = started.elapsed();
    interrupt.abort();

    // Closing the bus lets the printer drain and exit.
    drop(orchestrator);
    drop(bus);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if ctx.output().is_human() {
                print_failure_hint(&err);
            }
            return Err(err).context("simulated run failed");
        }
    };

    let output = SimulationOutput {
        report: &report,
        remote_actions: sim.acted_indices(),
        elapsed_ms: elapsed.as_millis() as u64,
    };
    emit(ctx.output(), &output, || print_report(&report, elapsed))
}

fn apply_fast_profile(driver: &mut DriverConfig) {
    driver.advance_poll_ms = 5;
    driver.advance_timeout_ms = 250;
    driver.action_poll_ms = 5;
    driver.action_timeout_ms = 250;
    driver.resume_backoff_ms = 10;
    driver.address_settle_ms = 0;
    driver.queue_poll_ms = 5;
    driver.queue_drain_max_wait_ms = 5_000;
    driver.finalization.fallback_ms = 50;
    driver.finalization.min_ms = 10;
    driver.finalization.max_ms = 200;
    driver.finalization.poll_ms = 10;
    driver.run_retry.pause_ms = 50;
}

fn spawn_progress_printer(bus: Arc<ProgressBus>) -> JoinHandle<()> {
    let mut rx = to_mpsc(bus, 256);
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if let Some(line) = progress_line(&update) {
                println!("{}", line);
            }
        }
    })
}

fn progress_line(update: &ProgressUpdate) -> Option<String> {
    let batch = format!("[batch {}/{}]", update.batch_number, update.total_batches);
    let item = |index: usize| format!("item {}/{}", index + 1, update.total_items);
    let line = match (update.state, update.item_index) {
        (DriverPhase::Acting, Some(index)) => format!("{} acting on {}", batch, item(index)),
        (DriverPhase::Resuming, Some(index)) => {
            format!("{} resuming at {}", batch, item(index))
        }
        (DriverPhase::FreshStart, Some(index)) => {
            format!("{} positioning at {}", batch, item(index))
        }
        (DriverPhase::BatchComplete, Some(index)) => {
            format!("{} complete through {}", batch, item(index))
        }
        (DriverPhase::Draining, _) => match update.queue_depth {
            Some(depth) => format!("{} waiting for queue (depth {})", batch, depth),
            None => return None,
        },
        (DriverPhase::Finalizing, _) => format!("{} letting the remote finalize", batch),
        _ => return None,
    };
    Some(line)
}

fn print_report(report: &RunReport, elapsed: Duration) {
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    println!(
        "Run {} {}: acted on {} of {} items ({} failed), batches {}/{}, {} attempt(s), {}",
        report.run_id,
        report.final_phase,
        report.acted.len(),
        report.total_items,
        report.failed.len(),
        report.batches_completed,
        report.total_batches,
        report.attempts,
        humantime::format_duration(elapsed)
    );
    if let Some(index) = report.resumed_from {
        println!("- Resumed after item {}", index);
    }
    if !report.failed.is_empty() {
        println!("- Failed items: {:?}", report.failed);
    }
    match &report.last_checkpoint {
        Some(cursor) => println!("- Last checkpoint: {}", cursor),
        None => println!("- No checkpoint saved"),
    }
    if report.final_phase == DriverPhase::Stopped {
        println!("- Continue with --resume");
    }
}

fn print_failure_hint(err: &FlowError) {
    match err.last_cursor() {
        Some(cursor) => eprintln!("Last checkpoint: {}", cursor),
        None => eprintln!("No checkpoint covers this run"),
    }
    if let Some(index) = err.item_index() {
        eprintln!("Failing item: {}", index);
    }
    if err.is_retryable() {
        eprintln!("The failure is retryable; continue with --resume");
    }
}
