//! Whole-run retries.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::drain::pause_cancellable;
use crate::errors::FlowError;
use crate::orchestrator::BatchOrchestrator;
use crate::types::{RunReport, RunRequest};

/// Run until done, re-running from the checkpoint after retryable failures.
///
/// Each re-run forces `resume`, pauses `run_retry.pause_ms` first, and the
/// number of re-runs is bounded by `run_retry.max_attempts`. The returned
/// report is the final attempt's, with `attempts` counting every run.
pub async fn run_until_done(
    orchestrator: &BatchOrchestrator,
    request: RunRequest,
    cancel: &CancellationToken,
) -> Result<RunReport, FlowError> {
    let retry = orchestrator.config().run_retry.clone();
    let pause = Duration::from_millis(retry.pause_ms);
    let mut request = request;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match orchestrator.run(&request, cancel).await {
            Ok(mut report) => {
                report.attempts = attempt;
                return Ok(report);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || attempt > retry.max_attempts || cancel.is_cancelled() {
            return Err(err);
        }

        warn!(
            attempt,
            max_retries = retry.max_attempts,
            pause_ms = retry.pause_ms,
            "retryable failure, resuming from checkpoint after pause: {}",
            err
        );
        if !pause_cancellable(pause, pause, cancel, |_| async {}).await {
            return Err(FlowError::Cancelled {
                next_index: err.item_index(),
                last_cursor: err.last_cursor().cloned(),
            });
        }
        info!(attempt = attempt + 1, "re-running");
        request.resume = true;
    }
}
