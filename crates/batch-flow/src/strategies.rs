//! Backoff and wait computations

use tokio::time::Duration;
use tracing::info;

use crate::config::FinalizationConfig;
use crate::drain::DrainReport;

const MAX_BACKOFF_MS: u64 = 60_000;

/// Exponential backoff: `base_ms * 2^(attempt-1)`, capped at 60 seconds.
pub fn backoff(base_ms: u64, attempt: u32) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
    let total_ms = base_ms.saturating_mul(multiplier);
    Duration::from_millis(total_ms.min(MAX_BACKOFF_MS))
}

/// How long to let the remote finish in-flight items after a drain.
///
/// Extrapolates `processing_slots` items at the observed per-item drain rate
/// when the queue actually reached zero from a deep enough start; otherwise
/// the fixed fallback applies.
pub fn finalization_wait(cfg: &FinalizationConfig, report: Option<&DrainReport>) -> Duration {
    let fallback = Duration::from_millis(cfg.fallback_ms);
    let Some(report) = report else {
        info!(wait_ms = cfg.fallback_ms, "no drain observed; using fallback finalization");
        return fallback;
    };

    match report.initial_depth {
        Some(depth)
            if report.is_drained()
                && depth > 0
                && depth >= cfg.min_extrapolation_depth
                && !report.elapsed.is_zero() =>
        {
            let per_item_ms = report.elapsed.as_millis() as u64 / depth as u64;
            let wait_ms = per_item_ms
                .saturating_mul(cfg.processing_slots as u64)
                .clamp(cfg.min_ms, cfg.max_ms.max(cfg.min_ms));
            info!(
                depth,
                elapsed_ms = report.elapsed.as_millis() as u64,
                per_item_ms,
                wait_ms,
                "extrapolated finalization wait"
            );
            Duration::from_millis(wait_ms)
        }
        _ => {
            info!(
                wait_ms = cfg.fallback_ms,
                drained = report.is_drained(),
                initial_depth = ?report.initial_depth,
                "using fallback finalization wait"
            );
            fallback
        }
    }
}
