//! Waiting for the external processing queue.

use std::sync::Arc;
use std::time::Duration;

use carousel_nav::{poll_until_cancellable, PollOutcome, PollPolicy, RemoteView};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;

/// One read of the queue indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReading {
    Depth(u32),
    Unreadable,
}

impl QueueReading {
    pub fn depth(self) -> Option<u32> {
        match self {
            QueueReading::Depth(depth) => Some(depth),
            QueueReading::Unreadable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Depth reached zero
    Drained,
    /// Indicator unreadable several times in a row; treated as drained
    Unreadable,
    /// Depth stopped changing for longer than the stuck threshold
    Stuck,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// First readable depth
    pub initial_depth: Option<u32>,
    pub last_depth: Option<u32>,
    pub elapsed: Duration,
    pub polls: u32,
}

impl DrainReport {
    pub fn is_drained(&self) -> bool {
        matches!(self.outcome, DrainOutcome::Drained | DrainOutcome::Unreadable)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainSettings {
    pub policy: PollPolicy,
    pub stuck_threshold_ms: u64,
    pub stuck_min_elapsed_ms: u64,
    pub unreadable_threshold: u32,
}

impl From<&DriverConfig> for DrainSettings {
    fn from(cfg: &DriverConfig) -> Self {
        Self {
            policy: cfg.queue_policy(),
            stuck_threshold_ms: cfg.queue_stuck_threshold_ms,
            stuck_min_elapsed_ms: cfg.queue_stuck_min_elapsed_ms,
            unreadable_threshold: cfg.queue_unreadable_threshold.max(1),
        }
    }
}

/// Tracks readings across polls and decides when the wait is over.
struct DrainTracker<'a> {
    settings: &'a DrainSettings,
    started: Instant,
    initial_depth: Option<u32>,
    last_depth: Option<u32>,
    last_change: Instant,
    unreadable_streak: u32,
    verdict: Option<DrainOutcome>,
}

impl<'a> DrainTracker<'a> {
    fn new(settings: &'a DrainSettings, started: Instant) -> Self {
        Self {
            settings,
            started,
            initial_depth: None,
            last_depth: None,
            last_change: started,
            unreadable_streak: 0,
            verdict: None,
        }
    }

    fn observe(&mut self, reading: QueueReading, now: Instant) -> bool {
        let depth = match reading {
            QueueReading::Unreadable => {
                self.unreadable_streak += 1;
                if self.unreadable_streak >= self.settings.unreadable_threshold {
                    self.verdict = Some(DrainOutcome::Unreadable);
                    return true;
                }
                return false;
            }
            QueueReading::Depth(depth) => depth,
        };

        self.unreadable_streak = 0;
        if self.initial_depth.is_none() {
            self.initial_depth = Some(depth);
        }
        if self.last_depth != Some(depth) {
            self.last_depth = Some(depth);
            self.last_change = now;
        }
        if depth == 0 {
            self.verdict = Some(DrainOutcome::Drained);
            return true;
        }

        let threshold = Duration::from_millis(self.settings.stuck_threshold_ms);
        let min_elapsed = Duration::from_millis(self.settings.stuck_min_elapsed_ms);
        if !threshold.is_zero()
            && now.duration_since(self.started) >= min_elapsed
            && now.duration_since(self.last_change) >= threshold
        {
            self.verdict = Some(DrainOutcome::Stuck);
            return true;
        }
        false
    }
}

pub struct QueueDrainer {
    remote: Arc<dyn RemoteView>,
    settings: DrainSettings,
}

impl QueueDrainer {
    pub fn new(remote: Arc<dyn RemoteView>, settings: DrainSettings) -> Self {
        Self { remote, settings }
    }

    pub fn settings(&self) -> &DrainSettings {
        &self.settings
    }

    /// One read, folding read errors into `Unreadable`.
    pub async fn read(&self) -> QueueReading {
        read_queue(self.remote.as_ref()).await
    }

    /// Poll until the queue drains, stalls, times out or `cancel` fires.
    ///
    /// `on_poll` sees every reading, for progress reporting.
    pub async fn wait_for_drain<F>(&self, cancel: &CancellationToken, mut on_poll: F) -> DrainReport
    where
        F: FnMut(QueueReading),
    {
        let started = Instant::now();
        let mut tracker = DrainTracker::new(&self.settings, started);
        let remote = self.remote.as_ref();

        let outcome = poll_until_cancellable(
            &self.settings.policy,
            cancel,
            || async move { Some(read_queue(remote).await) },
            |reading| {
                on_poll(*reading);
                tracker.observe(*reading, Instant::now())
            },
        )
        .await;

        let (outcome_kind, polls, elapsed) = match outcome {
            PollOutcome::Met { polls, elapsed, .. } => (
                tracker.verdict.unwrap_or(DrainOutcome::Drained),
                polls,
                elapsed,
            ),
            PollOutcome::TimedOut { polls, elapsed, .. } => (DrainOutcome::TimedOut, polls, elapsed),
            PollOutcome::Cancelled { polls, elapsed, .. } => {
                (DrainOutcome::Cancelled, polls, elapsed)
            }
        };

        let report = DrainReport {
            outcome: outcome_kind,
            initial_depth: tracker.initial_depth,
            last_depth: tracker.last_depth,
            elapsed,
            polls,
        };

        match report.outcome {
            DrainOutcome::Drained => info!(
                initial_depth = ?report.initial_depth,
                elapsed_ms = report.elapsed.as_millis() as u64,
                polls,
                "queue drained"
            ),
            DrainOutcome::Unreadable => warn!(
                polls,
                "queue indicator unreadable; treating queue as drained"
            ),
            DrainOutcome::Stuck => warn!(
                depth = ?report.last_depth,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "queue depth stopped changing"
            ),
            DrainOutcome::TimedOut => warn!(
                depth = ?report.last_depth,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "queue did not drain in time"
            ),
            DrainOutcome::Cancelled => debug!("queue wait cancelled"),
        }

        report
    }
}

async fn read_queue(remote: &dyn RemoteView) -> QueueReading {
    match remote.queue_depth().await {
        Ok(Some(depth)) => QueueReading::Depth(depth),
        Ok(None) => QueueReading::Unreadable,
        Err(err) => {
            debug!("queue read failed: {}", err);
            QueueReading::Unreadable
        }
    }
}

/// Sleep for `total` in `tick` slices, stopping early on cancellation.
///
/// `on_tick` runs after each slice with the time waited so far. Returns
/// `false` when cancelled.
pub async fn pause_cancellable<F, Fut>(
    total: Duration,
    tick: Duration,
    cancel: &CancellationToken,
    mut on_tick: F,
) -> bool
where
    F: FnMut(Duration) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let started = Instant::now();
    let deadline = started + total;
    let tick = tick.max(Duration::from_millis(1));
    loop {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = sleep(tick.min(deadline - now)) => {}
        }
        on_tick(started.elapsed()).await;
    }
}
