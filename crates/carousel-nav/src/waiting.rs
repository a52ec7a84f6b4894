//! Bounded polling.
//!
//! Every wait in the driver is a poll with a fixed interval and an explicit
//! timeout. The last sleep is clipped to the deadline, so a poll loop ends no
//! later than `timeout` plus one read.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Interval and timeout for one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Time between reads (milliseconds)
    pub interval_ms: u64,

    /// Give up after this long (milliseconds)
    pub timeout_ms: u64,
}

impl PollPolicy {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_ms: 8000,
        }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Met {
        value: T,
        polls: u32,
        elapsed: Duration,
    },
    TimedOut {
        last: Option<T>,
        polls: u32,
        elapsed: Duration,
    },
    Cancelled {
        last: Option<T>,
        polls: u32,
        elapsed: Duration,
    },
}

impl<T> PollOutcome<T> {
    pub fn is_met(&self) -> bool {
        matches!(self, PollOutcome::Met { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Met { polls, .. }
            | PollOutcome::TimedOut { polls, .. }
            | PollOutcome::Cancelled { polls, .. } => *polls,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            PollOutcome::Met { elapsed, .. }
            | PollOutcome::TimedOut { elapsed, .. }
            | PollOutcome::Cancelled { elapsed, .. } => *elapsed,
        }
    }
}

/// Poll `probe` until `accept` holds for the read value or the policy expires.
///
/// `probe` yields `None` for a round where nothing could be read; such rounds
/// count against the timeout like any other.
pub async fn poll_until<T, F, Fut, A>(policy: &PollPolicy, probe: F, accept: A) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
    A: FnMut(&T) -> bool,
{
    poll_loop(policy, None, probe, accept).await
}

/// Same as [`poll_until`], but `cancel` is checked between reads and wakes
/// the loop out of its sleep.
pub async fn poll_until_cancellable<T, F, Fut, A>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    probe: F,
    accept: A,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
    A: FnMut(&T) -> bool,
{
    poll_loop(policy, Some(cancel), probe, accept).await
}

async fn poll_loop<T, F, Fut, A>(
    policy: &PollPolicy,
    cancel: Option<&CancellationToken>,
    mut probe: F,
    mut accept: A,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
    A: FnMut(&T) -> bool,
{
    let started = Instant::now();
    let deadline = started + policy.timeout();
    let mut polls = 0u32;
    let mut last: Option<T> = None;

    loop {
        if cancel.map(|token| token.is_cancelled()).unwrap_or(false) {
            return PollOutcome::Cancelled {
                last,
                polls,
                elapsed: started.elapsed(),
            };
        }

        polls += 1;
        if let Some(value) = probe().await {
            if accept(&value) {
                return PollOutcome::Met {
                    value,
                    polls,
                    elapsed: started.elapsed(),
                };
            }
            last = Some(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return PollOutcome::TimedOut {
                last,
                polls,
                elapsed: started.elapsed(),
            };
        }

        let nap = policy.interval().min(deadline - now);
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return PollOutcome::Cancelled {
                            last,
                            polls,
                            elapsed: started.elapsed(),
                        };
                    }
                    _ = sleep(nap) => {}
                }
            }
            None => sleep(nap).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn met_on_first_matching_read() {
        let reads = Arc::new(AtomicU32::new(0));
        let counter = reads.clone();
        let outcome = poll_until(
            &PollPolicy::new(100, 1000),
            || {
                let counter = counter.clone();
                async move { Some(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            |n| *n >= 3,
        )
        .await;

        match outcome {
            PollOutcome::Met {
                value,
                polls,
                elapsed,
            } => {
                assert_eq!(value, 3);
                assert_eq!(polls, 3);
                assert_eq!(elapsed, Duration::from_millis(200));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_bounded_by_timeout_plus_one_interval() {
        let policy = PollPolicy::new(300, 1000);
        let started = Instant::now();
        let outcome = poll_until(&policy, || async { Some(0u32) }, |_| false).await;
        let waited = started.elapsed();

        assert!(matches!(outcome, PollOutcome::TimedOut { last: Some(0), .. }));
        assert!(waited >= policy.timeout());
        assert!(waited <= policy.timeout() + policy.interval());
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_rounds_still_consume_the_window() {
        let outcome: PollOutcome<u32> =
            poll_until(&PollPolicy::new(250, 1000), || async { None }, |_| true).await;
        match outcome {
            PollOutcome::TimedOut { last, polls, .. } => {
                assert!(last.is_none());
                assert_eq!(polls, 5);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wakes_the_sleep() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = poll_until_cancellable(
            &PollPolicy::new(5000, 600_000),
            &token,
            || async { Some(7u32) },
            |_| false,
        )
        .await;

        assert!(matches!(outcome, PollOutcome::Cancelled { last: Some(7), .. }));
        assert!(started.elapsed() < Duration::from_millis(5000));
    }
}
