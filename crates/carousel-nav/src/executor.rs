//! Per-item action execution with confirmation.

use std::sync::Arc;

use carousel_core_types::ActionKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::NavError;
use crate::remote::RemoteView;
use crate::types::ActionRecord;
use crate::waiting::{poll_until, PollOutcome, PollPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Confirmation window for one issuance
    pub action: PollPolicy,

    /// Issuances per item, the first included
    pub max_attempts: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            action: PollPolicy::new(500, 10_000),
            max_attempts: 2,
        }
    }
}

/// Fires the action for the visible item and waits for its indicator to move.
///
/// The executor never navigates. The caller has already proven which item is
/// visible; a retry re-issues the trigger on that same item.
pub struct ActionExecutor {
    remote: Arc<dyn RemoteView>,
    settings: ExecutorSettings,
}

impl ActionExecutor {
    pub fn new(remote: Arc<dyn RemoteView>, settings: ExecutorSettings) -> Self {
        Self { remote, settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Act on the visible item.
    ///
    /// Returns a finalized record. `confirmed == false` means every attempt
    /// timed out; policy on that belongs to the caller. An `Err` means the
    /// trigger itself could not be issued on the last attempt.
    pub async fn act(&self, item_index: usize, kind: &ActionKind) -> Result<ActionRecord, NavError> {
        let mut record = ActionRecord::new(item_index, kind.clone());
        let max_attempts = self.settings.max_attempts.max(1);

        while record.attempt_count < max_attempts {
            record.attempt_count += 1;
            let attempt = record.attempt_count;

            let Some(baseline) = self.read_marker(kind).await else {
                warn!(
                    item_index,
                    attempt,
                    action = %kind,
                    "action indicator unreadable; not issuing without a baseline"
                );
                continue;
            };
            if let Err(err) = self.remote.trigger(kind).await {
                warn!(item_index, attempt, action = %kind, "trigger failed: {}", err);
                if attempt >= max_attempts {
                    return Err(err.into());
                }
                continue;
            }

            let remote = self.remote.as_ref();
            let outcome = poll_until(
                &self.settings.action,
                || async move { probe_marker(remote, kind).await },
                |marker| *marker != baseline,
            )
            .await;

            match outcome {
                PollOutcome::Met { polls, elapsed, .. } => {
                    record.confirmed = true;
                    info!(
                        item_index,
                        attempt,
                        action = %kind,
                        polls,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "action confirmed"
                    );
                    return Ok(record);
                }
                other => {
                    warn!(
                        item_index,
                        attempt,
                        action = %kind,
                        polls = other.polls(),
                        "action not confirmed"
                    );
                }
            }
        }

        Ok(record)
    }

    /// Baseline indicator value, polled until readable within the action window.
    async fn read_marker(&self, kind: &ActionKind) -> Option<u64> {
        let remote = self.remote.as_ref();
        match poll_until(
            &self.settings.action,
            || async move { probe_marker(remote, kind).await },
            |_| true,
        )
        .await
        {
            PollOutcome::Met { value, .. } => Some(value),
            _ => None,
        }
    }
}

async fn probe_marker(remote: &dyn RemoteView, kind: &ActionKind) -> Option<u64> {
    match remote.action_marker(kind).await {
        Ok(marker) => marker,
        Err(err) => {
            debug!("action marker read failed: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedView;
    use std::time::Duration;
    use tokio::time::Instant;

    fn executor(view: Arc<ScriptedView>) -> ActionExecutor {
        ActionExecutor::new(view, ExecutorSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_on_first_attempt() {
        let view = ScriptedView::new(3);
        let exec = executor(view.clone());

        let record = exec.act(0, &ActionKind::UpscaleSubtle).await.unwrap();

        assert!(record.confirmed);
        assert_eq!(record.attempt_count, 1);
        assert_eq!(view.acted(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_trigger_is_retried_once() {
        let view = ScriptedView::new(3);
        view.ignore_triggers(1);
        let exec = executor(view.clone());

        let record = exec.act(0, &ActionKind::Download).await.unwrap();

        assert!(record.confirmed);
        assert_eq!(record.attempt_count, 2);
        assert_eq!(view.triggers_issued(), 2);
        assert_eq!(view.acted(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_leave_record_unconfirmed() {
        let view = ScriptedView::new(3);
        view.ignore_triggers(u32::MAX);
        let exec = executor(view.clone());

        let started = Instant::now();
        let record = exec.act(2, &ActionKind::VarySubtle).await.unwrap();

        assert!(!record.confirmed);
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.item_index, 2);
        assert!(started.elapsed() <= Duration::from_millis(2 * (10_000 + 500)));
        assert!(view.acted().is_empty());
        assert_eq!(view.position(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_error_on_last_attempt_surfaces() {
        let view = ScriptedView::new(3);
        view.fail_triggers(true);
        let exec = executor(view.clone());

        let err = exec.act(0, &ActionKind::Download).await.unwrap_err();
        assert!(matches!(err, NavError::Remote(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_indicator_never_counts_as_confirmed() {
        let view = ScriptedView::new(3);
        view.hide_marker(true);
        let exec = executor(view.clone());

        let record = exec.act(0, &ActionKind::Download).await.unwrap();

        assert!(!record.confirmed);
        assert_eq!(record.attempt_count, 2);
        assert_eq!(view.triggers_issued(), 0);
    }
}
