//! Driver configuration
//!
//! Every field has a default; durations are milliseconds.

use carousel_nav::{ExecutorSettings, NavSettings, PollPolicy};
use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// What to do with an item whose action stays unconfirmed after its retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionFailurePolicy {
    /// Abort the batch (resumable from the last checkpoint)
    #[default]
    Abort,
    /// Record the item as failed and move on
    Skip,
}

/// What to do when the queue does not drain in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainTimeoutPolicy {
    #[default]
    Abort,
    Proceed,
}

/// Extra wait after the queue drains while the remote finishes in-flight items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizationConfig {
    pub enabled: bool,
    /// Items the remote processes in parallel
    pub processing_slots: u32,
    /// Smallest initial queue depth worth extrapolating from
    pub min_extrapolation_depth: u32,
    pub fallback_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub poll_ms: u64,
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            processing_slots: 3,
            min_extrapolation_depth: 4,
            fallback_ms: 100_000,
            min_ms: 30_000,
            max_ms: 180_000,
            poll_ms: 1_000,
        }
    }
}

/// Whole-run retry on retryable failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRetryConfig {
    /// Re-runs after the first attempt
    pub max_attempts: u32,
    pub pause_ms: u64,
}

impl Default for RunRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pause_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub batch_size: usize,

    pub advance_timeout_ms: u64,
    pub advance_poll_ms: u64,
    /// Extra advance attempts after the first one fails to confirm
    pub advance_retries: u32,

    pub action_timeout_ms: u64,
    pub action_poll_ms: u64,

    /// Extra full resume sequences after the first one fails
    pub resume_retries: u32,
    pub resume_backoff_ms: u64,
    /// Extra jumps when the resumed view shows no fingerprint
    pub baseline_retries: u32,

    pub address_settle_ms: u64,

    pub queue_poll_ms: u64,
    pub queue_drain_max_wait_ms: u64,
    /// 0 disables stuck-queue detection
    pub queue_stuck_threshold_ms: u64,
    pub queue_stuck_min_elapsed_ms: u64,
    /// Consecutive unreadable reads that count as drained
    pub queue_unreadable_threshold: u32,

    pub on_action_failure: ActionFailurePolicy,
    pub on_drain_timeout: DrainTimeoutPolicy,

    /// Try to save a cursor for the last confirmed item when a run stops early
    pub checkpoint_on_abort: bool,

    pub finalization: FinalizationConfig,
    pub run_retry: RunRetryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            advance_timeout_ms: 8_000,
            advance_poll_ms: 500,
            advance_retries: 2,
            action_timeout_ms: 10_000,
            action_poll_ms: 500,
            resume_retries: 2,
            resume_backoff_ms: 2_000,
            baseline_retries: 2,
            address_settle_ms: 1_500,
            queue_poll_ms: 5_000,
            queue_drain_max_wait_ms: 600_000,
            queue_stuck_threshold_ms: 0,
            queue_stuck_min_elapsed_ms: 180_000,
            queue_unreadable_threshold: 3,
            on_action_failure: ActionFailurePolicy::Abort,
            on_drain_timeout: DrainTimeoutPolicy::Abort,
            checkpoint_on_abort: true,
            finalization: FinalizationConfig::default(),
            run_retry: RunRetryConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Reject configurations that would make a bound meaningless.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.batch_size == 0 {
            return Err(FlowError::InvalidConfig("batch_size must be at least 1".into()));
        }
        let windows = [
            ("advance", self.advance_poll_ms, self.advance_timeout_ms),
            ("action", self.action_poll_ms, self.action_timeout_ms),
            ("queue", self.queue_poll_ms, self.queue_drain_max_wait_ms),
        ];
        for (name, poll_ms, timeout_ms) in windows {
            if timeout_ms == 0 {
                return Err(FlowError::InvalidConfig(format!(
                    "{}_timeout must be greater than zero",
                    name
                )));
            }
            if poll_ms == 0 || poll_ms > timeout_ms {
                return Err(FlowError::InvalidConfig(format!(
                    "{} poll interval {}ms must be within (0, {}ms]",
                    name, poll_ms, timeout_ms
                )));
            }
        }
        if self.finalization.enabled {
            let f = &self.finalization;
            if f.min_ms > f.max_ms {
                return Err(FlowError::InvalidConfig(format!(
                    "finalization min {}ms exceeds max {}ms",
                    f.min_ms, f.max_ms
                )));
            }
            if f.poll_ms == 0 {
                return Err(FlowError::InvalidConfig(
                    "finalization poll interval must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn advance_policy(&self) -> PollPolicy {
        PollPolicy::new(self.advance_poll_ms, self.advance_timeout_ms)
    }

    pub fn nav_settings(&self) -> NavSettings {
        NavSettings {
            advance: self.advance_policy(),
            baseline: self.advance_policy(),
            address_settle_ms: self.address_settle_ms,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            action: PollPolicy::new(self.action_poll_ms, self.action_timeout_ms),
            max_attempts: 2,
        }
    }

    pub fn queue_policy(&self) -> PollPolicy {
        PollPolicy::new(self.queue_poll_ms, self.queue_drain_max_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = DriverConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.advance_policy().timeout_ms, 8_000);
        assert_eq!(cfg.executor_settings().max_attempts, 2);
    }

    #[test]
    fn rejects_zero_batch_and_oversized_poll() {
        let cfg = DriverConfig {
            batch_size: 0,
            ..DriverConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DriverConfig {
            advance_poll_ms: 9_000,
            ..DriverConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = DriverConfig {
            action_timeout_ms: 0,
            ..DriverConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let cfg: DriverConfig =
            serde_json::from_str(r#"{"batch_size": 5, "on_action_failure": "skip"}"#).unwrap();
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.on_action_failure, ActionFailurePolicy::Skip);
        assert_eq!(cfg.advance_timeout_ms, 8_000);
        assert!(!cfg.finalization.enabled);
    }
}
