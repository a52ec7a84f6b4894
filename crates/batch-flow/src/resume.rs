//! Re-establishing the remote view after a checkpoint or from a position.

use std::sync::Arc;

use carousel_core_types::{Cursor, Direction, Fingerprint};
use carousel_nav::{CarouselNavigator, Confirmation, NavError};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::advance::advance_confirmed;
use crate::config::DriverConfig;
use crate::errors::FlowError;
use crate::strategies::backoff;

/// How the first batch of a run reaches its first item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeStrategy {
    /// Jump to a saved cursor and prove the view moved one past it
    CursorResume(Cursor),
    /// Open the first item and step forward `start_index` times
    PositionResume { start_index: usize },
}

impl ResumeStrategy {
    /// Index of the first item the run will act on.
    pub fn first_index(&self) -> usize {
        match self {
            ResumeStrategy::CursorResume(cursor) => cursor.index_hint() + 1,
            ResumeStrategy::PositionResume { start_index } => *start_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSettings {
    pub resume_retries: u32,
    pub resume_backoff_ms: u64,
    pub baseline_retries: u32,
    pub advance_retries: u32,
}

impl From<&DriverConfig> for ResumeSettings {
    fn from(cfg: &DriverConfig) -> Self {
        Self {
            resume_retries: cfg.resume_retries,
            resume_backoff_ms: cfg.resume_backoff_ms,
            baseline_retries: cfg.baseline_retries,
            advance_retries: cfg.advance_retries,
        }
    }
}

/// The view is on the item right after the cursor, proven by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeOutcome {
    pub fingerprint: Fingerprint,
    pub attempts: u32,
}

enum AttemptError {
    /// Worth another full sequence
    Retry(String),
    /// Stop now
    Fatal(FlowError),
}

pub struct ResumeVerifier {
    navigator: Arc<CarouselNavigator>,
    settings: ResumeSettings,
}

impl ResumeVerifier {
    pub fn new(navigator: Arc<CarouselNavigator>, settings: ResumeSettings) -> Self {
        Self {
            navigator,
            settings,
        }
    }

    /// Jump to `cursor`, step once, and prove the view is on the next item.
    ///
    /// The post-jump baseline must equal the cursor's fingerprint, and the
    /// fingerprint after the step must differ from both. A jump that lands
    /// on any other item, or an address bar that still shows the previous
    /// item, fails the attempt and the whole sequence is retried.
    pub async fn resume(&self, cursor: &Cursor) -> Result<ResumeOutcome, FlowError> {
        let attempts = self.settings.resume_retries + 1;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            match self.try_resume(cursor).await {
                Ok(fingerprint) => {
                    info!(
                        item_index = cursor.index_hint() + 1,
                        attempt,
                        fingerprint = %fingerprint,
                        "resume verified"
                    );
                    return Ok(ResumeOutcome {
                        fingerprint,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retry(reason)) => {
                    warn!(
                        item_index = cursor.index_hint(),
                        attempt,
                        attempts,
                        "resume attempt failed: {}",
                        reason
                    );
                    last_reason = reason;
                    if attempt < attempts {
                        sleep(backoff(self.settings.resume_backoff_ms, attempt)).await;
                    }
                }
            }
        }

        Err(FlowError::ResumeVerificationFailed {
            address: cursor.address().to_string(),
            index: cursor.index_hint(),
            attempts,
            reason: last_reason,
        })
    }

    async fn try_resume(&self, cursor: &Cursor) -> Result<Fingerprint, AttemptError> {
        let baseline = self.jump_with_baseline(cursor).await?;

        // The jump must land on the checkpointed item itself; any other
        // item would shift every following action by the landing error.
        if cursor.has_fingerprint() && &baseline != cursor.fingerprint() {
            return Err(AttemptError::Retry(format!(
                "jump landed on {} instead of the checkpointed item {}",
                baseline,
                cursor.fingerprint()
            )));
        }

        let confirmation = self
            .navigator
            .advance(Direction::Forward, &baseline)
            .await
            .map_err(nav_attempt_error)?;

        match confirmation {
            Confirmation::Confirmed { fingerprint, .. } => {
                if cursor.has_fingerprint() && &fingerprint == cursor.fingerprint() {
                    return Err(AttemptError::Retry(format!(
                        "view advanced onto the checkpointed item {} itself; jump landed behind",
                        cursor.fingerprint()
                    )));
                }
                Ok(fingerprint)
            }
            Confirmation::NotConfirmed { last_seen, .. } => Err(AttemptError::Retry(format!(
                "advance past checkpoint not confirmed (last seen {})",
                last_seen
            ))),
            Confirmation::Unverifiable { reason } => Err(AttemptError::Retry(reason)),
        }
    }

    /// Jump until a fingerprint shows, up to `baseline_retries` extra jumps.
    async fn jump_with_baseline(&self, cursor: &Cursor) -> Result<Fingerprint, AttemptError> {
        let jumps = self.settings.baseline_retries + 1;
        for jump in 1..=jumps {
            self.navigator
                .jump(cursor.address())
                .await
                .map_err(nav_attempt_error)?;
            let baseline = self.navigator.await_visible().await;
            if !baseline.is_empty() {
                return Ok(baseline);
            }
            warn!(address = cursor.address(), jump, jumps, "no fingerprint after jump");
        }

        Err(AttemptError::Fatal(FlowError::ResumeVerificationFailed {
            address: cursor.address().to_string(),
            index: cursor.index_hint(),
            attempts: 1,
            reason: format!("no baseline fingerprint after {} jumps", jumps),
        }))
    }

    /// Open the first item and step to `start_index`, confirming every step.
    pub async fn position_resume(&self, start_index: usize) -> Result<Fingerprint, FlowError> {
        self.navigator.open_first().await?;
        let mut current = self.navigator.await_visible().await;
        if current.is_empty() {
            return Err(FlowError::ResumeVerificationFailed {
                address: "<first item>".to_string(),
                index: 0,
                attempts: 1,
                reason: "no fingerprint after opening the first item".to_string(),
            });
        }

        for index in 1..=start_index {
            current = advance_confirmed(
                &self.navigator,
                &current,
                index,
                self.settings.advance_retries,
            )
            .await?;
            debug!(item_index = index, "positioned");
        }

        info!(start_index, fingerprint = %current, "position established");
        Ok(current)
    }
}

fn nav_attempt_error(err: NavError) -> AttemptError {
    if err.is_retryable() {
        AttemptError::Retry(err.to_string())
    } else {
        AttemptError::Fatal(FlowError::Nav(err))
    }
}
