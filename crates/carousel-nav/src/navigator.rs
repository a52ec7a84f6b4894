//! Carousel navigator: single-step moves with proof of effect.

use std::sync::Arc;
use std::time::Duration;

use carousel_core_types::{Cursor, Direction, Fingerprint};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::address;
use crate::errors::NavError;
use crate::remote::{read_fingerprint, RemoteView};
use crate::types::Confirmation;
use crate::waiting::{poll_until, PollOutcome, PollPolicy};

/// Timing for navigator operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavSettings {
    /// Confirmation window for one advance
    pub advance: PollPolicy,

    /// Window for a fingerprint to show up after a jump or open
    pub baseline: PollPolicy,

    /// Settle time before trusting the address bar (milliseconds)
    pub address_settle_ms: u64,
}

impl Default for NavSettings {
    fn default() -> Self {
        Self {
            advance: PollPolicy::new(500, 8000),
            baseline: PollPolicy::new(500, 8000),
            address_settle_ms: 1500,
        }
    }
}

pub struct CarouselNavigator {
    remote: Arc<dyn RemoteView>,
    settings: NavSettings,
}

impl CarouselNavigator {
    pub fn new(remote: Arc<dyn RemoteView>, settings: NavSettings) -> Self {
        Self { remote, settings }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteView> {
        &self.remote
    }

    pub fn settings(&self) -> &NavSettings {
        &self.settings
    }

    /// One read of the visible fingerprint.
    pub async fn current(&self) -> Result<Fingerprint, NavError> {
        Ok(read_fingerprint(self.remote.as_ref()).await?)
    }

    /// Jump directly to `address`.
    pub async fn jump(&self, address: &str) -> Result<(), NavError> {
        debug!(address, "jumping to address");
        self.remote.goto(address).await?;
        Ok(())
    }

    pub async fn open_first(&self) -> Result<(), NavError> {
        debug!("opening first item");
        self.remote.open_first().await?;
        Ok(())
    }

    /// Poll until some fingerprint is visible.
    ///
    /// Returns the empty fingerprint if none appeared within the baseline window.
    pub async fn await_visible(&self) -> Fingerprint {
        let remote = self.remote.as_ref();
        let outcome = poll_until(
            &self.settings.baseline,
            || async move { probe_fingerprint(remote).await },
            |fp| !fp.is_empty(),
        )
        .await;

        match outcome {
            PollOutcome::Met { value, .. } => value,
            other => {
                debug!(
                    polls = other.polls(),
                    elapsed_ms = other.elapsed().as_millis() as u64,
                    "no fingerprint became visible"
                );
                Fingerprint::empty()
            }
        }
    }

    /// Issue one step and confirm the visible item changed.
    ///
    /// The workflow is:
    /// 1. Refuse to issue anything without a baseline (`Unverifiable`)
    /// 2. Issue the single-step move
    /// 3. Poll until the fingerprint is non-empty and differs from `prev`
    /// 4. Report `NotConfirmed` with the last observation on timeout
    ///
    /// Calling again after `NotConfirmed` is safe and consumes a fresh window.
    pub async fn advance(
        &self,
        direction: Direction,
        prev: &Fingerprint,
    ) -> Result<Confirmation, NavError> {
        if prev.is_empty() {
            warn!(%direction, "refusing to advance without a baseline fingerprint");
            return Ok(Confirmation::Unverifiable {
                reason: "no baseline fingerprint to compare against".to_string(),
            });
        }

        self.remote.step(direction).await?;

        let remote = self.remote.as_ref();
        let outcome = poll_until(
            &self.settings.advance,
            || async move { probe_fingerprint(remote).await },
            |fp| fp.differs_from(prev),
        )
        .await;

        let confirmation = match outcome {
            PollOutcome::Met {
                value,
                polls,
                elapsed,
            } => Confirmation::Confirmed {
                fingerprint: value,
                polls,
                elapsed,
            },
            PollOutcome::TimedOut {
                last,
                polls,
                elapsed,
            }
            | PollOutcome::Cancelled {
                last,
                polls,
                elapsed,
            } => Confirmation::NotConfirmed {
                last_seen: last.unwrap_or_default(),
                polls,
                elapsed,
            },
        };

        match &confirmation {
            Confirmation::Confirmed {
                fingerprint,
                polls,
                elapsed,
            } => info!(
                %direction,
                from = %prev,
                to = %fingerprint,
                polls,
                elapsed_ms = elapsed.as_millis() as u64,
                "advance confirmed"
            ),
            Confirmation::NotConfirmed {
                last_seen, polls, ..
            } => warn!(
                %direction,
                prev = %prev,
                last_seen = %last_seen,
                polls,
                "advance not confirmed"
            ),
            Confirmation::Unverifiable { .. } => {}
        }

        Ok(confirmation)
    }

    /// Capture a cursor for the item currently showing `expected`.
    ///
    /// A fingerprint-derived address is preferred. Otherwise the address bar is
    /// read after the settle wait, and the capture is rejected if the view moved
    /// or the address names a different item than the fingerprint.
    pub async fn capture_cursor(
        &self,
        index: usize,
        expected: &Fingerprint,
    ) -> Result<Cursor, NavError> {
        if expected.is_empty() {
            return Err(NavError::NothingVisible(format!(
                "cannot capture item {} without a fingerprint",
                index
            )));
        }

        if let Some(derived) = self.remote.address_for(expected) {
            debug!(item_index = index, address = %derived, "fingerprint-derived cursor");
            return Ok(Cursor::new(derived, index, expected.clone()));
        }

        sleep(Duration::from_millis(self.settings.address_settle_ms)).await;
        let current_address = self.remote.address().await?;
        let observed = self.current().await?;
        if &observed != expected {
            return Err(NavError::Unsettled {
                expected: expected.clone(),
                observed,
            });
        }

        if let (Some(from_address), Some(from_resource)) = (
            address::parse_jobs_address(&current_address),
            address::resource_position(expected.as_str()),
        ) {
            if from_address != from_resource {
                return Err(NavError::AddressMismatch {
                    address: current_address,
                    fingerprint: expected.clone(),
                });
            }
        }

        debug!(item_index = index, address = %current_address, "address-bar cursor");
        Ok(Cursor::new(current_address, index, observed))
    }
}

async fn probe_fingerprint(remote: &dyn RemoteView) -> Option<Fingerprint> {
    match read_fingerprint(remote).await {
        Ok(fp) => Some(fp),
        Err(err) => {
            debug!("fingerprint read failed: {}", err);
            None
        }
    }
}
