//! Forward steps with bounded retries.

use carousel_core_types::{Direction, Fingerprint};
use carousel_nav::{CarouselNavigator, Confirmation};
use tracing::{info, warn};

use crate::errors::FlowError;

/// Step forward onto `target_index` and return its proven fingerprint.
///
/// Each unconfirmed attempt is followed by a fresh read: a step that landed
/// after its window closed is accepted instead of being issued again, since a
/// second step would skip an item.
pub async fn advance_confirmed(
    navigator: &CarouselNavigator,
    prev: &Fingerprint,
    target_index: usize,
    retries: u32,
) -> Result<Fingerprint, FlowError> {
    let attempts = retries + 1;
    let mut last_seen = prev.clone();

    for attempt in 1..=attempts {
        match navigator.advance(Direction::Forward, prev).await? {
            Confirmation::Confirmed { fingerprint, .. } => return Ok(fingerprint),
            Confirmation::Unverifiable { reason } => {
                warn!(item_index = target_index, "advance unverifiable: {}", reason);
                return Err(FlowError::AdvanceNotConfirmed {
                    item_index: target_index,
                    last_seen: Fingerprint::empty(),
                    attempts: attempt,
                });
            }
            Confirmation::NotConfirmed { last_seen: seen, .. } => {
                last_seen = seen;
                let late = navigator.current().await?;
                if late.differs_from(prev) {
                    info!(item_index = target_index, fingerprint = %late, "advance landed after its window");
                    return Ok(late);
                }
                if attempt < attempts {
                    warn!(
                        item_index = target_index,
                        attempt,
                        attempts,
                        "advance not confirmed; retrying"
                    );
                }
            }
        }
    }

    Err(FlowError::AdvanceNotConfirmed {
        item_index: target_index,
        last_seen,
        attempts,
    })
}
