//! Flow execution error types

use carousel_checkpoint_store::CheckpointError;
use carousel_core_types::{ActionKind, Cursor, Fingerprint};
use carousel_nav::NavError;
use thiserror::Error;

/// Flow execution errors
///
/// Every bound the driver enforces surfaces here with the failing item and
/// the last cursor that was durably saved.
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    /// Configuration rejected before any remote operation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Work list or start position cannot be partitioned
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// The step onto `item_index` never produced a new fingerprint
    #[error("Advance to item {item_index} not confirmed after {attempts} attempts (last seen {last_seen})")]
    AdvanceNotConfirmed {
        item_index: usize,
        last_seen: Fingerprint,
        attempts: u32,
    },

    /// The action indicator never moved for `item_index`
    #[error("Action {action} on item {item_index} not confirmed after {attempts} attempts")]
    ActionNotConfirmed {
        item_index: usize,
        action: ActionKind,
        attempts: u32,
    },

    /// The view could not be proven to sit right after the checkpoint
    #[error("Resume from item {index} ({address}) failed after {attempts} attempts: {reason}")]
    ResumeVerificationFailed {
        address: String,
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// No cursor could be captured for a batch whose items were acted on
    #[error("Could not capture checkpoint at item {item_index}: {reason}")]
    CheckpointCaptureFailed { item_index: usize, reason: String },

    /// A batch stopped part way through
    #[error("Batch {batch} aborted at item {item_index} (last checkpoint: {}): {cause}", fmt_cursor(.last_cursor))]
    BatchAborted {
        batch: usize,
        item_index: usize,
        last_cursor: Option<Cursor>,
        /// Items confirmed since `last_cursor` that no checkpoint covers
        unsaved_items: usize,
        cause: Box<FlowError>,
    },

    /// External queue did not reach zero in time (or stopped moving)
    #[error("Queue did not drain after batch {batch} within {waited_ms}ms (depth {})", fmt_depth(.depth))]
    DrainTimedOut {
        batch: usize,
        depth: Option<u32>,
        waited_ms: u64,
        stuck: bool,
    },

    /// Cooperative stop requested
    #[error("Run cancelled before item {} (last checkpoint: {})", fmt_index(.next_index), fmt_cursor(.last_cursor))]
    Cancelled {
        next_index: Option<usize>,
        last_cursor: Option<Cursor>,
    },

    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Navigation error: {0}")]
    Nav(#[from] NavError),
}

fn fmt_cursor(cursor: &Option<Cursor>) -> String {
    cursor
        .as_ref()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn fmt_depth(depth: &Option<u32>) -> String {
    depth
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unreadable".to_string())
}

fn fmt_index(index: &Option<usize>) -> String {
    index
        .map(|i| i.to_string())
        .unwrap_or_else(|| "start".to_string())
}

impl FlowError {
    /// Whether a whole-run retry (resuming from the checkpoint) is safe and useful.
    ///
    /// A failure that leaves confirmed items outside any checkpoint is never
    /// retryable: the re-run would act on them again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Nav(err) => err.is_retryable(),
            FlowError::ResumeVerificationFailed { .. }
            | FlowError::DrainTimedOut { .. }
            | FlowError::AdvanceNotConfirmed { .. } => true,
            FlowError::BatchAborted {
                unsaved_items,
                cause,
                ..
            } => *unsaved_items == 0 && cause.is_retryable(),
            FlowError::InvalidConfig(_)
            | FlowError::InvalidPlan(_)
            | FlowError::ActionNotConfirmed { .. }
            | FlowError::CheckpointCaptureFailed { .. }
            | FlowError::Cancelled { .. }
            | FlowError::Checkpoint(_) => false,
        }
    }

    /// Severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            FlowError::Cancelled { .. } => 0,
            FlowError::DrainTimedOut { .. } | FlowError::AdvanceNotConfirmed { .. } => 1,
            FlowError::Nav(err) => err.severity(),
            FlowError::BatchAborted { cause, .. } => cause.severity().max(2),
            FlowError::ActionNotConfirmed { .. }
            | FlowError::ResumeVerificationFailed { .. }
            | FlowError::InvalidConfig(_)
            | FlowError::InvalidPlan(_) => 2,
            FlowError::CheckpointCaptureFailed { .. } | FlowError::Checkpoint(_) => 3,
        }
    }

    /// Item the failure is about, when there is one.
    pub fn item_index(&self) -> Option<usize> {
        match self {
            FlowError::AdvanceNotConfirmed { item_index, .. }
            | FlowError::ActionNotConfirmed { item_index, .. }
            | FlowError::CheckpointCaptureFailed { item_index, .. }
            | FlowError::BatchAborted { item_index, .. } => Some(*item_index),
            FlowError::ResumeVerificationFailed { index, .. } => Some(*index + 1),
            FlowError::Cancelled { next_index, .. } => *next_index,
            _ => None,
        }
    }

    /// Last durably saved cursor carried by the failure, if any.
    pub fn last_cursor(&self) -> Option<&Cursor> {
        match self {
            FlowError::BatchAborted { last_cursor, .. } | FlowError::Cancelled { last_cursor, .. } => {
                last_cursor.as_ref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_nav::RemoteError;

    fn advance_failure() -> FlowError {
        FlowError::AdvanceNotConfirmed {
            item_index: 5,
            last_seen: Fingerprint::new("fp4"),
            attempts: 3,
        }
    }

    #[test]
    fn abort_with_unsaved_items_is_not_retryable() {
        let saved = FlowError::BatchAborted {
            batch: 1,
            item_index: 5,
            last_cursor: None,
            unsaved_items: 0,
            cause: Box::new(advance_failure()),
        };
        assert!(saved.is_retryable());

        let unsaved = FlowError::BatchAborted {
            batch: 1,
            item_index: 5,
            last_cursor: None,
            unsaved_items: 5,
            cause: Box::new(advance_failure()),
        };
        assert!(!unsaved.is_retryable());
    }

    #[test]
    fn unconfirmed_action_is_never_retried_wholesale() {
        let err = FlowError::ActionNotConfirmed {
            item_index: 2,
            action: ActionKind::Download,
            attempts: 2,
        };
        assert!(!err.is_retryable());
        assert_eq!(err.item_index(), Some(2));
    }

    #[test]
    fn transient_nav_errors_are_retryable() {
        let err = FlowError::from(NavError::from(RemoteError::Rejected("rate".into())));
        assert!(err.is_retryable());
    }

    #[test]
    fn messages_name_item_and_checkpoint() {
        let cursor = Cursor::new("https://c/jobs/a?index=1", 4, Fingerprint::new("fp4"));
        let err = FlowError::BatchAborted {
            batch: 1,
            item_index: 5,
            last_cursor: Some(cursor),
            unsaved_items: 0,
            cause: Box::new(advance_failure()),
        };
        let text = err.to_string();
        assert!(text.contains("item 5"));
        assert!(text.contains("#4"));
        assert_eq!(err.severity(), 2);
    }
}
