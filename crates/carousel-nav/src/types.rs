//! Core data types for navigation and action primitives

use std::time::Duration;

use carousel_core_types::{ActionKind, Fingerprint};
use serde::{Deserialize, Serialize};

/// Outcome of a confirmed navigation step.
///
/// Three states, never two:
/// - Confirmed: the visible fingerprint is non-empty and differs from the baseline
/// - NotConfirmed: the window elapsed with no such change
/// - Unverifiable: there was no baseline to compare against, so nothing was issued
///
/// Callers must handle `Unverifiable` explicitly. It is never a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed {
        fingerprint: Fingerprint,
        polls: u32,
        elapsed: Duration,
    },
    NotConfirmed {
        last_seen: Fingerprint,
        polls: u32,
        elapsed: Duration,
    },
    Unverifiable {
        reason: String,
    },
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed { .. })
    }

    /// Fingerprint proven by the step, if any.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Confirmation::Confirmed { fingerprint, .. } => Some(fingerprint),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Confirmation::Confirmed { .. } => "confirmed",
            Confirmation::NotConfirmed { .. } => "not_confirmed",
            Confirmation::Unverifiable { .. } => "unverifiable",
        }
    }
}

/// Attempt record for one per-item action.
///
/// Finalized either on confirmation or when the retry budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub item_index: usize,
    pub action_kind: ActionKind,
    pub confirmed: bool,
    pub attempt_count: u32,
}

impl ActionRecord {
    pub fn new(item_index: usize, action_kind: ActionKind) -> Self {
        Self {
            item_index,
            action_kind,
            confirmed: false,
            attempt_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_confirmed_exposes_fingerprint() {
        let ok = Confirmation::Confirmed {
            fingerprint: Fingerprint::new("b"),
            polls: 2,
            elapsed: Duration::from_millis(500),
        };
        assert!(ok.is_confirmed());
        assert_eq!(ok.fingerprint().map(|f| f.as_str()), Some("b"));

        let unverifiable = Confirmation::Unverifiable {
            reason: "no baseline".into(),
        };
        assert!(!unverifiable.is_confirmed());
        assert!(unverifiable.fingerprint().is_none());
        assert_eq!(unverifiable.label(), "unverifiable");
    }

    #[test]
    fn record_starts_unconfirmed() {
        let record = ActionRecord::new(4, ActionKind::Download);
        assert!(!record.confirmed);
        assert_eq!(record.attempt_count, 0);
    }
}
