//! Error types for navigation and action primitives

use carousel_core_types::Fingerprint;
use thiserror::Error;

/// Failures reported by a [`crate::RemoteView`] implementation.
#[derive(Debug, Error, Clone)]
pub enum RemoteError {
    /// Remote session unreachable or a request timed out at the transport level
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// Remote refused the request (rate limit, too many queued jobs)
    #[error("Remote rejected request: {0}")]
    Rejected(String),

    /// Address could not be opened or parsed by the remote
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Unexpected response shape
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Transient errors are worth a pause and a whole-run retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Rejected(_))
    }
}

/// Errors surfaced by the navigator and the action executor.
///
/// Note that an unconfirmed advance or action is *not* an error at this layer:
/// it is a [`crate::Confirmation`] / [`crate::ActionRecord`] value the caller
/// must inspect. Errors here mean the primitive could not even be issued.
#[derive(Debug, Error, Clone)]
pub enum NavError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The view moved away from the item we were about to capture
    #[error("View not settled: expected {expected}, observed {observed}")]
    Unsettled {
        expected: Fingerprint,
        observed: Fingerprint,
    },

    /// Address bar names a different item than the visible fingerprint
    #[error("Address {address} does not match visible item {fingerprint}")]
    AddressMismatch {
        address: String,
        fingerprint: Fingerprint,
    },

    /// No visible item could be observed within the baseline window
    #[error("Nothing visible: {0}")]
    NothingVisible(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NavError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NavError::Remote(err) => err.is_transient(),
            NavError::Unsettled { .. }
            | NavError::AddressMismatch { .. }
            | NavError::NothingVisible(_) => true,
            NavError::Internal(_) => false,
        }
    }

    /// Severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            NavError::Internal(_) => 3,
            NavError::Remote(RemoteError::Protocol(_))
            | NavError::Remote(RemoteError::InvalidAddress(_)) => 2,
            NavError::Remote(_) | NavError::NothingVisible(_) => 1,
            NavError::Unsettled { .. } | NavError::AddressMismatch { .. } => 0,
        }
    }
}
