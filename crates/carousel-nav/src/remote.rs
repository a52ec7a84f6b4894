//! The remote view seam.
//!
//! Everything the driver knows about the outside world goes through
//! [`RemoteView`]. Implementations issue operations and expose polled state;
//! none of them acknowledges that an operation took effect. Proof of effect is
//! the job of the navigator and the executor.

use async_trait::async_trait;
use carousel_core_types::{ActionKind, Direction, Fingerprint};

use crate::errors::RemoteError;

#[async_trait]
pub trait RemoteView: Send + Sync {
    /// Jump directly to `address`. Returns once the jump was issued.
    async fn goto(&self, address: &str) -> Result<(), RemoteError>;

    /// Open the first item of the sequence in detail view.
    async fn open_first(&self) -> Result<(), RemoteError>;

    /// Issue one single-step move. Fire-and-forget.
    async fn step(&self, direction: Direction) -> Result<(), RemoteError>;

    /// Fire the action trigger for the visible item. Fire-and-forget.
    async fn trigger(&self, kind: &ActionKind) -> Result<(), RemoteError>;

    /// Content identity of the visible item, `None` while nothing is loaded.
    async fn fingerprint(&self) -> Result<Option<String>, RemoteError>;

    /// Current navigable address of the view. May lag behind the visible item.
    async fn address(&self) -> Result<String, RemoteError>;

    /// Monotonic indicator that changes once an action of `kind` registers.
    ///
    /// `None` means the indicator is not readable right now.
    async fn action_marker(&self, kind: &ActionKind) -> Result<Option<u64>, RemoteError>;

    /// Depth of the external processing queue.
    ///
    /// `Some(0)` when the indicator is absent, `None` when it exists but
    /// cannot be read.
    async fn queue_depth(&self) -> Result<Option<u32>, RemoteError>;

    /// Navigable address derived from a fingerprint, when the remote's
    /// fingerprints embed enough to rebuild one.
    fn address_for(&self, _fingerprint: &Fingerprint) -> Option<String> {
        None
    }

    /// Leave the detail view (close the lightbox) before waiting on the queue.
    async fn leave_detail(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Read the visible fingerprint, folding "not loaded" into the empty value.
pub async fn read_fingerprint(remote: &dyn RemoteView) -> Result<Fingerprint, RemoteError> {
    remote.fingerprint().await.map(Fingerprint::from)
}
