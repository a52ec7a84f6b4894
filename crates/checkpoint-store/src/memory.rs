use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use carousel_core_types::Cursor;

use crate::api::{validate, CheckpointResult, CheckpointStore};
use crate::errors::{CheckpointErrKind, CheckpointError};
use crate::model::CheckpointRecord;

/// Process-local store. Used by the simulator and in tests.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    slot: RwLock<Option<CheckpointRecord>>,
    saves: AtomicU64,
    fail_loads: RwLock<bool>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_cursor(cursor: &Cursor) -> Arc<Self> {
        let store = Self::default();
        *store.slot.write() = Some(CheckpointRecord::from_cursor(cursor));
        Arc::new(store)
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent load fail, as an unreadable file would.
    pub fn set_fail_loads(&self, fail: bool) {
        *self.fail_loads.write() = fail;
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, cursor: &Cursor) -> CheckpointResult<()> {
        validate(cursor)?;
        *self.slot.write() = Some(CheckpointRecord::from_cursor(cursor));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> CheckpointResult<Option<Cursor>> {
        Ok(self.record().await?.map(|record| record.to_cursor()))
    }

    async fn record(&self) -> CheckpointResult<Option<CheckpointRecord>> {
        if *self.fail_loads.read() {
            return Err(CheckpointError::new(CheckpointErrKind::IoFailed(
                "checkpoint unreadable".into(),
            )));
        }
        Ok(self.slot.read().clone())
    }

    async fn clear(&self) -> CheckpointResult<bool> {
        Ok(self.slot.write().take().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carousel_core_types::Fingerprint;

    #[tokio::test]
    async fn idempotent_save_counts_but_keeps_one_record() {
        let store = MemoryCheckpointStore::new();
        let cursor = Cursor::new("https://c/jobs/a?index=9", 9, Fingerprint::new("f9"));
        store.save(&cursor).await.unwrap();
        store.save(&cursor).await.unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load().await.unwrap(), Some(cursor));
    }

    #[tokio::test]
    async fn failing_loads_surface_as_errors() {
        let store = MemoryCheckpointStore::new();
        store.set_fail_loads(true);
        assert!(store.load().await.unwrap_err().is_retryable());
    }
}
