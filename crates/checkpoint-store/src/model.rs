use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carousel_core_types::{Cursor, Fingerprint};

pub const RECORD_VERSION: u32 = 1;

/// Persisted form of the last confirmed cursor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    pub address: String,
    #[serde(default)]
    pub fingerprint: Fingerprint,
    /// Global index of the last item acted on.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl CheckpointRecord {
    pub fn from_cursor(cursor: &Cursor) -> Self {
        Self {
            version: RECORD_VERSION,
            address: cursor.address().to_string(),
            fingerprint: cursor.fingerprint().clone(),
            index: cursor.index_hint(),
            timestamp: Utc::now(),
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn to_cursor(&self) -> Cursor {
        Cursor::new(self.address.clone(), self.index, self.fingerprint.clone())
    }

    /// Same position, ignoring when it was written.
    pub fn same_position(&self, cursor: &Cursor) -> bool {
        self.address == cursor.address()
            && &self.fingerprint == cursor.fingerprint()
            && self.index == cursor.index_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_cursor() {
        let cursor = Cursor::new("https://c/jobs/a?index=1", 9, Fingerprint::new("fp9"));
        let record = CheckpointRecord::from_cursor(&cursor);
        assert_eq!(record.to_cursor(), cursor);
        assert!(record.same_position(&cursor));
    }

    #[test]
    fn older_records_without_version_or_fingerprint_still_load() {
        let raw = r#"{"address":"https://c/jobs/a","index":3,"timestamp":"2026-01-02T03:04:05Z"}"#;
        let record: CheckpointRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.version, RECORD_VERSION);
        assert!(record.fingerprint.is_empty());
        assert_eq!(record.index, 3);
    }
}
