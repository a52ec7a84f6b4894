//! Shared primitives for the carousel batch driver.
//!
//! Everything that crosses a crate seam lives here: the [`Cursor`] that names a
//! confirmed position, the [`Fingerprint`] used to prove that a position changed,
//! the per-item [`ActionSpec`] handed in by the content pipeline and the
//! [`ProgressUpdate`] tuples handed out to whoever is watching.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Shared error type for plumbing that has no richer domain error (bus, sinks).
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-step navigation direction inside the carousel.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Forward,
    Back,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Back,
            Direction::Back => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Back => f.write_str("back"),
        }
    }
}

/// Content-derived identity of the item currently visible in the carousel.
///
/// An empty fingerprint means "nothing observable yet" (detail view not loaded,
/// resource still streaming). It is never evidence that a position changed.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw: String = raw.into();
        Self(raw.trim().to_string())
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `self` is a usable observation that differs from `baseline`.
    pub fn differs_from(&self, baseline: &Fingerprint) -> bool {
        !self.is_empty() && self != baseline
    }
}

impl From<Option<String>> for Fingerprint {
    fn from(value: Option<String>) -> Self {
        value.map(Fingerprint::new).unwrap_or_default()
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Fingerprint::new(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<empty>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Confirmed position reference.
///
/// A cursor is only ever built after the navigator or executor has proof of the
/// position it names. It has no setters: a new position means a new cursor.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cursor {
    address: String,
    index_hint: usize,
    fingerprint: Fingerprint,
}

impl Cursor {
    pub fn new(address: impl Into<String>, index_hint: usize, fingerprint: Fingerprint) -> Self {
        Self {
            address: address.into(),
            index_hint,
            fingerprint,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Global sequence index of the item this cursor was captured on.
    pub fn index_hint(&self) -> usize {
        self.index_hint
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn has_fingerprint(&self) -> bool {
        !self.fingerprint.is_empty()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({})",
            self.index_hint, self.address, self.fingerprint
        )
    }
}

/// Side-effecting operation applied to one carousel item.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ActionKind {
    UpscaleSubtle,
    UpscaleCreative,
    VarySubtle,
    VaryStrong,
    Download,
    Custom(String),
}

impl ActionKind {
    pub fn key(&self) -> &str {
        match self {
            ActionKind::UpscaleSubtle => "upscale_subtle",
            ActionKind::UpscaleCreative => "upscale_creative",
            ActionKind::VarySubtle => "vary_subtle",
            ActionKind::VaryStrong => "vary_strong",
            ActionKind::Download => "download",
            ActionKind::Custom(name) => name,
        }
    }

    pub fn parse(key: &str) -> Self {
        match key.trim() {
            "upscale_subtle" => ActionKind::UpscaleSubtle,
            "upscale_creative" => ActionKind::UpscaleCreative,
            "vary_subtle" => ActionKind::VarySubtle,
            "vary_strong" => ActionKind::VaryStrong,
            "download" => ActionKind::Download,
            other => ActionKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One entry of the ordered work list supplied by the content pipeline.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionSpec {
    pub kind: ActionKind,
    #[cfg_attr(feature = "serde-full", serde(default))]
    pub label: Option<String>,
}

impl ActionSpec {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Uniform work list: the same action for `count` items.
    pub fn repeat(kind: ActionKind, count: usize) -> Vec<ActionSpec> {
        (0..count).map(|_| ActionSpec::new(kind.clone())).collect()
    }
}

/// Phase reported to progress observers.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverPhase {
    Starting,
    Resuming,
    FreshStart,
    Acting,
    Advancing,
    BatchComplete,
    Draining,
    Finalizing,
    Done,
    Stopped,
    Aborted,
}

impl DriverPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DriverPhase::Done | DriverPhase::Stopped | DriverPhase::Aborted
        )
    }
}

impl fmt::Display for DriverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriverPhase::Starting => "starting",
            DriverPhase::Resuming => "resuming",
            DriverPhase::FreshStart => "fresh_start",
            DriverPhase::Acting => "acting",
            DriverPhase::Advancing => "advancing",
            DriverPhase::BatchComplete => "batch_complete",
            DriverPhase::Draining => "draining",
            DriverPhase::Finalizing => "finalizing",
            DriverPhase::Done => "done",
            DriverPhase::Stopped => "stopped",
            DriverPhase::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Advisory progress tuple. Observers may miss any of these without affecting
/// the run.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    pub run_id: RunId,
    /// 1-based batch number; 0 before the first batch starts.
    pub batch_number: usize,
    pub total_batches: usize,
    pub item_index: Option<usize>,
    pub total_items: usize,
    pub state: DriverPhase,
    pub queue_depth: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fingerprint_never_differs() {
        let empty = Fingerprint::empty();
        let seen = Fingerprint::new("cdn/a.png");
        assert!(!empty.differs_from(&seen));
        assert!(!empty.differs_from(&Fingerprint::empty()));
        assert!(seen.differs_from(&empty));
        assert!(!seen.differs_from(&Fingerprint::new(" cdn/a.png ")));
    }

    #[test]
    fn fingerprint_from_option() {
        assert!(Fingerprint::from(None).is_empty());
        assert!(Fingerprint::from(Some("   ".to_string())).is_empty());
        assert_eq!(Fingerprint::from(Some("x".to_string())).as_str(), "x");
    }

    #[test]
    fn action_kind_keys_round_trip() {
        for key in ["upscale_subtle", "vary_strong", "download", "remix"] {
            assert_eq!(ActionKind::parse(key).key(), key);
        }
        assert_eq!(
            ActionKind::parse("remix"),
            ActionKind::Custom("remix".into())
        );
    }

    #[test]
    fn cursor_reports_fingerprint_presence() {
        let bare = Cursor::new("https://x/jobs/1?index=0", 3, Fingerprint::empty());
        assert!(!bare.has_fingerprint());
        let full = Cursor::new("https://x/jobs/1?index=0", 3, Fingerprint::new("f"));
        assert!(full.has_fingerprint());
        assert_eq!(full.index_hint(), 3);
    }

    #[test]
    fn terminal_phases() {
        assert!(DriverPhase::Done.is_terminal());
        assert!(DriverPhase::Aborted.is_terminal());
        assert!(!DriverPhase::Draining.is_terminal());
    }
}
