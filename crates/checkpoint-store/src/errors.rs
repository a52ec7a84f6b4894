use thiserror::Error;

use carousel_core_types::CoreError;

#[derive(Clone, Debug, Error)]
pub enum CheckpointErrKind {
    #[error("io failure: {0}")]
    IoFailed(String),
    #[error("checkpoint corrupt: {0}")]
    Corrupt(String),
    #[error("cursor rejected: {0}")]
    InvalidCursor(String),
    #[error("invalid job key: {0}")]
    InvalidKey(String),
}

#[derive(Clone, Debug, Error)]
#[error(transparent)]
pub struct CheckpointError(pub CheckpointErrKind);

impl CheckpointError {
    pub fn new(kind: CheckpointErrKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &CheckpointErrKind {
        &self.0
    }

    /// A retry of the same call may succeed (disk hiccup), unlike a bad record.
    pub fn is_retryable(&self) -> bool {
        matches!(self.0, CheckpointErrKind::IoFailed(_))
    }
}

impl From<CheckpointErrKind> for CheckpointError {
    fn from(kind: CheckpointErrKind) -> Self {
        CheckpointError(kind)
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        CheckpointError(CheckpointErrKind::IoFailed(err.to_string()))
    }
}

impl From<CheckpointError> for CoreError {
    fn from(value: CheckpointError) -> Self {
        CoreError::new(value.to_string())
    }
}
