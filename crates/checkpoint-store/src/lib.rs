pub mod api;
pub mod errors;
pub mod memory;
pub mod model;
pub mod persist;

pub use api::{CheckpointResult, CheckpointStore, FileCheckpointStore};
pub use errors::{CheckpointErrKind, CheckpointError};
pub use memory::MemoryCheckpointStore;
pub use model::CheckpointRecord;
