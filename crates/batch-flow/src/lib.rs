//! Batch Orchestration Layer
//!
//! Drives an ordered work list across a remote carousel in fixed-size
//! batches. Every step onto a new item is proven by a fingerprint change
//! before the next action is issued, a checkpoint is persisted after each
//! batch, and a resumed run proves it sits one item past that checkpoint
//! before acting again.

pub mod advance;
pub mod config;
pub mod drain;
pub mod errors;
pub mod orchestrator;
pub mod plan;
pub mod resume;
pub mod retry;
pub mod strategies;
pub mod types;

pub use advance::advance_confirmed;
pub use config::{
    ActionFailurePolicy, DrainTimeoutPolicy, DriverConfig, FinalizationConfig, RunRetryConfig,
};
pub use drain::{DrainOutcome, DrainReport, DrainSettings, QueueDrainer, QueueReading};
pub use errors::FlowError;
pub use orchestrator::BatchOrchestrator;
pub use plan::{plan_batches, BatchPlan, BatchSchedule};
pub use resume::{ResumeOutcome, ResumeSettings, ResumeStrategy, ResumeVerifier};
pub use retry::run_until_done;
pub use strategies::{backoff, finalization_wait};
pub use types::{RunReport, RunRequest};
