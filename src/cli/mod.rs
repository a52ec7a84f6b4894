pub mod app;
pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod plan;
pub mod runtime;
pub mod simulate;

pub use checkpoint::{cmd_checkpoint, CheckpointAction, CheckpointArgs};
pub use output::OutputFormat;
pub use plan::{cmd_plan, PlanArgs};
pub use simulate::{cmd_simulate, SimulateArgs};
