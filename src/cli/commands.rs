use clap::Subcommand;

use super::checkpoint::CheckpointArgs;
use super::plan::PlanArgs;
use super::simulate::SimulateArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Show how a work list splits into batches
    Plan(PlanArgs),

    /// Drive the simulated carousel end to end
    Simulate(SimulateArgs),

    /// Inspect or delete a stored checkpoint
    Checkpoint(CheckpointArgs),

    /// Print the effective configuration
    Config,
}
