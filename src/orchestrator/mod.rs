//! Installation orchestration
//!
//! The state machine, the fixed commit step order, and the orchestrator
//! that drives installers through them.

mod orchestrator;
mod state;
mod steps;

pub use orchestrator::Orchestrator;
pub use state::{InstallState, StateError, StateResult};
pub use steps::CommitStep;
