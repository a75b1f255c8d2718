//! CLI module for replica-install
//!
//! - `args`: clap argument surface
//! - `io`: terminal prompts
//! - `commands`: wiring of the real collaborators

mod args;
mod commands;
mod io;

pub use args::Cli;
pub use commands::{install, run};
pub use io::{parse_answer, TerminalPrompter};
