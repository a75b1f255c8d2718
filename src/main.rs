//! replica-install entry point
//!
//! Parsing, wiring and error reporting all live in the CLI module; this
//! only turns its result into the process exit status.

use replica_install::cli;

fn main() {
    std::process::exit(cli::run());
}
