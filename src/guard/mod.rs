//! Cleanup and interrupt handling
//!
//! - `WorkDir`: the run's temporary directory, removed on every exit
//! - `CleanupGuard`: wraps check and commit, prints the remediation hint
//! - `InterruptFlag`: set by the SIGINT handler, polled between commit steps
//!
//! Cluster-side changes made before a failure are not undone. The
//! remediation message points the operator at the uninstaller instead.

mod cleanup;
mod interrupt;
mod workdir;

pub use cleanup::CleanupGuard;
pub use interrupt::InterruptFlag;
pub use workdir::WorkDir;
