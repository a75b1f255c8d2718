//! Preflight validation
//!
//! Read-only checks of the local host and the existing cluster, run in a
//! fixed order before anything is installed. A successful run yields the
//! `ReplicaSession` the commit phase works from.

mod conncheck;
mod dns;
mod outcome;
mod prompt;
mod system;
mod validator;

pub use conncheck::{required_ports, PortChecker, TcpPortChecker, MASTER_PORTS};
pub use dns::{check_dns_resolution, DigResolver, NameResolver};
pub use outcome::ValidationOutcome;
pub use prompt::{Prompter, Unattended};
pub use system::{listens_on_443, HostInfo, LocalHostInfo, DIRECTORY_PORTS};
pub use validator::PreflightValidator;
