//! replica-install - join a new replica to an existing identity-management cluster
//!
//! Two phases over one immutable configuration:
//! - preflight: read-only checks of the host and the cluster
//! - commit: the fixed sequence of installer steps
//!
//! wrapped in a guard that always removes the working directory.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod errors;
pub mod guard;
pub mod installers;
pub mod observability;
pub mod orchestrator;
pub mod preflight;
pub mod session;
