//! Remote cluster client
//!
//! Read-mostly access to the existing cluster: domain level, replication
//! agreements, host entries, optional service providers and name servers.

mod client;
mod command;
mod domain_level;
mod providers;

pub use client::{
    ClusterBind, ClusterConnector, ClusterError, ClusterResult, ClusterSession, SessionGuard,
};
pub use command::CommandClusterConnector;
pub use domain_level::{
    check_domain_level, mode_bounds, DomainLevel, MAX_DOMAIN_LEVEL, MIN_DOMAIN_LEVEL,
};
pub use providers::{ProviderMap, ServiceKind};
