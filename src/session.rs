//! Validated installation session
//!
//! Everything preflight learned that the commit phase needs. Produced only
//! by a successful `PreflightValidator::validate`; the orchestrator never
//! talks to the cluster to fill gaps.

use std::net::IpAddr;

use crate::cluster::{ProviderMap, ServiceKind};
use crate::config::{Credential, Mode, ReplicaConfiguration};

/// Checkpoint between preflight and commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSession {
    pub config: ReplicaConfiguration,
    /// Credential preflight bound with
    pub credential: Credential,
    /// Directory Manager password for the new directory instance
    pub dirman_password: Credential,
    /// Members providing optional services
    pub providers: ProviderMap,
    /// Addresses the new host answers on
    pub ip_addresses: Vec<IpAddr>,
    /// Add `ip_addresses` to the local hosts file in step 13
    pub update_hosts_file: bool,
    pub subject_base: String,
}

impl ReplicaSession {
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn host_name(&self) -> &str {
        &self.config.host_name
    }

    pub fn master_host_name(&self) -> &str {
        &self.config.master_host_name
    }

    /// Member the CA clone pulls from
    pub fn ca_host(&self) -> Option<&str> {
        self.providers.get(ServiceKind::CertificateAuthority)
    }

    /// Member the KRA clone pulls from
    pub fn kra_host(&self) -> Option<&str> {
        self.providers.get(ServiceKind::KeyRecoveryAuthority)
    }

    /// The cluster issues certificates through a CA this host can use
    pub fn ca_enabled(&self) -> bool {
        match self.config.mode {
            Mode::Bundle => self.config.ca_material,
            Mode::Promotion => self.ca_host().is_some(),
        }
    }
}
