//! Installer collaborator contracts
//!
//! The orchestrator drives every local service through these traits and
//! never looks inside an installer. Each installer gets the immutable
//! session and returns a handle that later steps pass back for restarts.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cluster::ServiceKind;
use crate::config::{Pkcs12Info, ReplicaConfiguration};
use crate::preflight::ValidationOutcome;
use crate::session::ReplicaSession;

/// Result type for installer calls
pub type InstallerResult<T> = Result<T, InstallerError>;

/// Local service components
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    Directory,
    CertificateAuthority,
    KeyRecoveryAuthority,
    Kerberos,
    Http,
    SessionCache,
    Dns,
    TimeSync,
    DomainClient,
    Otp,
    CredentialBroker,
    Host,
}

impl Component {
    /// Key of the component in the paths configuration
    pub fn name(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::CertificateAuthority => "ca",
            Self::KeyRecoveryAuthority => "kra",
            Self::Kerberos => "kerberos",
            Self::Http => "http",
            Self::SessionCache => "session-cache",
            Self::Dns => "dns",
            Self::TimeSync => "time-sync",
            Self::DomainClient => "client",
            Self::Otp => "otp",
            Self::CredentialBroker => "custodia",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Installer failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{component}: {message}")]
pub struct InstallerError {
    pub component: Component,
    pub message: String,
}

impl InstallerError {
    pub fn new(component: Component, message: impl Into<String>) -> Self {
        Self {
            component,
            message: message.into(),
        }
    }
}

/// Installed service instance, passed back for restarts and follow-up calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub component: Component,
    /// Installer-assigned instance name
    pub instance: String,
}

impl ServiceHandle {
    pub fn new(component: Component, instance: impl Into<String>) -> Self {
        Self {
            component,
            instance: instance.into(),
        }
    }
}

/// Inputs of one `install` call
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    pub session: &'a ReplicaSession,
    /// Certificate from the transfer bundle for this service (bundle mode)
    pub pkcs12: Option<&'a Pkcs12Info>,
    /// Key material fetched from a provider (promotion mode CA/KRA clones)
    pub key_material: Option<&'a Path>,
}

impl<'a> InstallRequest<'a> {
    pub fn new(session: &'a ReplicaSession) -> Self {
        Self {
            session,
            pkcs12: None,
            key_material: None,
        }
    }

    pub fn with_pkcs12(mut self, pkcs12: Option<&'a Pkcs12Info>) -> Self {
        self.pkcs12 = pkcs12;
        self
    }

    pub fn with_key_material(mut self, path: &'a Path) -> Self {
        self.key_material = Some(path);
        self
    }
}

/// Uniform installer contract
pub trait ServiceInstaller {
    fn component(&self) -> Component;

    /// Side-effect-free readiness check run during preflight.
    fn check(&self, _config: &ReplicaConfiguration) -> ValidationOutcome {
        ValidationOutcome::Pass
    }

    fn install(&self, request: &InstallRequest<'_>) -> InstallerResult<ServiceHandle>;

    fn restart(&self, handle: &ServiceHandle) -> InstallerResult<()>;
}

/// Directory service installer
pub trait DirectoryInstaller: ServiceInstaller {
    /// Bind the issued service certificate to the instance identity.
    fn attach_service_certificate(&self, handle: &ServiceHandle) -> InstallerResult<()>;

    /// Apply pending directory data updates.
    fn apply_updates(&self, handle: &ServiceHandle) -> InstallerResult<()>;
}

/// DNS installer
pub trait DnsInstaller: ServiceInstaller {
    /// Add records for the new host to the cluster's zones.
    fn register_host_records(&self, session: &ReplicaSession) -> InstallerResult<()>;
}

/// Secret-distribution service, also the source of clone key material
pub trait KeyBroker: ServiceInstaller {
    /// Fetch key material for `kind` from `provider` into `dest_dir`.
    fn fetch_keys(&self, kind: ServiceKind, provider: &str, dest_dir: &Path)
        -> InstallerResult<PathBuf>;
}

/// Local host configuration outside any one service
pub trait HostConfigurator {
    fn update_hosts_file(&self, host: &str, addresses: &[IpAddr]) -> InstallerResult<()>;

    fn create_service_account(&self) -> InstallerResult<()>;

    fn import_ca_certificate(&self, session: &ReplicaSession) -> InstallerResult<()>;

    /// Write the final endpoint description for this host.
    fn write_endpoint(&self, session: &ReplicaSession) -> InstallerResult<()>;

    /// Enable the cluster membership service at boot.
    fn enable_cluster_service(&self) -> InstallerResult<()>;
}

/// Every collaborator the commit phase calls
pub struct InstallerSet {
    pub host: Box<dyn HostConfigurator>,
    pub time_sync: Box<dyn ServiceInstaller>,
    pub directory: Box<dyn DirectoryInstaller>,
    pub dns: Box<dyn DnsInstaller>,
    pub ca: Box<dyn ServiceInstaller>,
    pub kerberos: Box<dyn ServiceInstaller>,
    pub session_cache: Box<dyn ServiceInstaller>,
    pub http: Box<dyn ServiceInstaller>,
    pub otp: Box<dyn ServiceInstaller>,
    pub broker: Box<dyn KeyBroker>,
    pub kra: Box<dyn ServiceInstaller>,
    pub client: Box<dyn ServiceInstaller>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_names_match_paths_keys() {
        let paths = crate::config::SystemPaths::default();
        for component in [
            Component::Directory,
            Component::CertificateAuthority,
            Component::KeyRecoveryAuthority,
            Component::Kerberos,
            Component::Http,
            Component::SessionCache,
            Component::Dns,
            Component::TimeSync,
            Component::DomainClient,
            Component::Otp,
            Component::CredentialBroker,
            Component::Host,
        ] {
            assert!(paths.installer(component.name()).is_ok(), "{}", component);
        }
    }

    #[test]
    fn test_error_display() {
        let err = InstallerError::new(Component::Kerberos, "kdb5_util failed");
        assert_eq!(err.to_string(), "kerberos: kdb5_util failed");
    }
}
