//! Installer collaborators
//!
//! Contracts the commit phase drives, plus the implementations the binary
//! wires in: external installer programs and the local host configurator.

mod command;
mod contract;
mod host;

pub use command::CommandInstaller;
pub use contract::{
    Component, DirectoryInstaller, DnsInstaller, HostConfigurator, InstallRequest,
    InstallerError, InstallerResult, InstallerSet, KeyBroker, ServiceHandle, ServiceInstaller,
};
pub use host::LocalHostConfigurator;

use crate::config::SystemPaths;
use crate::errors::ReplicaResult;

impl InstallerSet {
    /// Installers named in the paths configuration.
    pub fn from_paths(paths: &SystemPaths) -> ReplicaResult<Self> {
        let command = |component| CommandInstaller::configured(paths, component);

        Ok(Self {
            host: Box::new(LocalHostConfigurator::new(
                paths.clone(),
                command(Component::Host)?,
            )),
            time_sync: Box::new(command(Component::TimeSync)?),
            directory: Box::new(command(Component::Directory)?),
            dns: Box::new(command(Component::Dns)?),
            ca: Box::new(command(Component::CertificateAuthority)?),
            kerberos: Box::new(command(Component::Kerberos)?),
            session_cache: Box::new(command(Component::SessionCache)?),
            http: Box::new(command(Component::Http)?),
            otp: Box::new(command(Component::Otp)?),
            broker: Box::new(command(Component::CredentialBroker)?),
            kra: Box::new(command(Component::KeyRecoveryAuthority)?),
            client: Box::new(command(Component::DomainClient)?),
        })
    }
}
