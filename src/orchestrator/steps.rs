//! Commit steps in execution order

use std::fmt;

use crate::session::ReplicaSession;

/// One commit-phase step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommitStep {
    HostsFile,
    ServiceAccount,
    CaCertificate,
    TimeSync,
    Directory,
    DnsRecords,
    CertificateAuthority,
    Kerberos,
    Http,
    Otp,
    KeyRecoveryAuthority,
    DirectoryCertificate,
    DirectoryUpdates,
    Restart,
    Client,
    EnableService,
}

impl CommitStep {
    /// Every step, in the order the commit phase runs them
    pub const ALL: [CommitStep; 16] = [
        Self::HostsFile,
        Self::ServiceAccount,
        Self::CaCertificate,
        Self::TimeSync,
        Self::Directory,
        Self::DnsRecords,
        Self::CertificateAuthority,
        Self::Kerberos,
        Self::Http,
        Self::Otp,
        Self::KeyRecoveryAuthority,
        Self::DirectoryCertificate,
        Self::DirectoryUpdates,
        Self::Restart,
        Self::Client,
        Self::EnableService,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::HostsFile => "hosts-file",
            Self::ServiceAccount => "service-account",
            Self::CaCertificate => "ca-certificate",
            Self::TimeSync => "time-sync",
            Self::Directory => "directory",
            Self::DnsRecords => "dns-records",
            Self::CertificateAuthority => "ca",
            Self::Kerberos => "kerberos",
            Self::Http => "http",
            Self::Otp => "otp",
            Self::KeyRecoveryAuthority => "kra",
            Self::DirectoryCertificate => "directory-certificate",
            Self::DirectoryUpdates => "directory-updates",
            Self::Restart => "restart",
            Self::Client => "client",
            Self::EnableService => "enable-service",
        }
    }

    /// 1-based position in `ALL`
    pub fn number(&self) -> usize {
        *self as usize + 1
    }

    /// A failure stops the run. DNS record registration is best-effort.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DnsRecords)
    }

    /// First step of the finalizing stage
    pub fn starts_finalizing(&self) -> bool {
        matches!(self, Self::DirectoryCertificate)
    }

    /// The step has work to do for this session
    pub fn applies(&self, session: &ReplicaSession) -> bool {
        let features = &session.config.features;
        match self {
            Self::HostsFile => session.update_hosts_file,
            Self::TimeSync => features.time_sync,
            Self::CertificateAuthority => features.setup_ca,
            Self::KeyRecoveryAuthority => features.setup_kra,
            _ => true,
        }
    }
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
