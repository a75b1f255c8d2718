//! Installation options
//!
//! One statically typed structure enumerating every option the installer
//! recognises. Built once from the command line and never mutated afterward.

use std::net::IpAddr;
use std::path::PathBuf;

use super::replica::Mode;

/// DNS server options, only meaningful with `setup_dns`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsOptions {
    /// Forwarders for the new DNS server
    pub forwarders: Vec<IpAddr>,
    /// Explicitly run without forwarders
    pub no_forwarders: bool,
    /// Do not create reverse zones
    pub no_reverse: bool,
}

/// Every recognised installer option with its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Transfer bundle; absent selects promotion mode
    pub replica_file: Option<PathBuf>,

    /// Override realm from the bundle or join state
    pub realm: Option<String>,
    /// Override domain from the bundle or join state
    pub domain: Option<String>,
    /// Override local host name
    pub hostname: Option<String>,

    /// Configure a certificate authority clone (default: false)
    pub setup_ca: bool,
    /// Configure a key-recovery authority clone (default: false)
    pub setup_kra: bool,
    /// Configure a DNS server (default: false)
    pub setup_dns: bool,
    pub dns: DnsOptions,

    /// Skip time-sync configuration (default: false)
    pub no_ntp: bool,
    /// Skip PKINIT in the KDC (default: false)
    pub no_pkinit: bool,
    /// Do not redirect the web UI root to the application (default: false)
    pub no_ui_redirect: bool,

    /// Client-side SSH integration switches, passed to the join client
    pub no_ssh: bool,
    pub no_sshd: bool,
    pub no_dns_sshfp: bool,
    pub ssh_trust_dns: bool,
    pub mkhomedir: bool,

    /// Skip forward/reverse DNS checks of master and local host
    pub no_host_dns: bool,
    /// Skip the connectivity rehearsal against the master
    pub skip_conncheck: bool,

    /// Directory manager password of the existing master (bundle mode)
    pub dm_password: Option<String>,
    /// Admin password used for the connection check and promotion
    pub admin_password: Option<String>,
    /// Principal allowed to promote replicas (promotion mode)
    pub principal: Option<String>,

    /// Addresses of this host; resolved from the host name when empty
    pub ip_addresses: Vec<IpAddr>,

    /// Never prompt (default: interactive)
    pub unattended: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            replica_file: None,
            realm: None,
            domain: None,
            hostname: None,
            setup_ca: false,
            setup_kra: false,
            setup_dns: false,
            dns: DnsOptions::default(),
            no_ntp: false,
            no_pkinit: false,
            no_ui_redirect: false,
            no_ssh: false,
            no_sshd: false,
            no_dns_sshfp: false,
            ssh_trust_dns: false,
            mkhomedir: false,
            no_host_dns: false,
            skip_conncheck: false,
            dm_password: None,
            admin_password: None,
            principal: None,
            ip_addresses: Vec::new(),
            unattended: false,
        }
    }
}

impl InstallOptions {
    /// Mode is selected by presence of the transfer file.
    pub fn mode(&self) -> Mode {
        if self.replica_file.is_some() {
            Mode::Bundle
        } else {
            Mode::Promotion
        }
    }

    pub fn interactive(&self) -> bool {
        !self.unattended
    }
}
