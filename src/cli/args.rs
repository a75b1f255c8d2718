//! CLI argument definitions using clap
//!
//! One action; the mode follows from whether a replica file is given:
//! - replica-install [OPTIONS] <replica-file>   (bundle mode)
//! - replica-install [OPTIONS]                  (promotion mode)

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{DnsOptions, InstallOptions};

/// Install a replica of an existing identity-management cluster
#[derive(Parser, Debug)]
#[command(name = "replica-install")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Replica file generated on the master; omit to promote a joined client
    pub replica_file: Option<PathBuf>,

    /// JSON file overriding local paths and installer programs
    #[arg(long, value_name = "PATH")]
    pub paths_config: Option<PathBuf>,

    /// Kerberos realm (default: from the replica file or join state)
    #[arg(long, short = 'r')]
    pub realm: Option<String>,

    /// Primary DNS domain (default: from the replica file or join state)
    #[arg(long)]
    pub domain: Option<String>,

    /// Fully-qualified name of this host
    #[arg(long)]
    pub hostname: Option<String>,

    /// Address of this host; repeat for several
    #[arg(long = "ip-address", value_name = "IP")]
    pub ip_addresses: Vec<IpAddr>,

    /// Directory Manager (existing master) password
    #[arg(long = "password", short = 'p', value_name = "PASSWORD")]
    pub dm_password: Option<String>,

    /// Admin user Kerberos password used for connection check
    #[arg(long, short = 'w', value_name = "PASSWORD")]
    pub admin_password: Option<String>,

    /// User principal allowed to promote replicas
    #[arg(long, short = 'P')]
    pub principal: Option<String>,

    /// Configure a dogtag CA
    #[arg(long)]
    pub setup_ca: bool,

    /// Configure a dogtag KRA
    #[arg(long)]
    pub setup_kra: bool,

    /// Configure bind with our zone
    #[arg(long)]
    pub setup_dns: bool,

    /// Add a DNS forwarder; repeat for several
    #[arg(long = "forwarder", value_name = "IP")]
    pub forwarders: Vec<IpAddr>,

    /// Do not add any DNS forwarders
    #[arg(long)]
    pub no_forwarders: bool,

    /// Do not create reverse DNS zones
    #[arg(long)]
    pub no_reverse: bool,

    /// Do not configure the time service
    #[arg(long, short = 'N')]
    pub no_ntp: bool,

    /// Disable PKINIT in the KDC
    #[arg(long)]
    pub no_pkinit: bool,

    /// Do not automatically redirect to the web UI
    #[arg(long)]
    pub no_ui_redirect: bool,

    /// Do not configure OpenSSH client
    #[arg(long)]
    pub no_ssh: bool,

    /// Do not configure OpenSSH server
    #[arg(long)]
    pub no_sshd: bool,

    /// Do not automatically create DNS SSHFP records
    #[arg(long)]
    pub no_dns_sshfp: bool,

    /// Configure OpenSSH client to trust DNS SSHFP records
    #[arg(long)]
    pub ssh_trust_dns: bool,

    /// Create home directories for users on their first login
    #[arg(long)]
    pub mkhomedir: bool,

    /// Do not use DNS for hostname lookup during installation
    #[arg(long)]
    pub no_host_dns: bool,

    /// Skip connection check to remote master
    #[arg(long)]
    pub skip_conncheck: bool,

    /// Unattended installation, never prompts the user
    #[arg(long, short = 'U')]
    pub unattended: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Installer options for this invocation
    pub fn to_options(&self) -> InstallOptions {
        InstallOptions {
            replica_file: self.replica_file.clone(),
            realm: self.realm.clone(),
            domain: self.domain.clone(),
            hostname: self.hostname.clone(),
            setup_ca: self.setup_ca,
            setup_kra: self.setup_kra,
            setup_dns: self.setup_dns,
            dns: DnsOptions {
                forwarders: self.forwarders.clone(),
                no_forwarders: self.no_forwarders,
                no_reverse: self.no_reverse,
            },
            no_ntp: self.no_ntp,
            no_pkinit: self.no_pkinit,
            no_ui_redirect: self.no_ui_redirect,
            no_ssh: self.no_ssh,
            no_sshd: self.no_sshd,
            no_dns_sshfp: self.no_dns_sshfp,
            ssh_trust_dns: self.ssh_trust_dns,
            mkhomedir: self.mkhomedir,
            no_host_dns: self.no_host_dns,
            skip_conncheck: self.skip_conncheck,
            dm_password: self.dm_password.clone(),
            admin_password: self.admin_password.clone(),
            principal: self.principal.clone(),
            ip_addresses: self.ip_addresses.clone(),
            unattended: self.unattended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("replica-install").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_bundle_mode_from_positional() {
        let options = parse(&["--setup-ca", "-p", "secret", "/root/replica-info.tar"]).to_options();
        assert_eq!(options.mode(), Mode::Bundle);
        assert!(options.setup_ca);
        assert_eq!(options.dm_password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_promotion_mode_flags() {
        let options = parse(&[
            "--setup-dns",
            "--forwarder",
            "192.0.2.53",
            "--ip-address",
            "192.0.2.10",
            "--ip-address",
            "2001:db8::10",
            "-U",
            "--no-host-dns",
        ])
        .to_options();

        assert_eq!(options.mode(), Mode::Promotion);
        assert!(options.unattended && options.no_host_dns);
        assert_eq!(options.dns.forwarders.len(), 1);
        assert_eq!(options.ip_addresses.len(), 2);
    }

    #[test]
    fn test_rejects_bad_address() {
        let result = Cli::try_parse_from(["replica-install", "--ip-address", "not-an-ip"]);
        assert!(result.is_err());
    }
}
