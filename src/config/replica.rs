//! Resolved replica configuration
//!
//! Produced once by the config resolver and shared read-only by the
//! preflight validator and every commit step.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use super::options::DnsOptions;

/// How the replica joins the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// From a transfer bundle generated by an existing member
    Bundle,
    /// By promoting a host already joined as a domain client
    Promotion,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Bundle => "bundle",
            Mode::Promotion => "promotion",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Optional components of the new replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub setup_ca: bool,
    pub setup_kra: bool,
    pub setup_dns: bool,
    pub time_sync: bool,
    /// PKINIT pre-authentication in the KDC
    pub pkinit: bool,
    pub ui_redirect: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            setup_ca: false,
            setup_kra: false,
            setup_dns: false,
            time_sync: true,
            pkinit: true,
            ui_redirect: true,
        }
    }
}

/// Flags forwarded to the domain-join client on re-registration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientFlags {
    pub no_ssh: bool,
    pub no_sshd: bool,
    pub no_dns_sshfp: bool,
    pub ssh_trust_dns: bool,
    pub mkhomedir: bool,
}

/// Preflight switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckFlags {
    /// Check forward/reverse resolution against the cluster name servers
    pub host_dns: bool,
    /// Rehearse network paths to the master
    pub conncheck: bool,
    /// Operator can answer prompts
    pub interactive: bool,
}

impl Default for CheckFlags {
    fn default() -> Self {
        Self {
            host_dns: true,
            conncheck: true,
            interactive: true,
        }
    }
}

/// Immutable configuration of one installation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaConfiguration {
    pub mode: Mode,
    pub realm_name: String,
    pub domain_name: String,
    /// Fully-qualified name of the new replica
    pub host_name: String,
    /// Existing member the replica is joined against
    pub master_host_name: String,
    /// CA host recorded by the join client (promotion mode)
    pub ca_host_name: Option<String>,
    /// Addresses supplied on the command line
    pub ip_addresses: Vec<IpAddr>,
    /// Credential supplied on the command line, if any
    pub credential: Option<Credential>,
    /// Principal used to authenticate in promotion mode
    pub principal: Option<String>,
    pub admin_password: Option<Credential>,
    pub subject_base: String,
    /// Bundle carries CA key material (`cacert.p12`)
    pub ca_material: bool,
    pub features: FeatureFlags,
    pub client: ClientFlags,
    pub checks: CheckFlags,
    pub dns: DnsOptions,
    /// Extracted bundle or fresh temporary directory
    pub work_dir: PathBuf,
}

impl ReplicaConfiguration {
    pub fn work_file(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// CA certificate used to talk TLS to the master
    pub fn ca_file(&self, installed: &Path) -> PathBuf {
        match self.mode {
            Mode::Bundle => self.work_file("ca.crt"),
            Mode::Promotion => installed.to_path_buf(),
        }
    }

    pub fn is_bundle(&self) -> bool {
        self.mode == Mode::Bundle
    }
}
