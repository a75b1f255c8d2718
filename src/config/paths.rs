//! Installer tool configuration
//!
//! Local state paths and the external programs the installer drives,
//! loaded from an optional JSON file. Every field has a default matching a
//! standard host layout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ReplicaError, ReplicaResult};

/// Paths and program names used by the installer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemPaths {
    /// Directory holding the domain-join client's backed up files
    #[serde(default = "default_client_state_dir")]
    pub client_state_dir: PathBuf,

    /// Endpoint description read by the gateway and written by this installer
    #[serde(default = "default_endpoint_file")]
    pub endpoint_file: PathBuf,

    /// Trusted CA bundle installed by the join client
    #[serde(default = "default_ca_cert")]
    pub ca_cert: PathBuf,

    /// Local name-resolution records
    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,

    /// Gateway configuration; its presence means port 443 is taken
    #[serde(default = "default_gateway_conf")]
    pub gateway_conf: PathBuf,

    /// Parent of the working directory
    #[serde(default = "default_tmp_root")]
    pub tmp_root: PathBuf,

    /// Commit journal, one JSON object per line
    #[serde(default = "default_install_log")]
    pub install_log: PathBuf,

    /// Helper that answers read-only queries against the cluster
    #[serde(default = "default_cluster_query")]
    pub cluster_query: String,

    /// Entry point named in the remediation message
    #[serde(default = "default_uninstall_command")]
    pub uninstall_command: String,

    /// Installer program per component, keyed by component name
    #[serde(default = "default_installers")]
    pub installers: BTreeMap<String, String>,
}

fn default_client_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/ipa-client/sysrestore")
}
fn default_endpoint_file() -> PathBuf {
    PathBuf::from("/etc/ipa/default.conf")
}
fn default_ca_cert() -> PathBuf {
    PathBuf::from("/etc/ipa/ca.crt")
}
fn default_hosts_file() -> PathBuf {
    PathBuf::from("/etc/hosts")
}
fn default_gateway_conf() -> PathBuf {
    PathBuf::from("/etc/httpd/conf.d/ipa.conf")
}
fn default_tmp_root() -> PathBuf {
    std::env::temp_dir()
}
fn default_install_log() -> PathBuf {
    PathBuf::from("/var/log/ipareplica-install.log")
}
fn default_cluster_query() -> String {
    "ipa-cluster-query".to_string()
}
fn default_uninstall_command() -> String {
    "/usr/sbin/ipa-server-install".to_string()
}
fn default_installers() -> BTreeMap<String, String> {
    [
        ("directory", "ipa-ds-install"),
        ("ca", "ipa-ca-install"),
        ("kra", "ipa-kra-install"),
        ("kerberos", "ipa-krb-install"),
        ("http", "ipa-http-install"),
        ("session-cache", "ipa-memcache-install"),
        ("dns", "ipa-dns-install"),
        ("time-sync", "ipa-ntp-install"),
        ("client", "ipa-client-install"),
        ("otp", "ipa-otpd-install"),
        ("custodia", "ipa-custodia-install"),
        ("host", "ipa-host-setup"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            client_state_dir: default_client_state_dir(),
            endpoint_file: default_endpoint_file(),
            ca_cert: default_ca_cert(),
            hosts_file: default_hosts_file(),
            gateway_conf: default_gateway_conf(),
            tmp_root: default_tmp_root(),
            install_log: default_install_log(),
            cluster_query: default_cluster_query(),
            uninstall_command: default_uninstall_command(),
            installers: default_installers(),
        }
    }
}

impl SystemPaths {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> ReplicaResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReplicaError::configuration(format!(
                "Failed to read paths config {}: {}",
                path.display(),
                e
            ))
        })?;

        let paths: SystemPaths = serde_json::from_str(&content).map_err(|e| {
            ReplicaError::configuration(format!("Invalid paths config JSON: {}", e))
        })?;

        paths.validate()?;
        Ok(paths)
    }

    fn validate(&self) -> ReplicaResult<()> {
        let absolute = [
            ("client_state_dir", &self.client_state_dir),
            ("endpoint_file", &self.endpoint_file),
            ("ca_cert", &self.ca_cert),
            ("hosts_file", &self.hosts_file),
            ("gateway_conf", &self.gateway_conf),
            ("tmp_root", &self.tmp_root),
            ("install_log", &self.install_log),
        ];
        for (name, path) in absolute {
            if !path.is_absolute() {
                return Err(ReplicaError::configuration(format!(
                    "{} must be an absolute path, got '{}'",
                    name,
                    path.display()
                )));
            }
        }

        if self.cluster_query.trim().is_empty() {
            return Err(ReplicaError::configuration("cluster_query must not be empty"));
        }
        if self.uninstall_command.trim().is_empty() {
            return Err(ReplicaError::configuration(
                "uninstall_command must not be empty",
            ));
        }
        if let Some((name, _)) = self.installers.iter().find(|(_, p)| p.trim().is_empty()) {
            return Err(ReplicaError::configuration(format!(
                "installer program for '{}' must not be empty",
                name
            )));
        }

        Ok(())
    }

    /// Program configured for a component.
    pub fn installer(&self, component: &str) -> ReplicaResult<&str> {
        self.installers
            .get(component)
            .map(String::as_str)
            .ok_or_else(|| {
                ReplicaError::configuration(format!(
                    "no installer program configured for '{}'",
                    component
                ))
            })
    }
}
