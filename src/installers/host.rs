//! Local host configuration
//!
//! Hosts file, trusted CA certificate and the final endpoint description
//! are written directly; account creation and enabling the membership
//! service go through the `host` helper program.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use serde_json::json;

use crate::config::{endpoint::parse_global, EndpointDescription, Mode, SystemPaths};
use crate::observability::{log_event_with_fields, Event};
use crate::session::ReplicaSession;

use super::command::CommandInstaller;
use super::contract::{Component, HostConfigurator, InstallerError, InstallerResult};

const CA_CERT_MODE: u32 = 0o444;

/// Hosts file lines missing for `host` on `addresses`.
fn missing_host_entries(existing: &str, host: &str, addresses: &[IpAddr]) -> Vec<String> {
    let short = host.split('.').next().unwrap_or(host);

    addresses
        .iter()
        .filter(|addr| {
            !existing.lines().any(|line| {
                let line = line.split('#').next().unwrap_or("");
                let mut fields = line.split_whitespace();
                let listed = fields.next().and_then(|f| f.parse::<IpAddr>().ok());
                listed == Some(**addr) && fields.any(|name| name.eq_ignore_ascii_case(host))
            })
        })
        .map(|addr| format!("{} {} {}", addr, host, short))
        .collect()
}

/// Host configurator for the machine the installer runs on
pub struct LocalHostConfigurator {
    paths: SystemPaths,
    helper: CommandInstaller,
}

impl LocalHostConfigurator {
    pub fn new(paths: SystemPaths, helper: CommandInstaller) -> Self {
        Self { paths, helper }
    }

    fn err(message: impl Into<String>) -> InstallerError {
        InstallerError::new(Component::Host, message)
    }
}

impl HostConfigurator for LocalHostConfigurator {
    fn update_hosts_file(&self, host: &str, addresses: &[IpAddr]) -> InstallerResult<()> {
        let path = &self.paths.hosts_file;
        let existing = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(Self::err(format!("failed to read {}: {}", path.display(), e))),
        };

        let lines = missing_host_entries(&existing, host, addresses);
        if lines.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Self::err(format!("failed to open {}: {}", path.display(), e)))?;

        let mut text = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            text.push('\n');
        }
        for line in &lines {
            text.push_str(line);
            text.push('\n');
        }
        file.write_all(text.as_bytes())
            .map_err(|e| Self::err(format!("failed to update {}: {}", path.display(), e)))
    }

    fn create_service_account(&self) -> InstallerResult<()> {
        self.helper.call("create-service-account", &json!({}))
    }

    fn import_ca_certificate(&self, session: &ReplicaSession) -> InstallerResult<()> {
        let dest = &self.paths.ca_cert;
        let source = session.config.ca_file(dest);

        if source != *dest {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Self::err(format!("failed to create {}: {}", parent.display(), e)))?;
            }
            fs::copy(&source, dest).map_err(|e| {
                Self::err(format!(
                    "failed to copy {} to {}: {}",
                    source.display(),
                    dest.display(),
                    e
                ))
            })?;
        }

        set_mode(dest, CA_CERT_MODE)
    }

    fn write_endpoint(&self, session: &ReplicaSession) -> InstallerResult<()> {
        let path = &self.paths.endpoint_file;
        let mut description = EndpointDescription::for_replica(&session.config, session.ca_enabled());

        // Promotion keeps whatever else the join client recorded.
        if session.mode() == Mode::Promotion {
            if let Ok(text) = fs::read_to_string(path) {
                description = description.merged_over(&parse_global(&text));
            }
        }

        description
            .write_final(path)
            .map_err(|e| Self::err(e.to_string()))?;

        let path_text = path.display().to_string();
        log_event_with_fields(Event::EndpointFinal, &[("path", &path_text)]);
        Ok(())
    }

    fn enable_cluster_service(&self) -> InstallerResult<()> {
        self.helper.call("enable-service", &json!({}))
    }
}

fn set_mode(path: &Path, mode: u32) -> InstallerResult<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        InstallerError::new(
            Component::Host,
            format!("failed to set mode on {}: {}", path.display(), e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ProviderMap;
    use crate::config::{Credential, ReplicaConfiguration};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn session(mode: Mode, work_dir: PathBuf) -> ReplicaSession {
        ReplicaSession {
            config: ReplicaConfiguration {
                mode,
                realm_name: "EXAMPLE.COM".into(),
                domain_name: "example.com".into(),
                host_name: "replica.example.com".into(),
                master_host_name: "master.example.com".into(),
                ca_host_name: None,
                ip_addresses: Vec::new(),
                credential: None,
                principal: None,
                admin_password: None,
                subject_base: "O=EXAMPLE.COM".into(),
                ca_material: false,
                features: Default::default(),
                client: Default::default(),
                checks: Default::default(),
                dns: Default::default(),
                work_dir,
            },
            credential: Credential::new("pw"),
            dirman_password: Credential::new("pw"),
            providers: ProviderMap::new(),
            ip_addresses: Vec::new(),
            update_hosts_file: false,
            subject_base: "O=EXAMPLE.COM".into(),
        }
    }

    fn configurator(root: &Path) -> LocalHostConfigurator {
        let paths = SystemPaths {
            hosts_file: root.join("hosts"),
            ca_cert: root.join("etc/ipa/ca.crt"),
            endpoint_file: root.join("etc/ipa/default.conf"),
            ..SystemPaths::default()
        };
        LocalHostConfigurator::new(paths, CommandInstaller::new(Component::Host, "true"))
    }

    #[test]
    fn test_missing_host_entries() {
        let existing = "127.0.0.1 localhost\n192.0.2.10 replica.example.com replica # ipa\n";
        let addrs: Vec<IpAddr> = vec!["192.0.2.10".parse().unwrap(), "2001:db8::10".parse().unwrap()];

        assert_eq!(
            missing_host_entries(existing, "replica.example.com", &addrs),
            vec!["2001:db8::10 replica.example.com replica".to_string()]
        );
    }

    #[test]
    fn test_update_hosts_file_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let host = configurator(dir.path());
        fs::write(dir.path().join("hosts"), "127.0.0.1 localhost").unwrap();
        let addrs: Vec<IpAddr> = vec!["192.0.2.10".parse().unwrap()];

        host.update_hosts_file("replica.example.com", &addrs).unwrap();
        host.update_hosts_file("replica.example.com", &addrs).unwrap();

        let content = fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert_eq!(
            content,
            "127.0.0.1 localhost\n192.0.2.10 replica.example.com replica\n"
        );
    }

    #[test]
    fn test_import_ca_certificate_from_bundle() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("ca.crt"), "-----BEGIN CERTIFICATE-----\n").unwrap();

        let host = configurator(dir.path());
        host.import_ca_certificate(&session(Mode::Bundle, work)).unwrap();

        let dest = dir.path().join("etc/ipa/ca.crt");
        assert!(fs::read_to_string(&dest).unwrap().starts_with("-----BEGIN"));
        assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o444);
    }

    #[test]
    fn test_write_endpoint_merges_in_promotion_mode() {
        let dir = TempDir::new().unwrap();
        let host = configurator(dir.path());
        let endpoint = dir.path().join("etc/ipa/default.conf");
        fs::create_dir_all(endpoint.parent().unwrap()).unwrap();
        fs::write(
            &endpoint,
            "[global]\nserver = master.example.com\nhost = replica.example.com\ncontext = cli\n",
        )
        .unwrap();

        host.write_endpoint(&session(Mode::Promotion, dir.path().to_path_buf()))
            .unwrap();

        let written = EndpointDescription::parse(&fs::read_to_string(&endpoint).unwrap());
        assert_eq!(written.get("context"), Some("cli"));
        assert_eq!(written.get("server"), None);
        assert_eq!(written.get("realm"), Some("EXAMPLE.COM"));
        assert_eq!(fs::metadata(&endpoint).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_helper_actions() {
        let dir = TempDir::new().unwrap();
        let host = configurator(dir.path());
        assert!(host.create_service_account().is_ok());
        assert!(host.enable_cluster_service().is_ok());
    }
}
