//! Config resolver
//!
//! Builds the one immutable `ReplicaConfiguration` for a run, from the
//! installer options plus either an extracted transfer bundle or the local
//! join client state. The only side effect is unpacking the bundle into the
//! working directory.

use std::path::Path;

use regex::Regex;

use crate::errors::{ReplicaError, ReplicaResult};
use crate::observability::{log_event_with_fields, Event, Logger};

use super::bundle::TransferBundle;
use super::join_state::JoinState;
use super::options::InstallOptions;
use super::paths::SystemPaths;
use super::replica::{
    CheckFlags, ClientFlags, Credential, FeatureFlags, Mode, ReplicaConfiguration,
};

const LABEL_PATTERN: &str = r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$";

/// Check that `name` is a usable fully-qualified host name.
pub fn verify_fqdn(name: &str) -> ReplicaResult<()> {
    let label = Regex::new(LABEL_PATTERN)
        .map_err(|e| ReplicaError::configuration(format!("invalid label pattern: {}", e)))?;

    let name = name.trim_end_matches('.');
    if name.len() > 253 {
        return Err(ReplicaError::configuration(format!(
            "Host name {} is longer than 253 characters",
            name
        )));
    }
    if name.eq_ignore_ascii_case("localhost") || name.starts_with("localhost.") {
        return Err(ReplicaError::configuration(format!(
            "Invalid hostname '{}', must not be localhost",
            name
        )));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(ReplicaError::configuration(format!(
            "Host name {} is not fully qualified",
            name
        )));
    }
    if let Some(bad) = labels.iter().find(|l| !label.is_match(l)) {
        return Err(ReplicaError::configuration(format!(
            "Invalid label '{}' in host name {}",
            bad, name
        )));
    }

    Ok(())
}

/// Resolves installer options into a replica configuration
pub struct ConfigResolver<'a> {
    paths: &'a SystemPaths,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(paths: &'a SystemPaths) -> Self {
        Self { paths }
    }

    /// Validate options that need neither the filesystem nor the network.
    pub fn check_options(options: &InstallOptions) -> ReplicaResult<()> {
        if options.setup_dns {
            let dns = &options.dns;
            if dns.forwarders.is_empty() && !dns.no_forwarders {
                return Err(ReplicaError::configuration(
                    "You must specify at least one --forwarder option or --no-forwarders option",
                ));
            }
            if !dns.forwarders.is_empty() && dns.no_forwarders {
                return Err(ReplicaError::configuration(
                    "--forwarder and --no-forwarders are mutually exclusive",
                ));
            }
        }

        if let Some(ip) = options.ip_addresses.iter().find(|ip| ip.is_loopback()) {
            return Err(ReplicaError::configuration(format!(
                "Invalid IP address {}: loopback addresses cannot be used",
                ip
            )));
        }

        if options.setup_kra && !options.setup_ca && options.mode() == Mode::Bundle {
            Logger::warn(
                "KRA_WITHOUT_LOCAL_CA",
                &[("detail", "KRA clone requested without a local CA clone")],
            );
        }

        Ok(())
    }

    /// Build the configuration; `work_dir` receives the extracted bundle.
    pub fn resolve(
        &self,
        options: &InstallOptions,
        work_dir: &Path,
    ) -> ReplicaResult<ReplicaConfiguration> {
        Self::check_options(options)?;

        let config = match &options.replica_file {
            Some(file) => self.resolve_bundle(options, file, work_dir)?,
            None => self.resolve_promotion(options, work_dir)?,
        };

        verify_fqdn(&config.host_name)?;
        verify_fqdn(&config.master_host_name)?;

        log_event_with_fields(
            Event::ConfigResolved,
            &[
                ("host", &config.host_name),
                ("master", &config.master_host_name),
                ("mode", config.mode.as_str()),
                ("realm", &config.realm_name),
            ],
        );

        Ok(config)
    }

    fn resolve_bundle(
        &self,
        options: &InstallOptions,
        file: &Path,
        work_dir: &Path,
    ) -> ReplicaResult<ReplicaConfiguration> {
        let bundle = TransferBundle::extract(file, work_dir)?;
        let info = &bundle.info;

        let realm_name = options.realm.clone().unwrap_or_else(|| info.realm_name.clone());
        let subject_base = info
            .subject_base
            .clone()
            .unwrap_or_else(|| format!("O={}", realm_name));

        Ok(ReplicaConfiguration {
            mode: Mode::Bundle,
            domain_name: options.domain.clone().unwrap_or_else(|| info.domain_name.clone()),
            host_name: options.hostname.clone().unwrap_or_else(|| info.host_name.clone()),
            master_host_name: info.master_host_name.clone(),
            ca_host_name: None,
            ca_material: bundle.carries_ca_material(),
            credential: options.dm_password.clone().map(Credential::new),
            subject_base,
            realm_name,
            ..Self::common(options, work_dir)
        })
    }

    fn resolve_promotion(
        &self,
        options: &InstallOptions,
        work_dir: &Path,
    ) -> ReplicaResult<ReplicaConfiguration> {
        let state = JoinState::load(&self.paths.client_state_dir, &self.paths.endpoint_file)?;

        let realm_name = options.realm.clone().unwrap_or(state.realm);
        Ok(ReplicaConfiguration {
            mode: Mode::Promotion,
            domain_name: options.domain.clone().unwrap_or(state.domain),
            host_name: options.hostname.clone().unwrap_or(state.host),
            master_host_name: state.server,
            ca_host_name: state.ca_host,
            ca_material: false,
            credential: options.admin_password.clone().map(Credential::new),
            subject_base: format!("O={}", realm_name),
            realm_name,
            ..Self::common(options, work_dir)
        })
    }

    /// Fields shared by both modes; identity fields are overwritten.
    fn common(options: &InstallOptions, work_dir: &Path) -> ReplicaConfiguration {
        ReplicaConfiguration {
            mode: options.mode(),
            realm_name: String::new(),
            domain_name: String::new(),
            host_name: String::new(),
            master_host_name: String::new(),
            ca_host_name: None,
            ip_addresses: options.ip_addresses.clone(),
            credential: None,
            principal: options.principal.clone(),
            admin_password: options.admin_password.clone().map(Credential::new),
            subject_base: String::new(),
            ca_material: false,
            features: FeatureFlags {
                setup_ca: options.setup_ca,
                setup_kra: options.setup_kra,
                setup_dns: options.setup_dns,
                time_sync: !options.no_ntp,
                pkinit: !options.no_pkinit,
                ui_redirect: !options.no_ui_redirect,
            },
            client: ClientFlags {
                no_ssh: options.no_ssh,
                no_sshd: options.no_sshd,
                no_dns_sshfp: options.no_dns_sshfp,
                ssh_trust_dns: options.ssh_trust_dns,
                mkhomedir: options.mkhomedir,
            },
            checks: CheckFlags {
                host_dns: !options.no_host_dns,
                conncheck: !options.skip_conncheck,
                interactive: options.interactive(),
            },
            dns: options.dns.clone(),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::net::IpAddr;
    use tar::Builder;
    use tempfile::TempDir;

    fn paths_in(root: &Path) -> SystemPaths {
        SystemPaths {
            client_state_dir: root.join("sysrestore"),
            endpoint_file: root.join("default.conf"),
            ..SystemPaths::default()
        }
    }

    fn write_bundle(path: &Path) {
        let src = TempDir::new().unwrap();
        fs::write(
            src.path().join("realm_info.json"),
            r#"{"realm_name":"EXAMPLE.COM","domain_name":"example.com","host_name":"replica.example.com","master_host_name":"master.example.com"}"#,
        )
        .unwrap();
        fs::write(src.path().join("ca.crt"), b"cert").unwrap();

        let mut builder = Builder::new(File::create(path).unwrap());
        builder.append_dir_all(".", src.path()).unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn test_verify_fqdn() {
        assert!(verify_fqdn("replica.example.com").is_ok());
        assert!(verify_fqdn("replica.example.com.").is_ok());
        assert!(verify_fqdn("replica").is_err());
        assert!(verify_fqdn("localhost.localdomain").is_err());
        assert!(verify_fqdn("bad_label.example.com").is_err());
        assert!(verify_fqdn("-lead.example.com").is_err());
    }

    #[test]
    fn test_dns_requires_forwarder_decision() {
        let mut options = InstallOptions {
            setup_dns: true,
            ..InstallOptions::default()
        };
        assert!(matches!(
            ConfigResolver::check_options(&options),
            Err(ReplicaError::Configuration(_))
        ));

        options.dns.no_forwarders = true;
        assert!(ConfigResolver::check_options(&options).is_ok());

        options.dns.no_forwarders = false;
        options.dns.forwarders = vec!["192.0.2.53".parse().unwrap()];
        assert!(ConfigResolver::check_options(&options).is_ok());
    }

    #[test]
    fn test_loopback_address_rejected() {
        let options = InstallOptions {
            ip_addresses: vec![IpAddr::from([127, 0, 0, 1])],
            ..InstallOptions::default()
        };
        assert!(ConfigResolver::check_options(&options).is_err());
    }

    #[test]
    fn test_bundle_mode_missing_file() {
        let temp = TempDir::new().unwrap();
        let paths = paths_in(temp.path());
        let options = InstallOptions {
            replica_file: Some(temp.path().join("missing.tar")),
            ..InstallOptions::default()
        };

        let err = ConfigResolver::new(&paths)
            .resolve(&options, temp.path())
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Configuration(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_bundle_mode_with_overrides() {
        let temp = TempDir::new().unwrap();
        let paths = paths_in(temp.path());
        let archive = temp.path().join("replica-info.tar");
        write_bundle(&archive);
        let work = temp.path().join("work");
        fs::create_dir(&work).unwrap();

        let options = InstallOptions {
            replica_file: Some(archive),
            hostname: Some("other.example.com".to_string()),
            dm_password: Some("Secret123".to_string()),
            ..InstallOptions::default()
        };
        let config = ConfigResolver::new(&paths).resolve(&options, &work).unwrap();

        assert_eq!(config.mode, Mode::Bundle);
        assert_eq!(config.realm_name, "EXAMPLE.COM");
        assert_eq!(config.host_name, "other.example.com");
        assert_eq!(config.master_host_name, "master.example.com");
        assert_eq!(config.subject_base, "O=EXAMPLE.COM");
        assert_eq!(config.credential.as_ref().unwrap().expose(), "Secret123");
        assert!(work.join("ca.crt").is_file());
    }

    #[test]
    fn test_promotion_mode_requires_join_state() {
        let temp = TempDir::new().unwrap();
        let paths = paths_in(temp.path());

        let err = ConfigResolver::new(&paths)
            .resolve(&InstallOptions::default(), temp.path())
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Configuration(_)));
    }

    #[test]
    fn test_promotion_mode_reads_join_state() {
        let temp = TempDir::new().unwrap();
        let paths = paths_in(temp.path());
        fs::create_dir(&paths.client_state_dir).unwrap();
        fs::write(paths.client_state_dir.join("sysrestore.index"), b"x").unwrap();
        fs::write(
            &paths.endpoint_file,
            "[global]\nhost=client.example.com\nrealm=EXAMPLE.COM\ndomain=example.com\nserver=master.example.com\n",
        )
        .unwrap();

        let config = ConfigResolver::new(&paths)
            .resolve(&InstallOptions::default(), temp.path())
            .unwrap();
        assert_eq!(config.mode, Mode::Promotion);
        assert_eq!(config.host_name, "client.example.com");
        assert_eq!(config.master_host_name, "master.example.com");
        assert!(config.features.time_sync);
    }
}
