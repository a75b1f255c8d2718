//! Preflight validation
//!
//! Runs every read-only check in a fixed order and produces the session
//! the commit phase consumes. The first fatal check stops the run.
//!
//! 1. local state: join-client state matches the mode, gateway not set up
//! 2. directory ports free
//! 3. time service conflicts (warning only)
//! 4. credential
//! 5. connect to the master
//! 6. no replication agreement for this host
//! 7. domain level within bounds
//! 8. no host entry for this host (bundle mode)
//! 9. optional service providers and installer checks
//! 10. forward/reverse DNS of master and host
//! 11. connectivity rehearsal towards the master
//!
//! The only writes are the provisional endpoint file (bundle mode, before
//! step 5) and journal records. The cluster session is closed before
//! `validate` returns, whatever the outcome.

use std::net::IpAddr;
use std::path::Path;

use rand::RngCore;

use crate::cluster::{
    check_domain_level, ClusterBind, ClusterConnector, ClusterError, DomainLevel, ProviderMap,
    ServiceKind, SessionGuard,
};
use crate::config::{Credential, EndpointDescription, Mode, ReplicaConfiguration, SystemPaths};
use crate::errors::{ConnectivityFailure, ReplicaError, ReplicaResult};
use crate::guard::InterruptFlag;
use crate::installers::InstallerSet;
use crate::observability::{
    log_event_with_fields, Event, Logger, ObservationScope, Phase, StepOutcome, StepRecorder,
};
use crate::session::ReplicaSession;

use super::conncheck::{required_ports, PortChecker};
use super::dns::{check_dns_resolution, NameResolver};
use super::outcome::ValidationOutcome;
use super::prompt::Prompter;
use super::system::{HostInfo, DIRECTORY_PORTS};

const DIRMAN_IDENTITY: &str = "cn=Directory Manager";
const DEFAULT_PRINCIPAL: &str = "admin";

/// What preflight learned from the cluster
struct Discovery {
    providers: ProviderMap,
    subject_base: String,
}

/// Preflight validator
///
/// Holds borrowed collaborators only; validating twice with the same
/// collaborators gives the same result.
pub struct PreflightValidator<'a> {
    pub paths: &'a SystemPaths,
    pub host: &'a dyn HostInfo,
    pub cluster: &'a dyn ClusterConnector,
    pub resolver: &'a dyn NameResolver,
    pub network: &'a dyn PortChecker,
    pub prompter: &'a dyn Prompter,
    pub installers: &'a InstallerSet,
    /// Checked before every check; a check failing after it is raised is an interrupt
    pub interrupt: &'a InterruptFlag,
}

impl<'a> PreflightValidator<'a> {
    /// Run every check and build the session for the commit phase.
    pub fn validate(
        &self,
        config: &ReplicaConfiguration,
        recorder: &StepRecorder<'_>,
    ) -> ReplicaResult<ReplicaSession> {
        let scope = ObservationScope::with_fields(
            "PREFLIGHT",
            &[("host", &config.host_name), ("mode", config.mode.as_str())],
        );

        match self.run(config, recorder) {
            Ok(session) => {
                scope.complete();
                Ok(session)
            }
            Err(e) if e.is_clean_exit() => {
                scope.abandon(e.kind());
                Err(e)
            }
            Err(e) => {
                scope.fail(e.kind(), &e.to_string());
                Err(e)
            }
        }
    }

    fn run(
        &self,
        config: &ReplicaConfiguration,
        recorder: &StepRecorder<'_>,
    ) -> ReplicaResult<ReplicaSession> {
        self.step(recorder, "local-state", || self.check_local_state(config.mode))?;
        self.step(recorder, "ports", || self.check_ports())?;

        if config.features.time_sync {
            self.step(recorder, "time-sync", || {
                apply_outcome("time-sync", self.check_time_sync())
            })?;
        } else {
            recorder.record(Phase::Preflight, "time-sync", StepOutcome::Skipped, None);
        }

        let credential = self.step(recorder, "credential", || self.obtain_credential(config))?;

        if config.is_bundle() {
            self.step(recorder, "endpoint-provisional", || {
                self.write_provisional_endpoint(config)
            })?;
        }

        let discovery = {
            let session = self.step(recorder, "connect", || self.connect(config, &credential))?;
            let discovery = self.discover(config, &session, recorder);
            drop(session);
            log_event_with_fields(Event::SessionClosed, &[("master", &config.master_host_name)]);
            discovery?
        };

        if config.features.setup_dns {
            self.step(recorder, "dns-check", || {
                apply_outcome("dns-check", self.installers.dns.check(config))
            })?;
        }

        let ip_addresses = self.step(recorder, "addresses", || self.local_addresses(config))?;

        if config.checks.conncheck {
            self.step(recorder, "conncheck", || self.rehearse(config))?;
        } else {
            recorder.record(Phase::Preflight, "conncheck", StepOutcome::Skipped, None);
        }

        let dirman_password = match config.mode {
            Mode::Bundle => credential.clone(),
            Mode::Promotion => generate_password(),
        };

        Ok(ReplicaSession {
            config: config.clone(),
            credential,
            dirman_password,
            providers: discovery.providers,
            ip_addresses,
            update_hosts_file: config.features.setup_dns || !config.ip_addresses.is_empty(),
            subject_base: discovery.subject_base,
        })
    }

    /// Steps 6 to 10, all against the open session.
    fn discover(
        &self,
        config: &ReplicaConfiguration,
        session: &SessionGuard,
        recorder: &StepRecorder<'_>,
    ) -> ReplicaResult<Discovery> {
        self.step(recorder, "replication-agreement", || {
            let exists = session
                .agreement_exists(&config.host_name)
                .map_err(|e| self.cluster_error(config, e))?;
            if exists {
                return Err(ReplicaError::state_conflict(
                    "A replication agreement for this host already exists. It needs to be removed.",
                    format!(
                        "Run this on the master: ipa-replica-manage del {} --force",
                        config.host_name
                    ),
                ));
            }
            Ok(())
        })?;

        self.step(recorder, "domain-level", || self.check_level(config, session))?;

        if config.is_bundle() {
            self.step(recorder, "host-entry", || {
                let exists = session
                    .host_entry_exists(&config.host_name)
                    .map_err(|e| self.cluster_error(config, e))?;
                if exists {
                    return Err(ReplicaError::state_conflict(
                        format!("The host {} already exists on the master server.", config.host_name),
                        format!("You should remove it before proceeding: ipa host-del {}", config.host_name),
                    ));
                }
                Ok(())
            })?;
        } else {
            recorder.record(Phase::Preflight, "host-entry", StepOutcome::Skipped, None);
        }

        let discovery = self.step(recorder, "providers", || self.find_providers(config, session))?;

        self.step(recorder, "host-dns", || self.check_host_dns(config, session))?;

        Ok(discovery)
    }

    fn check_local_state(&self, mode: Mode) -> ReplicaResult<()> {
        let configured = self.host.client_configured();
        match mode {
            Mode::Bundle if configured => {
                return Err(ReplicaError::state_conflict(
                    "IPA client is already configured on this system.",
                    "Please uninstall it first before configuring the replica, \
                     using 'ipa-client-install --uninstall'.",
                ));
            }
            Mode::Promotion if !configured => {
                return Err(ReplicaError::state_conflict(
                    "IPA client is not configured on this system.",
                    "Join the host with 'ipa-client-install' first, then retry \
                     without a replica file.",
                ));
            }
            _ => {}
        }

        if self.host.gateway_configured() {
            return Err(ReplicaError::state_conflict(
                "Aborting installation: the web gateway is already configured to listen on 443.",
                format!("Run {} --uninstall to clean up.", self.paths.uninstall_command),
            ));
        }
        Ok(())
    }

    fn check_ports(&self) -> ReplicaResult<()> {
        let busy: Vec<String> = DIRECTORY_PORTS
            .iter()
            .filter(|port| self.host.port_in_use(**port))
            .map(u16::to_string)
            .collect();

        if !busy.is_empty() {
            return Err(ReplicaError::state_conflict(
                format!(
                    "IPA requires ports 389 and 636 for the Directory Server. \
                     These are currently in use: {}",
                    busy.join(", ")
                ),
                "Stop the services listening on these ports and retry.",
            ));
        }
        Ok(())
    }

    fn check_time_sync(&self) -> ValidationOutcome {
        match self.host.conflicting_time_service() {
            Some(service) => ValidationOutcome::Warn(format!(
                "conflicting time&date synchronization service '{}' will be disabled \
                 in favor of the cluster time service",
                service
            )),
            None => ValidationOutcome::Pass,
        }
    }

    fn obtain_credential(&self, config: &ReplicaConfiguration) -> ReplicaResult<Credential> {
        if let Some(credential) = config.credential.as_ref().filter(|c| !c.is_empty()) {
            return Ok(credential.clone());
        }

        if config.checks.interactive {
            let label = match config.mode {
                Mode::Bundle => "Directory Manager (existing master) password".to_string(),
                Mode::Promotion => format!(
                    "Password for {}",
                    config.principal.as_deref().unwrap_or(DEFAULT_PRINCIPAL)
                ),
            };
            if let Some(secret) = self.prompter.read_password(&label)? {
                if !secret.is_empty() {
                    return Ok(Credential::new(secret));
                }
            }
        }

        Err(ReplicaError::configuration(match config.mode {
            Mode::Bundle => "Directory Manager password required",
            Mode::Promotion => "Administrative password required",
        }))
    }

    fn write_provisional_endpoint(&self, config: &ReplicaConfiguration) -> ReplicaResult<()> {
        let path = &self.paths.endpoint_file;
        EndpointDescription::for_replica(config, config.ca_material).write_provisional(path)?;

        let path_text = path.display().to_string();
        log_event_with_fields(Event::EndpointProvisional, &[("path", &path_text)]);
        Ok(())
    }

    fn connect(
        &self,
        config: &ReplicaConfiguration,
        credential: &Credential,
    ) -> ReplicaResult<SessionGuard> {
        let ca_file = config.ca_file(&self.paths.ca_cert);
        require_ca_file(config.mode, &ca_file)?;

        let identity = match config.mode {
            Mode::Bundle => DIRMAN_IDENTITY.to_string(),
            Mode::Promotion => config
                .principal
                .clone()
                .unwrap_or_else(|| DEFAULT_PRINCIPAL.to_string()),
        };
        let bind = ClusterBind {
            identity,
            secret: credential.clone(),
            ca_file,
        };

        let session = self
            .cluster
            .connect(&config.master_host_name, &bind)
            .map_err(|e| self.cluster_error(config, e))?;

        log_event_with_fields(Event::SessionOpened, &[("master", &config.master_host_name)]);
        Ok(SessionGuard::new(session))
    }

    fn check_level(&self, config: &ReplicaConfiguration, session: &SessionGuard) -> ReplicaResult<()> {
        let level = match session.domain_level() {
            Ok(level) => level,
            // Masters that predate domain levels have no entry at all.
            Err(ClusterError::NotFound(_)) => DomainLevel::LEGACY,
            Err(e) => return Err(self.cluster_error(config, e)),
        };
        Logger::info("DOMAIN_LEVEL", &[("level", &level.to_string())]);

        check_domain_level(level, config.mode)?;

        if config.mode == Mode::Promotion {
            let present = session
                .replication_managers_exist()
                .map_err(|e| self.cluster_error(config, e))?;
            if !present {
                return Err(ReplicaError::compatibility(
                    level.value(),
                    "The Replication Managers group is not available in the domain. \
                     Replica promotion requires the use of Replication Managers to be able \
                     to replicate data. Upgrade the peer master or use the \
                     ipa-replica-prepare command on the master and use a prep file to \
                     install this replica.",
                ));
            }
        }
        Ok(())
    }

    fn find_providers(
        &self,
        config: &ReplicaConfiguration,
        session: &SessionGuard,
    ) -> ReplicaResult<Discovery> {
        let master = &config.master_host_name;
        let mut providers = ProviderMap::new();

        let subject_base = match config.mode {
            Mode::Promotion => session
                .subject_base()
                .map_err(|e| self.cluster_error(config, e))?
                .unwrap_or_else(|| config.subject_base.clone()),
            Mode::Bundle => config.subject_base.clone(),
        };

        let ca_host = session
            .find_provider(ServiceKind::CertificateAuthority, master)
            .map_err(|e| self.cluster_error(config, e))?;
        match config.mode {
            Mode::Promotion => {
                let host = ca_host.ok_or_else(|| {
                    ReplicaError::provider_unavailable(
                        ServiceKind::CertificateAuthority.as_str(),
                        "The remote master does not have a CA installed, can't proceed \
                         without certs",
                    )
                })?;
                providers.insert(ServiceKind::CertificateAuthority, host);
            }
            Mode::Bundle => {
                if config.features.setup_ca && !config.ca_material {
                    return Err(ReplicaError::provider_unavailable(
                        ServiceKind::CertificateAuthority.as_str(),
                        "The replica file carries no CA certificate material, can't set up \
                         a CA clone",
                    ));
                }
                if config.ca_material {
                    providers.insert(
                        ServiceKind::CertificateAuthority,
                        ca_host.unwrap_or_else(|| master.clone()),
                    );
                }
            }
        }

        let kra_host = session
            .find_provider(ServiceKind::KeyRecoveryAuthority, master)
            .map_err(|e| self.cluster_error(config, e))?;
        match kra_host {
            Some(host) => providers.insert(ServiceKind::KeyRecoveryAuthority, host),
            None if config.features.setup_kra => {
                return Err(ReplicaError::provider_unavailable(
                    ServiceKind::KeyRecoveryAuthority.as_str(),
                    "There is no KRA server in the domain, can't setup a KRA clone",
                ));
            }
            None => {}
        }

        if config.features.setup_ca {
            apply_outcome("ca-check", self.installers.ca.check(config))?;
        }
        if config.features.setup_kra {
            apply_outcome("kra-check", self.installers.kra.check(config))?;
        }

        Ok(Discovery {
            providers,
            subject_base,
        })
    }

    fn check_host_dns(&self, config: &ReplicaConfiguration, session: &SessionGuard) -> ReplicaResult<()> {
        if !config.checks.host_dns {
            return Ok(());
        }

        let servers = session
            .dns_masters()
            .map_err(|e| self.cluster_error(config, e))?;
        if servers.is_empty() {
            Logger::trace("DNS_CHECK_SKIPPED", &[("reason", "no cluster name servers")]);
            return Ok(());
        }

        let resolved = check_dns_resolution(self.resolver, &config.master_host_name, &servers)
            && check_dns_resolution(self.resolver, &config.host_name, &servers);
        if resolved {
            return Ok(());
        }

        if config.checks.interactive {
            if self.prompter.confirm("Continue?", false)? {
                return Ok(());
            }
            return Err(ReplicaError::UserAbort);
        }

        Err(ReplicaError::state_conflict(
            format!(
                "Forward and reverse DNS records of {} or {} do not match.",
                config.master_host_name, config.host_name
            ),
            "Fix the DNS records, or rerun with --no-host-dns to skip this check.",
        ))
    }

    fn local_addresses(&self, config: &ReplicaConfiguration) -> ReplicaResult<Vec<IpAddr>> {
        if !config.ip_addresses.is_empty() {
            return Ok(config.ip_addresses.clone());
        }

        let found = self.host.resolve_host(&config.host_name);
        if found.is_empty() {
            return Err(ReplicaError::configuration(format!(
                "Unable to resolve IP address for host name {}; use --ip-address",
                config.host_name
            )));
        }
        Ok(found)
    }

    fn rehearse(&self, config: &ReplicaConfiguration) -> ReplicaResult<()> {
        let ports = required_ports(config.mode, config.features.setup_ca);
        let blocked = self
            .network
            .unreachable_ports(&config.master_host_name, &ports);

        if !blocked.is_empty() {
            return Err(ReplicaError::connectivity(
                config.master_host_name.clone(),
                ConnectivityFailure::PortsBlocked(blocked),
            ));
        }
        Ok(())
    }

    fn cluster_error(&self, config: &ReplicaConfiguration, err: ClusterError) -> ReplicaError {
        Logger::error(
            "CLUSTER_QUERY_FAILED",
            &[("error", &err.to_string()), ("master", &config.master_host_name)],
        );

        let failure = match (&err, config.mode) {
            (ClusterError::AccessDenied(_), Mode::Bundle) => ConnectivityFailure::CredentialRejected,
            (ClusterError::AccessDenied(_), Mode::Promotion) => {
                ConnectivityFailure::InsufficientPrivileges
            }
            _ => ConnectivityFailure::Unreachable,
        };
        ReplicaError::connectivity(config.master_host_name.clone(), failure)
    }

    /// Run one check and journal its outcome.
    fn step<T>(
        &self,
        recorder: &StepRecorder<'_>,
        name: &str,
        check: impl FnOnce() -> ReplicaResult<T>,
    ) -> ReplicaResult<T> {
        self.interrupt.check()?;
        // Helpers and prompts killed by the same SIGINT fail with their own error.
        let result = check().map_err(|e| match self.interrupt.check() {
            Err(interrupted) => interrupted,
            Ok(()) => e,
        });
        match &result {
            Ok(_) => recorder.record(Phase::Preflight, name, StepOutcome::Succeeded, None),
            Err(e) => {
                let message = e.to_string();
                recorder.record(Phase::Preflight, name, StepOutcome::Failed, Some(&message));
            }
        }
        result
    }
}

fn apply_outcome(step: &str, outcome: ValidationOutcome) -> ReplicaResult<()> {
    if let Some(warning) = outcome.into_result()? {
        log_event_with_fields(Event::PreflightWarning, &[("message", &warning), ("step", step)]);
    }
    Ok(())
}

fn require_ca_file(mode: Mode, ca_file: &Path) -> ReplicaResult<()> {
    if ca_file.is_file() {
        return Ok(());
    }
    Err(ReplicaError::configuration(match mode {
        Mode::Bundle => {
            "CA cert file is not available. Please run ipa-replica-prepare to create a new \
             replica file."
        }
        Mode::Promotion => "CA cert file is not available. Please reinstall the client and try again.",
    }))
}

/// Fresh Directory Manager password for a promoted replica.
fn generate_password() -> Credential {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    Credential::new(bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>())
}
