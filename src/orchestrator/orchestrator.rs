//! Installation orchestrator
//!
//! Drives one run through the state machine:
//!
//! 1. `check` runs preflight and stops at `Validated`
//! 2. `commit` consumes the validated session and runs every commit step
//!    in order
//!
//! The caller may inspect the session between the two calls. No step is
//! retried and a failed run is never resumed; recovery is uninstall, then
//! a fresh run.

use std::path::PathBuf;

use crate::cluster::ServiceKind;
use crate::config::{bundle, pkcs12_info, Mode, Pkcs12Info, ReplicaConfiguration};
use crate::errors::{ReplicaError, ReplicaResult};
use crate::guard::InterruptFlag;
use crate::installers::{InstallRequest, InstallerError, InstallerSet, ServiceHandle};
use crate::observability::{
    log_event_with_fields, Event, Logger, ObservationScope, Phase, StepOutcome,
    StepRecorder,
};
use crate::preflight::PreflightValidator;
use crate::session::ReplicaSession;

use super::state::{InstallState, StateError};
use super::steps::CommitStep;

const DS_P12: (&str, &str) = ("dscert.p12", "dirsrv_pin.txt");
const HTTP_P12: (&str, &str) = ("httpcert.p12", "http_pin.txt");
const PKINIT_P12: (&str, &str) = ("pkinitcert.p12", "pkinit_pin.txt");

/// Handles of services installed so far, used by later steps
#[derive(Debug, Default)]
struct Handles {
    directory: Option<ServiceHandle>,
    ca: Option<ServiceHandle>,
    kerberos: Option<ServiceHandle>,
    http: Option<ServiceHandle>,
}

fn required(handle: &Option<ServiceHandle>, step: CommitStep, what: &str) -> ReplicaResult<ServiceHandle> {
    handle
        .clone()
        .ok_or_else(|| ReplicaError::provisioning(step.name(), format!("{} is not installed", what)))
}

/// Certificate seed from the bundle for one service (bundle mode only)
fn bundle_pkcs12(session: &ReplicaSession, names: (&str, &str)) -> ReplicaResult<Option<Pkcs12Info>> {
    if session.mode() != Mode::Bundle {
        return Ok(None);
    }
    Ok(pkcs12_info(&session.config.work_dir, names.0, names.1)?)
}

/// Installation orchestrator
pub struct Orchestrator<'a> {
    installers: &'a InstallerSet,
    recorder: &'a StepRecorder<'a>,
    interrupt: InterruptFlag,
    state: InstallState,
    executed: Vec<CommitStep>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        installers: &'a InstallerSet,
        recorder: &'a StepRecorder<'a>,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            installers,
            recorder,
            interrupt,
            state: InstallState::new(),
            executed: Vec::new(),
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Steps that ran in this run, in order, including a tolerated failure
    pub fn executed_steps(&self) -> &[CommitStep] {
        &self.executed
    }

    fn enter(
        &mut self,
        next: impl FnOnce(InstallState) -> Result<InstallState, StateError>,
    ) -> ReplicaResult<()> {
        let from = self.state;
        self.state = next(from)?;
        Logger::trace(
            "INSTALL_STATE",
            &[("from", from.state_name()), ("to", self.state.state_name())],
        );
        Ok(())
    }

    fn mark_failed(&mut self) {
        if let Ok(failed) = self.state.fail() {
            self.state = failed;
        }
    }

    /// Check phase: Init → Validated.
    ///
    /// Returns the checkpoint `commit` consumes. Nothing on the host has
    /// changed when this returns, whatever the outcome.
    pub fn check(
        &mut self,
        validator: &PreflightValidator<'_>,
        config: &ReplicaConfiguration,
    ) -> ReplicaResult<ReplicaSession> {
        if self.state != InstallState::Init {
            let err = StateError::forbidden_transition(self.state.state_name(), "Validated");
            return Err(err.into());
        }

        match validator.validate(config, self.recorder) {
            Ok(session) => {
                self.enter(InstallState::validate)?;
                Ok(session)
            }
            Err(e) => {
                self.mark_failed();
                Err(e)
            }
        }
    }

    /// Commit phase: Validated → Provisioning → Finalizing → Done.
    pub fn commit(&mut self, session: &ReplicaSession) -> ReplicaResult<()> {
        self.enter(InstallState::begin_provisioning)?;

        let scope = ObservationScope::with_fields(
            "COMMIT",
            &[("host", session.host_name()), ("mode", session.mode().as_str())],
        );

        match self.run_steps(session) {
            Ok(()) => {
                self.enter(InstallState::complete)?;
                let executed = self.executed.len().to_string();
                scope.complete_with_fields(&[("steps", &executed)]);
                log_event_with_fields(Event::InstallComplete, &[("host", session.host_name())]);
                Ok(())
            }
            Err(e) => {
                self.mark_failed();
                if e.is_clean_exit() {
                    scope.abandon(e.kind());
                } else {
                    scope.fail(e.kind(), &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run_steps(&mut self, session: &ReplicaSession) -> ReplicaResult<()> {
        let mut handles = Handles::default();

        for step in CommitStep::ALL {
            self.interrupt.check()?;

            if step.starts_finalizing() {
                self.enter(InstallState::begin_finalizing)?;
            }

            if !step.applies(session) {
                self.recorder.record(Phase::Commit, step.name(), StepOutcome::Skipped, None);
                continue;
            }

            let number = step.number().to_string();
            let scope = ObservationScope::with_fields(
                "COMMIT_STEP",
                &[("number", number.as_str()), ("step", step.name())],
            );
            let result = self
                .run_step(step, session, &mut handles)
                .map_err(|e| match self.interrupt.check() {
                    // A child killed by the same SIGINT fails with its own error.
                    Err(interrupted) => interrupted,
                    Ok(()) => e,
                });
            self.executed.push(step);

            match result {
                Ok(()) => {
                    scope.complete();
                    self.recorder.record(Phase::Commit, step.name(), StepOutcome::Succeeded, None);
                }
                Err(e) if !step.is_fatal() && !e.is_clean_exit() => {
                    let message = e.to_string();
                    scope.complete_with_fields(&[("tolerated", message.as_str())]);
                    Logger::warn("COMMIT_STEP_TOLERATED", &[("error", &message), ("step", step.name())]);
                    self.recorder.record(Phase::Commit, step.name(), StepOutcome::Tolerated, Some(&message));
                }
                Err(e) => {
                    let message = e.to_string();
                    if e.is_clean_exit() {
                        scope.abandon(e.kind());
                    } else {
                        scope.fail(e.kind(), &message);
                    }
                    self.recorder.record(Phase::Commit, step.name(), StepOutcome::Failed, Some(&message));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn run_step(&self, step: CommitStep, session: &ReplicaSession, handles: &mut Handles) -> ReplicaResult<()> {
        let installers = self.installers;
        let fail = |e: InstallerError| ReplicaError::provisioning(step.name(), e.to_string());
        let request = InstallRequest::new(session);

        match step {
            CommitStep::HostsFile => installers
                .host
                .update_hosts_file(session.host_name(), &session.ip_addresses)
                .map_err(fail),

            CommitStep::ServiceAccount => installers.host.create_service_account().map_err(fail),

            CommitStep::CaCertificate => installers.host.import_ca_certificate(session).map_err(fail),

            CommitStep::TimeSync => installers.time_sync.install(&request).map(|_| ()).map_err(fail),

            CommitStep::Directory => {
                let pkcs12 = bundle_pkcs12(session, DS_P12)?;
                let installed = installers
                    .directory
                    .install(&request.with_pkcs12(pkcs12.as_ref()))
                    .and_then(|handle| {
                        // The broker keeps its keys in the new directory instance.
                        installers.broker.install(&request)?;
                        Ok(handle)
                    });

                match installed {
                    Ok(handle) => {
                        installers.host.write_endpoint(session).map_err(fail)?;
                        handles.directory = Some(handle);
                        Ok(())
                    }
                    Err(e) => {
                        // Uninstall needs a member-like endpoint file on a promoted host.
                        if session.mode() == Mode::Promotion {
                            if let Err(w) = installers.host.write_endpoint(session) {
                                Logger::error("ENDPOINT_WRITE_FAILED", &[("error", &w.to_string())]);
                            }
                        }
                        Err(fail(e))
                    }
                }
            }

            CommitStep::DnsRecords => installers.dns.register_host_records(session).map_err(fail),

            CommitStep::CertificateAuthority => {
                let key_material = self.key_material(step, session, ServiceKind::CertificateAuthority)?;
                let handle = installers
                    .ca
                    .install(&InstallRequest::new(session).with_key_material(&key_material))
                    .map_err(fail)?;
                handles.ca = Some(handle);
                Ok(())
            }

            CommitStep::Kerberos => {
                let pkcs12 = if session.config.features.pkinit {
                    bundle_pkcs12(session, PKINIT_P12)?
                } else {
                    None
                };
                let handle = installers
                    .kerberos
                    .install(&request.with_pkcs12(pkcs12.as_ref()))
                    .map_err(fail)?;
                handles.kerberos = Some(handle);
                Ok(())
            }

            CommitStep::Http => {
                installers.session_cache.install(&request).map_err(fail)?;
                let pkcs12 = bundle_pkcs12(session, HTTP_P12)?;
                let handle = installers
                    .http
                    .install(&request.with_pkcs12(pkcs12.as_ref()))
                    .map_err(fail)?;
                handles.http = Some(handle);
                Ok(())
            }

            CommitStep::Otp => installers.otp.install(&request).map(|_| ()).map_err(fail),

            CommitStep::KeyRecoveryAuthority => {
                let key_material = self.key_material(step, session, ServiceKind::KeyRecoveryAuthority)?;
                installers
                    .kra
                    .install(&InstallRequest::new(session).with_key_material(&key_material))
                    .map(|_| ())
                    .map_err(fail)
            }

            CommitStep::DirectoryCertificate => {
                let directory = required(&handles.directory, step, "directory instance")?;
                installers
                    .directory
                    .attach_service_certificate(&directory)
                    .map_err(fail)
            }

            CommitStep::DirectoryUpdates => {
                let directory = required(&handles.directory, step, "directory instance")?;
                installers.directory.apply_updates(&directory).map_err(fail)
            }

            CommitStep::Restart => self.restart_services(step, session, handles),

            CommitStep::Client => installers.client.install(&request).map(|_| ()).map_err(fail),

            CommitStep::EnableService => installers.host.enable_cluster_service().map_err(fail),
        }
    }

    /// Key material for a CA or KRA clone.
    ///
    /// Bundle mode ships the CA keys in the bundle; everything else is
    /// fetched from the provider through the credential broker.
    fn key_material(
        &self,
        step: CommitStep,
        session: &ReplicaSession,
        kind: ServiceKind,
    ) -> ReplicaResult<PathBuf> {
        if session.mode() == Mode::Bundle && kind == ServiceKind::CertificateAuthority {
            return Ok(session.config.work_file(bundle::CA_P12));
        }

        let provider = session.providers.get(kind).ok_or_else(|| {
            ReplicaError::provisioning(step.name(), format!("no {} provider recorded", kind))
        })?;
        self.installers
            .broker
            .fetch_keys(kind, provider, &session.config.work_dir)
            .map_err(|e| ReplicaError::provisioning(step.name(), e.to_string()))
    }

    /// Restart order: directory, KDC (bundle mode), CA, DNS, gateway.
    fn restart_services(
        &self,
        step: CommitStep,
        session: &ReplicaSession,
        handles: &Handles,
    ) -> ReplicaResult<()> {
        let installers = self.installers;
        let fail = |e: InstallerError| ReplicaError::provisioning(step.name(), e.to_string());

        let directory = required(&handles.directory, step, "directory instance")?;
        installers.directory.restart(&directory).map_err(fail)?;

        if session.mode() == Mode::Bundle {
            let kerberos = required(&handles.kerberos, step, "KDC")?;
            installers.kerberos.restart(&kerberos).map_err(fail)?;
        }

        if let Some(ca) = &handles.ca {
            installers.ca.restart(ca).map_err(fail)?;
        }

        if session.config.features.setup_dns {
            installers
                .dns
                .install(&InstallRequest::new(session))
                .map_err(fail)?;
        }

        let http = required(&handles.http, step, "web gateway")?;
        installers.http.restart(&http).map_err(fail)?;

        Ok(())
    }
}
