//! Installers backed by external programs
//!
//! Every call runs `<program> <action>` with one JSON request object on
//! stdin. Exit status zero is success; stdout may carry a JSON reply:
//!
//! - `install`: `{"instance": "..."}`
//! - `check`: `{"outcome": "pass" | "warn" | "fatal", "message": "..."}`
//! - `fetch-keys`: `{"path": "..."}`
//!
//! Programs are looked up on `PATH` at call time, so a missing program
//! fails the step that needs it and nothing earlier.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::cluster::ServiceKind;
use crate::config::{ReplicaConfiguration, SystemPaths};
use crate::errors::{ReplicaError, ReplicaResult};
use crate::observability::Logger;
use crate::preflight::ValidationOutcome;
use crate::session::ReplicaSession;

use super::contract::{
    Component, DirectoryInstaller, DnsInstaller, InstallRequest, InstallerError,
    InstallerResult, KeyBroker, ServiceHandle, ServiceInstaller,
};

#[derive(Debug, Deserialize)]
struct CheckReply {
    outcome: String,
    #[serde(default)]
    message: String,
}

/// Request fields every action receives
fn config_payload(config: &ReplicaConfiguration) -> Value {
    json!({
        "mode": config.mode.as_str(),
        "realm": config.realm_name,
        "domain": config.domain_name,
        "host": config.host_name,
        "master": config.master_host_name,
        "setup_ca": config.features.setup_ca,
        "setup_kra": config.features.setup_kra,
        "setup_dns": config.features.setup_dns,
        "pkinit": config.features.pkinit,
        "ui_redirect": config.features.ui_redirect,
        "dns": {
            "forwarders": config.dns.forwarders.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "no_forwarders": config.dns.no_forwarders,
            "no_reverse": config.dns.no_reverse,
        },
        "client": {
            "no_ssh": config.client.no_ssh,
            "no_sshd": config.client.no_sshd,
            "no_dns_sshfp": config.client.no_dns_sshfp,
            "ssh_trust_dns": config.client.ssh_trust_dns,
            "mkhomedir": config.client.mkhomedir,
        },
    })
}

fn install_payload(request: &InstallRequest<'_>) -> Value {
    let session = request.session;
    let mut payload = config_payload(&session.config);
    if let Value::Object(map) = &mut payload {
        map.insert("subject_base".into(), json!(session.subject_base));
        map.insert("ca_host".into(), json!(session.ca_host()));
        map.insert("kra_host".into(), json!(session.kra_host()));
        map.insert(
            "ip_addresses".into(),
            json!(session.ip_addresses.iter().map(ToString::to_string).collect::<Vec<_>>()),
        );
        map.insert("dirman_password".into(), json!(session.dirman_password.expose()));
        if let Some(p12) = request.pkcs12 {
            map.insert(
                "pkcs12".into(),
                json!({ "cert": p12.cert_path, "pin": p12.pin.expose() }),
            );
        }
        if let Some(path) = request.key_material {
            map.insert("key_material".into(), json!(path));
        }
    }
    payload
}

/// Installer driving one external program
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    component: Component,
    program: String,
}

impl CommandInstaller {
    pub fn new(component: Component, program: impl Into<String>) -> Self {
        Self {
            component,
            program: program.into(),
        }
    }

    /// Installer for `component` as named in the paths configuration
    pub fn configured(paths: &SystemPaths, component: Component) -> ReplicaResult<Self> {
        Ok(Self::new(component, paths.installer(component.name())?))
    }

    fn err(&self, message: impl Into<String>) -> InstallerError {
        InstallerError::new(self.component, message)
    }

    fn locate(&self) -> InstallerResult<PathBuf> {
        which::which(&self.program)
            .map_err(|e| self.err(format!("installer program '{}' not found: {}", self.program, e)))
    }

    fn run(&self, action: &str, request: &Value) -> InstallerResult<Value> {
        let program = self.locate()?;
        Logger::trace(
            "INSTALLER_CALL",
            &[("action", action), ("component", self.component.name())],
        );

        let mut child = Command::new(&program)
            .arg(action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.err(format!("failed to run {}: {}", program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = request.to_string();
            if let Err(e) = stdin.write_all(body.as_bytes()) {
                // Programs that ignore their input may exit before reading it.
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(self.err(format!("failed to send request: {}", e)));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| self.err(format!("{} {} failed: {}", program.display(), action, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.err(format!(
                "{} {} exited with {}: {}",
                program.display(),
                action,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(stdout.trim())
            .map_err(|e| self.err(format!("malformed reply to {}: {}", action, e)))
    }

    /// Run `action` and discard the reply.
    pub fn call(&self, action: &str, request: &Value) -> InstallerResult<()> {
        self.run(action, request).map(|_| ())
    }

    fn handle_from(&self, reply: &Value) -> ServiceHandle {
        let instance = reply
            .get("instance")
            .and_then(Value::as_str)
            .unwrap_or(self.component.name());
        ServiceHandle::new(self.component, instance)
    }

    fn outcome_from(&self, reply: Value) -> ValidationOutcome {
        if reply.is_null() {
            return ValidationOutcome::Pass;
        }
        match serde_json::from_value::<CheckReply>(reply) {
            Ok(r) if r.outcome == "pass" => ValidationOutcome::Pass,
            Ok(r) if r.outcome == "warn" => ValidationOutcome::Warn(r.message),
            Ok(r) => ValidationOutcome::Fatal(ReplicaError::configuration(format!(
                "{} check failed: {}",
                self.component, r.message
            ))),
            Err(e) => ValidationOutcome::Fatal(ReplicaError::configuration(format!(
                "{} check returned a malformed reply: {}",
                self.component, e
            ))),
        }
    }
}

impl ServiceInstaller for CommandInstaller {
    fn component(&self) -> Component {
        self.component
    }

    fn check(&self, config: &ReplicaConfiguration) -> ValidationOutcome {
        match self.run("check", &config_payload(config)) {
            Ok(reply) => self.outcome_from(reply),
            Err(e) => ValidationOutcome::Fatal(ReplicaError::configuration(e.to_string())),
        }
    }

    fn install(&self, request: &InstallRequest<'_>) -> InstallerResult<ServiceHandle> {
        let reply = self.run("install", &install_payload(request))?;
        Ok(self.handle_from(&reply))
    }

    fn restart(&self, handle: &ServiceHandle) -> InstallerResult<()> {
        self.call("restart", &json!({ "instance": handle.instance }))
    }
}

impl DirectoryInstaller for CommandInstaller {
    fn attach_service_certificate(&self, handle: &ServiceHandle) -> InstallerResult<()> {
        self.call("attach-cert", &json!({ "instance": handle.instance }))
    }

    fn apply_updates(&self, handle: &ServiceHandle) -> InstallerResult<()> {
        self.call("apply-updates", &json!({ "instance": handle.instance }))
    }
}

impl DnsInstaller for CommandInstaller {
    fn register_host_records(&self, session: &ReplicaSession) -> InstallerResult<()> {
        let request = json!({
            "host": session.host_name(),
            "domain": session.config.domain_name,
            "ip_addresses": session.ip_addresses.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "no_reverse": session.config.dns.no_reverse,
        });
        self.call("register-records", &request)
    }
}

impl KeyBroker for CommandInstaller {
    fn fetch_keys(
        &self,
        kind: ServiceKind,
        provider: &str,
        dest_dir: &Path,
    ) -> InstallerResult<PathBuf> {
        let request = json!({
            "kind": kind.as_str(),
            "provider": provider,
            "dest_dir": dest_dir,
        });
        let reply = self.run("fetch-keys", &request)?;
        reply
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| self.err(format!("no key material path returned for {}", kind)))
    }
}
