//! Test doubles shared by the integration tests
//!
//! Every double records what it was asked into one call log so tests can
//! assert on ordering across collaborators. Installer failures are
//! injected by call name ("kerberos.install", "dns.register_records").
//! An interrupting call raises the shared interrupt flag and then fails,
//! the way a child program killed by SIGINT does.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::TempDir;

use replica_install::cluster::{
    ClusterBind, ClusterConnector, ClusterError, ClusterResult, ClusterSession, DomainLevel,
    ServiceKind,
};
use replica_install::config::{
    CheckFlags, ClientFlags, Credential, DnsOptions, FeatureFlags, Mode, ReplicaConfiguration,
    SystemPaths,
};
use replica_install::errors::ReplicaError;
use replica_install::guard::InterruptFlag;
use replica_install::installers::{
    Component, DirectoryInstaller, DnsInstaller, HostConfigurator, InstallRequest, InstallerError,
    InstallerResult, InstallerSet, KeyBroker, ServiceHandle, ServiceInstaller,
};
use replica_install::observability::{MemoryStepJournal, StepRecorder};
use replica_install::preflight::{
    HostInfo, NameResolver, PortChecker, PreflightValidator, Prompter, ValidationOutcome,
};
use replica_install::session::ReplicaSession;

pub const HOST: &str = "replica.example.com";
pub const MASTER: &str = "master.example.com";
pub const HOST_ADDR: &str = "192.0.2.20";
pub const MASTER_ADDR: &str = "192.0.2.10";

pub type CallLog = Rc<RefCell<Vec<String>>>;
pub type Failures = Rc<RefCell<HashSet<String>>>;

// =============================================================================
// Local host
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    pub client_configured: bool,
    pub gateway_configured: bool,
    pub busy_ports: Vec<u16>,
    pub time_service: Option<String>,
    pub addresses: Vec<IpAddr>,
}

impl HostInfo for FakeHost {
    fn client_configured(&self) -> bool {
        self.client_configured
    }

    fn gateway_configured(&self) -> bool {
        self.gateway_configured
    }

    fn port_in_use(&self, port: u16) -> bool {
        self.busy_ports.contains(&port)
    }

    fn conflicting_time_service(&self) -> Option<String> {
        self.time_service.clone()
    }

    fn resolve_host(&self, _host: &str) -> Vec<IpAddr> {
        self.addresses.clone()
    }
}

// =============================================================================
// Cluster
// =============================================================================

/// What the fake cluster answers
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub connect_error: Option<ClusterError>,
    pub agreement_exists: bool,
    pub domain_level: Result<DomainLevel, ClusterError>,
    pub host_entry_exists: bool,
    pub replication_managers: bool,
    pub subject_base: Option<String>,
    pub ca_provider: Option<String>,
    pub kra_provider: Option<String>,
    pub dns_masters: Vec<String>,
    /// Raise the interrupt flag, then fail to connect
    pub interrupt_on_connect: bool,
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            connect_error: None,
            agreement_exists: false,
            domain_level: Ok(DomainLevel(0)),
            host_entry_exists: false,
            replication_managers: true,
            subject_base: Some("O=EXAMPLE.COM".to_string()),
            ca_provider: Some(MASTER.to_string()),
            kra_provider: Some(MASTER.to_string()),
            dns_masters: Vec::new(),
            interrupt_on_connect: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    pub state: Rc<RefCell<ClusterState>>,
    pub opened: Rc<Cell<u32>>,
    pub closed: Rc<Cell<u32>>,
    pub binds: Rc<RefCell<Vec<String>>>,
    pub interrupt: InterruptFlag,
}

impl FakeCluster {
    pub fn set(&self, update: impl FnOnce(&mut ClusterState)) {
        update(&mut self.state.borrow_mut());
    }

    pub fn balanced(&self) -> bool {
        self.opened.get() == self.closed.get()
    }
}

struct FakeSession {
    state: ClusterState,
    closed: Rc<Cell<u32>>,
    connected: bool,
}

impl ClusterSession for FakeSession {
    fn agreement_exists(&self, _host: &str) -> ClusterResult<bool> {
        Ok(self.state.agreement_exists)
    }

    fn domain_level(&self) -> ClusterResult<DomainLevel> {
        self.state.domain_level.clone()
    }

    fn host_entry_exists(&self, _host: &str) -> ClusterResult<bool> {
        Ok(self.state.host_entry_exists)
    }

    fn replication_managers_exist(&self) -> ClusterResult<bool> {
        Ok(self.state.replication_managers)
    }

    fn subject_base(&self) -> ClusterResult<Option<String>> {
        Ok(self.state.subject_base.clone())
    }

    fn find_provider(&self, kind: ServiceKind, _preferred: &str) -> ClusterResult<Option<String>> {
        Ok(match kind {
            ServiceKind::CertificateAuthority => self.state.ca_provider.clone(),
            ServiceKind::KeyRecoveryAuthority => self.state.kra_provider.clone(),
        })
    }

    fn dns_masters(&self) -> ClusterResult<Vec<String>> {
        Ok(self.state.dns_masters.clone())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.closed.set(self.closed.get() + 1);
        }
    }
}

impl ClusterConnector for FakeCluster {
    fn connect(&self, _master: &str, bind: &ClusterBind) -> ClusterResult<Box<dyn ClusterSession>> {
        self.binds.borrow_mut().push(bind.identity.clone());
        let state = self.state.borrow().clone();
        if state.interrupt_on_connect {
            self.interrupt.raise();
            return Err(ClusterError::Unreachable("query helper terminated by signal 2".into()));
        }
        if let Some(err) = state.connect_error.clone() {
            return Err(err);
        }
        self.opened.set(self.opened.get() + 1);
        Ok(Box::new(FakeSession {
            state,
            closed: self.closed.clone(),
            connected: true,
        }))
    }
}

// =============================================================================
// Name resolution, network, prompts
// =============================================================================

/// Forward and reverse records that agree for master and host
#[derive(Debug, Clone)]
pub struct FakeResolver {
    pub forward: HashMap<String, Vec<IpAddr>>,
    pub reverse: HashMap<IpAddr, Vec<String>>,
}

impl Default for FakeResolver {
    fn default() -> Self {
        let host: IpAddr = HOST_ADDR.parse().unwrap();
        let master: IpAddr = MASTER_ADDR.parse().unwrap();
        Self {
            forward: HashMap::from([
                (HOST.to_string(), vec![host]),
                (MASTER.to_string(), vec![master]),
            ]),
            reverse: HashMap::from([
                (host, vec![format!("{}.", HOST)]),
                (master, vec![format!("{}.", MASTER)]),
            ]),
        }
    }
}

impl FakeResolver {
    /// Reverse record of the host points somewhere else
    pub fn mismatched() -> Self {
        let mut resolver = Self::default();
        let host: IpAddr = HOST_ADDR.parse().unwrap();
        resolver.reverse.insert(host, vec!["other.example.com.".to_string()]);
        resolver
    }
}

impl NameResolver for FakeResolver {
    fn lookup_addresses(&self, _servers: &[String], host: &str) -> Vec<IpAddr> {
        self.forward.get(host).cloned().unwrap_or_default()
    }

    fn lookup_ptr(&self, _servers: &[String], addr: IpAddr) -> Result<Vec<String>, String> {
        self.reverse.get(&addr).cloned().ok_or_else(|| "NXDOMAIN".to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeNetwork {
    pub blocked: Vec<u16>,
}

impl PortChecker for FakeNetwork {
    fn unreachable_ports(&self, _host: &str, ports: &[u16]) -> Vec<u16> {
        ports.iter().copied().filter(|p| self.blocked.contains(p)).collect()
    }
}

/// Answers prompts from a script and records every question
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
    pub password: Option<String>,
    pub answer: Option<bool>,
    pub asked: Rc<RefCell<Vec<String>>>,
}

impl Prompter for ScriptedPrompter {
    fn read_password(&self, label: &str) -> Result<Option<String>, ReplicaError> {
        self.asked.borrow_mut().push(label.to_string());
        Ok(self.password.clone())
    }

    fn confirm(&self, question: &str, default: bool) -> Result<bool, ReplicaError> {
        self.asked.borrow_mut().push(question.to_string());
        Ok(self.answer.unwrap_or(default))
    }
}

// =============================================================================
// Installers
// =============================================================================

/// Records every call as "<name>.<action>"
pub struct RecordingInstaller {
    name: &'static str,
    component: Component,
    log: CallLog,
    faults: Faults,
}

/// Calls that fail, and calls that are interrupted
#[derive(Clone, Default)]
pub struct Faults {
    pub failures: Failures,
    pub interrupting: Failures,
    pub interrupt: InterruptFlag,
}

impl RecordingInstaller {
    fn new(name: &'static str, component: Component, log: &CallLog, faults: &Faults) -> Self {
        Self {
            name,
            component,
            log: log.clone(),
            faults: faults.clone(),
        }
    }

    fn call(&self, action: &str) -> InstallerResult<()> {
        let entry = format!("{}.{}", self.name, action);
        self.log.borrow_mut().push(entry.clone());
        if self.faults.interrupting.borrow().contains(&entry) {
            self.faults.interrupt.raise();
            return Err(InstallerError::new(
                self.component,
                format!("{} terminated by signal: 2 (SIGINT)", entry),
            ));
        }
        if self.faults.failures.borrow().contains(&entry) {
            return Err(InstallerError::new(self.component, format!("{} failed", entry)));
        }
        Ok(())
    }
}

impl ServiceInstaller for RecordingInstaller {
    fn component(&self) -> Component {
        self.component
    }

    fn check(&self, _config: &ReplicaConfiguration) -> ValidationOutcome {
        match self.call("check") {
            Ok(()) => ValidationOutcome::Pass,
            Err(e) => ValidationOutcome::Fatal(ReplicaError::configuration(e.to_string())),
        }
    }

    fn install(&self, _request: &InstallRequest<'_>) -> InstallerResult<ServiceHandle> {
        self.call("install")?;
        Ok(ServiceHandle::new(self.component, self.name))
    }

    fn restart(&self, _handle: &ServiceHandle) -> InstallerResult<()> {
        self.call("restart")
    }
}

impl DirectoryInstaller for RecordingInstaller {
    fn attach_service_certificate(&self, _handle: &ServiceHandle) -> InstallerResult<()> {
        self.call("attach_certificate")
    }

    fn apply_updates(&self, _handle: &ServiceHandle) -> InstallerResult<()> {
        self.call("apply_updates")
    }
}

impl DnsInstaller for RecordingInstaller {
    fn register_host_records(&self, _session: &ReplicaSession) -> InstallerResult<()> {
        self.call("register_records")
    }
}

impl KeyBroker for RecordingInstaller {
    fn fetch_keys(&self, kind: ServiceKind, provider: &str, dest_dir: &Path) -> InstallerResult<PathBuf> {
        self.call(&format!("fetch_keys:{}:{}", kind, provider))?;
        Ok(dest_dir.join(format!("{}.p12", kind.as_str().to_lowercase())))
    }
}

pub struct RecordingHost {
    inner: RecordingInstaller,
}

impl HostConfigurator for RecordingHost {
    fn update_hosts_file(&self, _host: &str, _addresses: &[IpAddr]) -> InstallerResult<()> {
        self.inner.call("update_hosts_file")
    }

    fn create_service_account(&self) -> InstallerResult<()> {
        self.inner.call("create_service_account")
    }

    fn import_ca_certificate(&self, _session: &ReplicaSession) -> InstallerResult<()> {
        self.inner.call("import_ca_certificate")
    }

    fn write_endpoint(&self, _session: &ReplicaSession) -> InstallerResult<()> {
        self.inner.call("write_endpoint")
    }

    fn enable_cluster_service(&self) -> InstallerResult<()> {
        self.inner.call("enable_cluster_service")
    }
}

pub fn recording_installers(log: &CallLog, faults: &Faults) -> InstallerSet {
    let rec = |name, component| Box::new(RecordingInstaller::new(name, component, log, faults));

    InstallerSet {
        host: Box::new(RecordingHost {
            inner: RecordingInstaller::new("host", Component::Host, log, faults),
        }),
        time_sync: rec("time_sync", Component::TimeSync),
        directory: rec("directory", Component::Directory),
        dns: rec("dns", Component::Dns),
        ca: rec("ca", Component::CertificateAuthority),
        kerberos: rec("kerberos", Component::Kerberos),
        session_cache: rec("session_cache", Component::SessionCache),
        http: rec("http", Component::Http),
        otp: rec("otp", Component::Otp),
        broker: rec("broker", Component::CredentialBroker),
        kra: rec("kra", Component::KeyRecoveryAuthority),
        client: rec("client", Component::DomainClient),
    }
}

// =============================================================================
// Environment
// =============================================================================

/// One throwaway host: paths under a temp dir plus every double
pub struct TestEnv {
    pub root: TempDir,
    pub paths: SystemPaths,
    pub log: CallLog,
    pub faults: Faults,
    pub interrupt: InterruptFlag,
    pub host: FakeHost,
    pub cluster: FakeCluster,
    pub resolver: FakeResolver,
    pub network: FakeNetwork,
    pub prompter: ScriptedPrompter,
    pub installers: InstallerSet,
    pub journal: MemoryStepJournal,
}

impl TestEnv {
    /// Bundle mode defaults: unjoined host, level 0 cluster
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let etc = root.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("ca.crt"), b"-----BEGIN CERTIFICATE-----\n").unwrap();

        let paths = SystemPaths {
            client_state_dir: root.path().join("sysrestore"),
            endpoint_file: etc.join("default.conf"),
            ca_cert: etc.join("ca.crt"),
            hosts_file: etc.join("hosts"),
            gateway_conf: etc.join("ipa.conf"),
            tmp_root: root.path().join("tmp"),
            install_log: root.path().join("install.log"),
            ..SystemPaths::default()
        };

        let log = CallLog::default();
        let interrupt = InterruptFlag::new();
        let faults = Faults {
            interrupt: interrupt.clone(),
            ..Faults::default()
        };
        let installers = recording_installers(&log, &faults);

        Self {
            root,
            paths,
            host: FakeHost {
                addresses: vec![HOST_ADDR.parse().unwrap()],
                ..FakeHost::default()
            },
            cluster: FakeCluster {
                interrupt: interrupt.clone(),
                ..FakeCluster::default()
            },
            resolver: FakeResolver::default(),
            network: FakeNetwork::default(),
            prompter: ScriptedPrompter::default(),
            installers,
            journal: MemoryStepJournal::new(),
            log,
            faults,
            interrupt,
        }
    }

    /// Promotion mode defaults: joined host, level 1 cluster
    pub fn promotion() -> Self {
        let mut env = Self::new();
        env.host.client_configured = true;
        env.cluster.set(|s| s.domain_level = Ok(DomainLevel(1)));
        env
    }

    pub fn fail(&self, call: &str) {
        self.faults.failures.borrow_mut().insert(call.to_string());
    }

    /// `call` raises the interrupt flag and fails, as on Ctrl-C.
    pub fn interrupt_during(&self, call: &str) {
        self.faults.interrupting.borrow_mut().insert(call.to_string());
    }

    pub fn validator(&self) -> PreflightValidator<'_> {
        PreflightValidator {
            paths: &self.paths,
            host: &self.host,
            cluster: &self.cluster,
            resolver: &self.resolver,
            network: &self.network,
            prompter: &self.prompter,
            installers: &self.installers,
            interrupt: &self.interrupt,
        }
    }

    pub fn recorder(&self) -> StepRecorder<'_> {
        StepRecorder::new(&self.journal)
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Calls that change the host
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.ends_with(".check"))
            .collect()
    }

    /// A configuration for `mode` using `work_dir`; bundle mode gets its CA cert.
    pub fn config(&self, mode: Mode, work_dir: &Path) -> ReplicaConfiguration {
        if mode == Mode::Bundle {
            fs::write(work_dir.join("ca.crt"), b"-----BEGIN CERTIFICATE-----\n").unwrap();
        }

        ReplicaConfiguration {
            mode,
            realm_name: "EXAMPLE.COM".to_string(),
            domain_name: "example.com".to_string(),
            host_name: HOST.to_string(),
            master_host_name: MASTER.to_string(),
            ca_host_name: None,
            ip_addresses: Vec::new(),
            credential: Some(Credential::new("Secret123")),
            principal: None,
            admin_password: None,
            subject_base: "O=EXAMPLE.COM".to_string(),
            ca_material: mode == Mode::Bundle,
            features: FeatureFlags::default(),
            client: ClientFlags::default(),
            checks: CheckFlags {
                interactive: false,
                ..CheckFlags::default()
            },
            dns: DnsOptions::default(),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

/// Every optional feature switched on
pub fn all_features() -> FeatureFlags {
    FeatureFlags {
        setup_ca: true,
        setup_kra: true,
        setup_dns: true,
        ..FeatureFlags::default()
    }
}
