//! Facts about the local host
//!
//! Read-only questions preflight asks about the machine it runs on.

use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, TcpListener, ToSocketAddrs};
use std::process::{Command, Stdio};

use regex::Regex;

use crate::config::{client_configured, SystemPaths};

/// Daemons that fight the cluster time service for the clock
pub const CONFLICTING_TIME_SERVICES: &[&str] = &["chronyd", "systemd-timesyncd"];

/// Directory service ports that must be free locally
pub const DIRECTORY_PORTS: &[u16] = &[389, 636];

const GATEWAY_LISTEN_PATTERN: &str = r"(?m)^\s*Listen\s+(\S+:)?443(\s|$)";

/// Questions about the local machine
pub trait HostInfo {
    /// The domain-join client left backed-up files behind
    fn client_configured(&self) -> bool;

    /// The web gateway is already set up to listen on 443
    fn gateway_configured(&self) -> bool;

    fn port_in_use(&self, port: u16) -> bool;

    /// First running daemon from `CONFLICTING_TIME_SERVICES`
    fn conflicting_time_service(&self) -> Option<String>;

    /// Non-loopback addresses `host` resolves to locally
    fn resolve_host(&self, host: &str) -> Vec<IpAddr>;
}

/// `HostInfo` for the machine the installer runs on
pub struct LocalHostInfo<'a> {
    paths: &'a SystemPaths,
}

impl<'a> LocalHostInfo<'a> {
    pub fn new(paths: &'a SystemPaths) -> Self {
        Self { paths }
    }
}

/// `text` configures a listener on port 443
pub fn listens_on_443(text: &str) -> bool {
    Regex::new(GATEWAY_LISTEN_PATTERN)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

fn bind_fails_in_use(addr: SocketAddr) -> bool {
    match TcpListener::bind(addr) {
        Ok(_) => false,
        Err(e) => e.kind() == ErrorKind::AddrInUse,
    }
}

fn service_active(name: &str) -> bool {
    Command::new("systemctl")
        .args(["is-active", "--quiet", name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

impl HostInfo for LocalHostInfo<'_> {
    fn client_configured(&self) -> bool {
        client_configured(&self.paths.client_state_dir)
    }

    fn gateway_configured(&self) -> bool {
        fs::read_to_string(&self.paths.gateway_conf)
            .map(|text| listens_on_443(&text))
            .unwrap_or(false)
    }

    fn port_in_use(&self, port: u16) -> bool {
        // Permission errors (unprivileged test runs) do not count as in use.
        bind_fails_in_use(SocketAddr::from(([0, 0, 0, 0], port)))
            || bind_fails_in_use(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))
    }

    fn conflicting_time_service(&self) -> Option<String> {
        CONFLICTING_TIME_SERVICES
            .iter()
            .find(|name| service_active(name))
            .map(|name| name.to_string())
    }

    fn resolve_host(&self, host: &str) -> Vec<IpAddr> {
        let mut addresses: Vec<IpAddr> = match (host, 0).to_socket_addrs() {
            Ok(iter) => iter.map(|a| a.ip()).filter(|ip| !ip.is_loopback()).collect(),
            Err(_) => Vec::new(),
        };
        addresses.sort();
        addresses.dedup();
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_listens_on_443() {
        assert!(listens_on_443("Listen 443\n"));
        assert!(listens_on_443("# ssl\n  Listen 0.0.0.0:443 https\n"));
        assert!(!listens_on_443("#Listen 443\n"));
        assert!(!listens_on_443("Listen 4433\n"));
        assert!(!listens_on_443("Listen 80\n"));
    }

    #[test]
    fn test_gateway_configured_reads_conf() {
        let dir = TempDir::new().unwrap();
        let paths = SystemPaths {
            gateway_conf: dir.path().join("ssl.conf"),
            ..SystemPaths::default()
        };
        let host = LocalHostInfo::new(&paths);
        assert!(!host.gateway_configured());

        fs::write(dir.path().join("ssl.conf"), "Listen 443 https\n").unwrap();
        assert!(host.gateway_configured());
    }

    #[test]
    fn test_port_in_use_detects_listener() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let paths = SystemPaths::default();
        let host = LocalHostInfo::new(&paths);
        assert!(host.port_in_use(port));
    }

    #[test]
    fn test_resolve_host_drops_loopback() {
        let paths = SystemPaths::default();
        let host = LocalHostInfo::new(&paths);
        assert!(host.resolve_host("localhost").iter().all(|ip| !ip.is_loopback()));
    }
}
