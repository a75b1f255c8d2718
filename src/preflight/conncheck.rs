//! Connectivity rehearsal towards the master

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Mode;

/// Ports every replica must reach on its master
pub const MASTER_PORTS: &[u16] = &[389, 636, 88, 464, 80, 443];

/// Directory port of CA masters from the bundle-only era
pub const LEGACY_CA_PORT: u16 = 7389;

/// Ports to rehearse for this run
pub fn required_ports(mode: Mode, setup_ca: bool) -> Vec<u16> {
    let mut ports = MASTER_PORTS.to_vec();
    if mode == Mode::Bundle && setup_ca {
        ports.push(LEGACY_CA_PORT);
    }
    ports
}

/// Network reachability of a remote host
pub trait PortChecker {
    /// Ports from `ports` that did not accept a connection, in input order
    fn unreachable_ports(&self, host: &str, ports: &[u16]) -> Vec<u16>;
}

/// Checks ports with a plain TCP connect
pub struct TcpPortChecker {
    timeout: Duration,
}

impl TcpPortChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn reachable(&self, host: &str, port: u16) -> bool {
        match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs
                .into_iter()
                .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok()),
            Err(_) => false,
        }
    }
}

impl Default for TcpPortChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl PortChecker for TcpPortChecker {
    fn unreachable_ports(&self, host: &str, ports: &[u16]) -> Vec<u16> {
        ports
            .iter()
            .copied()
            .filter(|port| !self.reachable(host, *port))
            .collect()
    }
}
