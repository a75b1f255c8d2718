//! Forward and reverse resolution against the cluster's name servers

use std::net::IpAddr;
use std::process::{Command, Stdio};

use crate::observability::Logger;

/// Lookups against a specific set of name servers
pub trait NameResolver {
    /// A and AAAA records of `host`
    fn lookup_addresses(&self, servers: &[String], host: &str) -> Vec<IpAddr>;

    /// PTR targets of `addr`; `Err` when the lookup itself failed
    fn lookup_ptr(&self, servers: &[String], addr: IpAddr) -> Result<Vec<String>, String>;
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// `host` resolves through `servers`, and every address maps back to it.
///
/// Mismatches are logged; the caller decides what they mean.
pub fn check_dns_resolution(resolver: &dyn NameResolver, host: &str, servers: &[String]) -> bool {
    let mut addresses = resolver.lookup_addresses(servers, host);
    addresses.sort();
    addresses.dedup();

    if addresses.is_empty() {
        Logger::error(
            "DNS_FORWARD_MISSING",
            &[
                ("host", host),
                ("hint", "this check queries the cluster DNS directly and ignores the hosts file"),
            ],
        );
        return false;
    }

    let mut ok = true;
    for addr in addresses {
        let addr_text = addr.to_string();
        match resolver.lookup_ptr(servers, addr) {
            Ok(names) if names.iter().any(|n| same_name(n, host)) => {
                Logger::trace("DNS_REVERSE_OK", &[("addr", &addr_text), ("host", host)]);
            }
            Ok(names) => {
                let joined = names.join(", ");
                Logger::error(
                    "DNS_REVERSE_MISMATCH",
                    &[("addr", &addr_text), ("host", host), ("resolves_to", &joined)],
                );
                ok = false;
            }
            Err(reason) => {
                Logger::error(
                    "DNS_REVERSE_FAILED",
                    &[("addr", &addr_text), ("host", host), ("reason", &reason)],
                );
                ok = false;
            }
        }
    }
    ok
}

/// `NameResolver` using `dig` against the first server that answers
pub struct DigResolver {
    program: String,
}

impl DigResolver {
    pub fn new() -> Self {
        Self {
            program: "dig".to_string(),
        }
    }

    fn query(&self, servers: &[String], args: &[&str]) -> Result<Vec<String>, String> {
        let mut last_error = "no name servers".to_string();
        for server in servers {
            let output = Command::new(&self.program)
                .arg(format!("@{}", server))
                .arg("+short")
                .args(args)
                .stdin(Stdio::null())
                .output();

            match output {
                Ok(out) if out.status.success() => {
                    return Ok(String::from_utf8_lossy(&out.stdout)
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with(';'))
                        .map(str::to_string)
                        .collect());
                }
                Ok(out) => {
                    last_error = format!("{} exited with {}", self.program, out.status);
                }
                Err(e) => {
                    last_error = format!("failed to run {}: {}", self.program, e);
                }
            }
        }
        Err(last_error)
    }
}

impl Default for DigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NameResolver for DigResolver {
    fn lookup_addresses(&self, servers: &[String], host: &str) -> Vec<IpAddr> {
        ["A", "AAAA"]
            .into_iter()
            .filter_map(|rtype| self.query(servers, &[host, rtype]).ok())
            .flatten()
            .filter_map(|line| line.parse::<IpAddr>().ok())
            .collect()
    }

    fn lookup_ptr(&self, servers: &[String], addr: IpAddr) -> Result<Vec<String>, String> {
        let addr = addr.to_string();
        self.query(servers, &["-x", &addr])
    }
}
