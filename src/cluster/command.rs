//! Cluster client backed by an external query helper
//!
//! Each query runs the helper once:
//!
//! ```text
//! <helper> --server <master> --identity <bind> --ca-file <path> <op> [arg]
//! ```
//!
//! with the bind secret on stdin. The helper prints one JSON object, either
//! `{"result": ...}` or `{"error": {"kind": "...", "message": "..."}}`.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::Value;

use crate::errors::{ReplicaError, ReplicaResult};
use crate::observability::Logger;

use super::client::{ClusterBind, ClusterConnector, ClusterError, ClusterResult, ClusterSession};
use super::domain_level::DomainLevel;
use super::providers::ServiceKind;

#[derive(Debug, Deserialize)]
struct QueryReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<QueryFailure>,
}

#[derive(Debug, Deserialize)]
struct QueryFailure {
    kind: String,
    #[serde(default)]
    message: String,
}

/// Decode one helper reply.
fn parse_reply(stdout: &str) -> ClusterResult<Value> {
    let reply: QueryReply = serde_json::from_str(stdout.trim())
        .map_err(|e| ClusterError::Query(format!("malformed helper reply: {}", e)))?;

    if let Some(failure) = reply.error {
        return Err(match failure.kind.as_str() {
            "access_denied" => ClusterError::AccessDenied(failure.message),
            "unreachable" => ClusterError::Unreachable(failure.message),
            "not_found" => ClusterError::NotFound(failure.message),
            _ => ClusterError::Query(failure.message),
        });
    }

    Ok(reply.result.unwrap_or(Value::Null))
}

fn expect_bool(value: Value) -> ClusterResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ClusterError::Query(format!("expected boolean, got {}", value)))
}

fn expect_opt_string(value: Value) -> ClusterResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(ClusterError::Query(format!("expected string, got {}", other))),
    }
}

/// Connector that spawns the query helper
#[derive(Debug, Clone)]
pub struct CommandClusterConnector {
    program: PathBuf,
}

impl CommandClusterConnector {
    /// Locate `name` on `PATH` (or take it as a path).
    pub fn locate(name: &str) -> ReplicaResult<Self> {
        let program = which::which(name).map_err(|e| {
            ReplicaError::configuration(format!("cluster query helper '{}' not found: {}", name, e))
        })?;
        Ok(Self { program })
    }
}

impl ClusterConnector for CommandClusterConnector {
    fn connect(&self, master: &str, bind: &ClusterBind) -> ClusterResult<Box<dyn ClusterSession>> {
        let session = CommandSession {
            program: self.program.clone(),
            master: master.to_string(),
            bind: bind.clone(),
            connected: false,
        };
        // Bind once up front so credential problems surface here.
        session.run("ping", None)?;

        Ok(Box::new(CommandSession {
            connected: true,
            ..session
        }))
    }
}

struct CommandSession {
    program: PathBuf,
    master: String,
    bind: ClusterBind,
    connected: bool,
}

impl CommandSession {
    fn run(&self, op: &str, arg: Option<&str>) -> ClusterResult<Value> {
        let mut command = Command::new(&self.program);
        command
            .arg("--server")
            .arg(&self.master)
            .arg("--identity")
            .arg(&self.bind.identity)
            .arg("--ca-file")
            .arg(&self.bind.ca_file)
            .arg(op)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(arg) = arg {
            command.arg(arg);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ClusterError::Unreachable(format!("failed to run query helper: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.bind.secret.expose().as_bytes())
                .map_err(|e| ClusterError::Query(format!("failed to pass credential: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ClusterError::Query(format!("query helper failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::Query(format!(
                "{} {} exited with {}: {}",
                self.program.display(),
                op,
                output.status,
                stderr.trim()
            )));
        }

        Logger::trace("CLUSTER_QUERY", &[("master", &self.master), ("op", op)]);
        parse_reply(&stdout)
    }
}

impl ClusterSession for CommandSession {
    fn agreement_exists(&self, host: &str) -> ClusterResult<bool> {
        expect_bool(self.run("agreement-exists", Some(host))?)
    }

    fn domain_level(&self) -> ClusterResult<DomainLevel> {
        let value = self.run("domain-level", None)?;
        let level = value
            .as_u64()
            .ok_or_else(|| ClusterError::Query(format!("expected integer, got {}", value)))?;
        u32::try_from(level)
            .map(DomainLevel)
            .map_err(|_| ClusterError::Query(format!("domain level {} out of range", level)))
    }

    fn host_entry_exists(&self, host: &str) -> ClusterResult<bool> {
        expect_bool(self.run("host-exists", Some(host))?)
    }

    fn replication_managers_exist(&self) -> ClusterResult<bool> {
        expect_bool(self.run("replication-managers", None)?)
    }

    fn subject_base(&self) -> ClusterResult<Option<String>> {
        expect_opt_string(self.run("subject-base", None)?)
    }

    fn find_provider(&self, kind: ServiceKind, preferred: &str) -> ClusterResult<Option<String>> {
        let arg = format!("{}:{}", kind.as_str(), preferred);
        expect_opt_string(self.run("find-provider", Some(&arg))?)
    }

    fn dns_masters(&self) -> ClusterResult<Vec<String>> {
        match self.run("dns-masters", None)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ClusterError::Query(format!("expected host name, got {}", v)))
                })
                .collect(),
            other => Err(ClusterError::Query(format!("expected list, got {}", other))),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result() {
        assert_eq!(parse_reply(r#"{"result": true}"#).unwrap(), Value::Bool(true));
        assert_eq!(parse_reply(r#"{}"#).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_error_kinds() {
        assert_eq!(
            parse_reply(r#"{"error": {"kind": "access_denied", "message": "bad bind"}}"#),
            Err(ClusterError::AccessDenied("bad bind".to_string()))
        );
        assert_eq!(
            parse_reply(r#"{"error": {"kind": "not_found"}}"#),
            Err(ClusterError::NotFound(String::new()))
        );
        assert!(matches!(
            parse_reply(r#"{"error": {"kind": "weird", "message": "x"}}"#),
            Err(ClusterError::Query(_))
        ));
    }

    #[test]
    fn test_malformed_reply() {
        assert!(matches!(parse_reply("not json"), Err(ClusterError::Query(_))));
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(expect_bool(Value::Bool(false)), Ok(false));
        assert!(expect_bool(Value::Null).is_err());
        assert_eq!(expect_opt_string(Value::Null), Ok(None));
        assert_eq!(
            expect_opt_string(Value::String("ca.example.com".into())),
            Ok(Some("ca.example.com".to_string()))
        );
    }

    #[test]
    fn test_locate_missing_helper() {
        let err = CommandClusterConnector::locate("definitely-not-a-real-helper-xyz").unwrap_err();
        assert!(matches!(err, ReplicaError::Configuration(_)));
    }
}
