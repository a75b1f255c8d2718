//! Local domain-join client state
//!
//! A host joined as a client keeps backups of the files it changed in a
//! state directory and records its realm, domain and server in the endpoint
//! file. Bundle mode refuses such a host; promotion mode requires one.

use std::fs;
use std::path::Path;

use crate::errors::{ReplicaError, ReplicaResult};

use super::endpoint::parse_global;

/// Whether the join client has stored any state on this host.
pub fn client_configured(state_dir: &Path) -> bool {
    match fs::read_dir(state_dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// Values recorded by the join client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinState {
    pub host: String,
    pub realm: String,
    pub domain: String,
    /// Member the client was joined against
    pub server: String,
    pub ca_host: Option<String>,
}

impl JoinState {
    /// Read the client's endpoint file.
    pub fn load(state_dir: &Path, endpoint_file: &Path) -> ReplicaResult<Self> {
        if !client_configured(state_dir) {
            return Err(ReplicaError::configuration(
                "IPA client is not configured on this system.\n\
                 You must use a replica file or join the system using 'ipa-client-install'.",
            ));
        }

        let text = fs::read_to_string(endpoint_file).map_err(|e| {
            ReplicaError::configuration(format!(
                "Failed to read client configuration {}: {}",
                endpoint_file.display(),
                e
            ))
        })?;

        Self::parse(&text)
    }

    pub fn parse(text: &str) -> ReplicaResult<Self> {
        let values = parse_global(text);
        let required = |key: &str| {
            values.get(key).cloned().ok_or_else(|| {
                ReplicaError::configuration(format!(
                    "client configuration is missing '{}'",
                    key
                ))
            })
        };

        Ok(Self {
            host: required("host")?,
            realm: required("realm")?,
            domain: required("domain")?,
            server: required("server")?,
            ca_host: values.get("ca_host").cloned(),
        })
    }
}
