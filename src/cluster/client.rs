//! Remote cluster client contract
//!
//! A narrow, read-mostly view of the existing cluster. The preflight
//! validator opens exactly one session and closes it before returning;
//! `SessionGuard` makes the close happen on every exit path.

use std::ops::Deref;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Credential;

use super::domain_level::DomainLevel;
use super::providers::ServiceKind;

/// Result type for cluster queries
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Cluster query errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// Bind refused: bad credential or missing rights
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The queried entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Identity used to bind to the master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterBind {
    /// Bind DN or principal
    pub identity: String,
    pub secret: Credential,
    /// CA certificate trusted for the TLS connection
    pub ca_file: PathBuf,
}

/// An authenticated session against one member of the cluster
pub trait ClusterSession {
    /// A replication agreement towards `host` already exists
    fn agreement_exists(&self, host: &str) -> ClusterResult<bool>;

    /// Current domain level; `NotFound` on clusters that predate it
    fn domain_level(&self) -> ClusterResult<DomainLevel>;

    /// A host entry named `host` already exists
    fn host_entry_exists(&self, host: &str) -> ClusterResult<bool>;

    /// The replication managers group exists
    fn replication_managers_exist(&self) -> ClusterResult<bool>;

    /// Certificate subject base from the cluster configuration
    fn subject_base(&self) -> ClusterResult<Option<String>>;

    /// Member currently providing `kind`, preferring `preferred` when it does
    fn find_provider(&self, kind: ServiceKind, preferred: &str) -> ClusterResult<Option<String>>;

    /// Members running the cluster's own name servers
    fn dns_masters(&self) -> ClusterResult<Vec<String>>;

    fn is_connected(&self) -> bool;

    /// Close the session. Idempotent.
    fn close(&mut self);
}

/// Opens sessions to the existing cluster
pub trait ClusterConnector {
    fn connect(&self, master: &str, bind: &ClusterBind) -> ClusterResult<Box<dyn ClusterSession>>;
}

/// Closes the wrapped session when dropped
pub struct SessionGuard {
    session: Box<dyn ClusterSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn ClusterSession>) -> Self {
        Self { session }
    }
}

impl Deref for SessionGuard {
    type Target = dyn ClusterSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.is_connected() {
            self.session.close();
        }
    }
}
