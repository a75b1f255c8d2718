//! Replica installation error taxonomy
//!
//! Every fatal condition raised while checking or committing a replica
//! installation is one of these variants. Lower layers keep their own small
//! error types and convert at the component boundary; nothing below the
//! cleanup guard prints remediation text.

use std::fmt;

use thiserror::Error;

/// Result type for replica installation operations
pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Why a connection to the existing cluster could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityFailure {
    /// The supplied credential was refused by the directory server
    CredentialRejected,
    /// The credential was accepted but lacks the rights to add a member
    InsufficientPrivileges,
    /// The host could not be reached at all
    Unreachable,
    /// The host answered, but these required ports did not
    PortsBlocked(Vec<u16>),
}

impl fmt::Display for ConnectivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialRejected => {
                f.write_str("the password provided is incorrect for LDAP server")
            }
            Self::InsufficientPrivileges => {
                f.write_str("insufficient privileges to promote the server on")
            }
            Self::Unreachable => f.write_str("unable to connect to LDAP server"),
            Self::PortsBlocked(ports) => {
                let list: Vec<String> = ports.iter().map(u16::to_string).collect();
                write!(f, "required ports {} are not reachable on", list.join(", "))
            }
        }
    }
}

/// Replica installation errors
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Bad or missing local input, raised before any network activity
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The existing cluster could not be used
    #[error("{failure} {host}")]
    Connectivity {
        host: String,
        failure: ConnectivityFailure,
    },

    /// Local or cluster state conflicts with installing this host
    #[error("{message}\n{remediation}")]
    StateConflict { message: String, remediation: String },

    /// Cluster domain level is outside what this version accepts
    #[error("domain level {current} is not supported: {message}")]
    Compatibility { current: u32, message: String },

    /// A requested or mandatory optional service has no provider
    #[error("no {service} provider in the domain: {message}")]
    ProviderUnavailable { service: String, message: String },

    /// A commit-phase step failed
    #[error("{step} failed: {message}")]
    Provisioning { step: String, message: String },

    /// The operator declined to continue at an interactive prompt
    #[error("installation cancelled by the operator")]
    UserAbort,

    /// The process received an interrupt
    #[error("installation interrupted")]
    Interrupted,
}

impl ReplicaError {
    /// Configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Connectivity error against `host`
    pub fn connectivity(host: impl Into<String>, failure: ConnectivityFailure) -> Self {
        Self::Connectivity {
            host: host.into(),
            failure,
        }
    }

    /// State conflict with the exact command that resolves it
    pub fn state_conflict(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self::StateConflict {
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    /// Domain level incompatibility
    pub fn compatibility(current: u32, message: impl Into<String>) -> Self {
        Self::Compatibility {
            current,
            message: message.into(),
        }
    }

    /// Missing provider for an optional cluster service
    pub fn provider_unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Commit-phase step failure
    pub fn provisioning(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly kind name, used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::Connectivity { .. } => "CONNECTIVITY",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::Compatibility { .. } => "COMPATIBILITY",
            Self::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Self::Provisioning { .. } => "PROVISIONING",
            Self::UserAbort => "USER_ABORT",
            Self::Interrupted => "INTERRUPTED",
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UserAbort | Self::Interrupted => 0,
            Self::StateConflict { .. }
            | Self::Compatibility { .. }
            | Self::ProviderUnavailable { .. } => 3,
            Self::Configuration(_) | Self::Connectivity { .. } | Self::Provisioning { .. } => 1,
        }
    }

    /// Neutral exits: no error message, no remediation text
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, Self::UserAbort | Self::Interrupted)
    }

    /// Whether the cleanup guard must print the uninstall hint
    pub fn needs_remediation(&self) -> bool {
        !self.is_clean_exit()
    }
}

impl From<std::io::Error> for ReplicaError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::Interrupted {
            return Self::Interrupted;
        }
        Self::Configuration(format!("I/O error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ReplicaError::UserAbort.exit_code(), 0);
        assert_eq!(ReplicaError::Interrupted.exit_code(), 0);
        assert_eq!(ReplicaError::configuration("x").exit_code(), 1);
        assert_eq!(ReplicaError::state_conflict("x", "y").exit_code(), 3);
        assert_eq!(ReplicaError::compatibility(2, "x").exit_code(), 3);
        assert_eq!(ReplicaError::provider_unavailable("KRA", "x").exit_code(), 3);
        assert_eq!(ReplicaError::provisioning("step", "x").exit_code(), 1);
    }

    #[test]
    fn test_connectivity_messages_are_distinct() {
        let rejected =
            ReplicaError::connectivity("master.example.com", ConnectivityFailure::CredentialRejected)
                .to_string();
        let unreachable =
            ReplicaError::connectivity("master.example.com", ConnectivityFailure::Unreachable)
                .to_string();

        assert_ne!(rejected, unreachable);
        assert!(rejected.contains("master.example.com"));
        assert!(rejected.contains("incorrect"));
        assert!(unreachable.contains("unable to connect"));
    }

    #[test]
    fn test_blocked_ports_are_named() {
        let err = ReplicaError::connectivity(
            "master.example.com",
            ConnectivityFailure::PortsBlocked(vec![389, 7389]),
        );
        assert!(err.to_string().contains("389, 7389"));
    }

    #[test]
    fn test_state_conflict_carries_remediation() {
        let err = ReplicaError::state_conflict(
            "A replication agreement for this host already exists.",
            "ipa-replica-manage del replica.example.com --force",
        );
        assert!(err.to_string().contains("ipa-replica-manage del replica.example.com --force"));
    }

    #[test]
    fn test_clean_exits_skip_remediation() {
        assert!(!ReplicaError::Interrupted.needs_remediation());
        assert!(!ReplicaError::UserAbort.needs_remediation());
        assert!(ReplicaError::provisioning("x", "y").needs_remediation());
    }

    #[test]
    fn test_interrupted_io_maps_to_interrupt() {
        let io = std::io::Error::new(std::io::ErrorKind::Interrupted, "ctrl-c");
        assert!(matches!(ReplicaError::from(io), ReplicaError::Interrupted));
    }
}
