//! Result of a single preflight check

use crate::errors::{ReplicaError, ReplicaResult};

/// What one check concluded
#[derive(Debug)]
pub enum ValidationOutcome {
    Pass,
    /// Logged, then preflight continues
    Warn(String),
    /// Preflight stops with this error
    Fatal(ReplicaError),
}

impl ValidationOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// `Err` for fatal outcomes, the warning text otherwise.
    pub fn into_result(self) -> ReplicaResult<Option<String>> {
        match self {
            Self::Pass => Ok(None),
            Self::Warn(message) => Ok(Some(message)),
            Self::Fatal(err) => Err(err),
        }
    }
}

impl From<ReplicaResult<()>> for ValidationOutcome {
    fn from(result: ReplicaResult<()>) -> Self {
        match result {
            Ok(()) => Self::Pass,
            Err(err) => Self::Fatal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        assert!(matches!(ValidationOutcome::Pass.into_result(), Ok(None)));
        assert_eq!(
            ValidationOutcome::Warn("chronyd is active".into()).into_result().unwrap(),
            Some("chronyd is active".to_string())
        );

        let fatal = ValidationOutcome::Fatal(ReplicaError::configuration("no CA"));
        assert!(fatal.is_fatal());
        assert!(matches!(fatal.into_result(), Err(ReplicaError::Configuration(_))));
    }

    #[test]
    fn test_from_result() {
        assert!(matches!(ValidationOutcome::from(Ok(())), ValidationOutcome::Pass));
        assert!(ValidationOutcome::from(Err(ReplicaError::UserAbort)).is_fatal());
    }
}
