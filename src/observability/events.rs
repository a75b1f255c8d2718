//! Lifecycle events of one installation run
//!
//! Per-step and per-check progress goes through `ObservationScope` and the
//! step journal; these are the fixed milestones around them.

use std::fmt;

/// Observable milestones of an installation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Options parsed, paths configuration loaded
    RunStart,
    /// Working directory created
    WorkDirCreated,
    /// Working directory removed
    WorkDirRemoved,
    /// Working directory could not be removed; ignored
    WorkDirRemoveFailed,
    /// Configuration resolved for either mode
    ConfigResolved,
    /// Provisional endpoint file written before contacting the master
    EndpointProvisional,
    /// Final endpoint file written
    EndpointFinal,
    /// Session to the master opened
    SessionOpened,
    /// Session to the master closed
    SessionClosed,
    /// A check reported a warning and preflight continued
    PreflightWarning,
    /// Interrupt received; the run stops before the next step
    InterruptReceived,
    /// Installation reached the terminal success state
    InstallComplete,
    /// Installation stopped in the failed state
    InstallFailed,
    /// Operator declined to continue
    InstallCancelled,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStart => "RUN_START",
            Self::WorkDirCreated => "WORKDIR_CREATED",
            Self::WorkDirRemoved => "WORKDIR_REMOVED",
            Self::WorkDirRemoveFailed => "WORKDIR_REMOVE_FAILED",
            Self::ConfigResolved => "CONFIG_RESOLVED",
            Self::EndpointProvisional => "ENDPOINT_PROVISIONAL",
            Self::EndpointFinal => "ENDPOINT_FINAL",
            Self::SessionOpened => "SESSION_OPENED",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::PreflightWarning => "PREFLIGHT_WARNING",
            Self::InterruptReceived => "INTERRUPT_RECEIVED",
            Self::InstallComplete => "INSTALL_COMPLETE",
            Self::InstallFailed => "INSTALL_FAILED",
            Self::InstallCancelled => "INSTALL_CANCELLED",
        }
    }

    /// Events logged at WARN rather than INFO
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::WorkDirRemoveFailed | Self::PreflightWarning | Self::InterruptReceived
        )
    }

    /// Events logged at ERROR
    pub fn is_error(&self) -> bool {
        matches!(self, Self::InstallFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
