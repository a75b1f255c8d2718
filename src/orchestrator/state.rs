//! Installation state machine
//!
//! - States are explicit and enumerable
//! - Transitions consume the current state and are never inferred
//! - `Failed` is reachable from every non-terminal state
//! - `Done` and `Failed` are terminal
//!
//! ```text
//! Init ──> Validated ──> Provisioning ──> Finalizing ──> Done
//!   │          │              │               │
//!   └──────────┴──────────────┴───────────────┴──> Failed
//! ```

use thiserror::Error;

use crate::errors::ReplicaError;

/// Attempted transition not allowed from the current state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("forbidden transition: {from} → {to}")]
pub struct StateError {
    pub from: &'static str,
    pub to: &'static str,
}

impl StateError {
    pub fn forbidden_transition(from: &'static str, to: &'static str) -> Self {
        Self { from, to }
    }
}

impl From<StateError> for ReplicaError {
    fn from(e: StateError) -> Self {
        ReplicaError::provisioning("orchestrator", e.to_string())
    }
}

pub type StateResult<T> = Result<T, StateError>;

/// Where one installation run stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallState {
    /// Nothing checked yet
    #[default]
    Init,

    /// Preflight passed; the resumable checkpoint between the two phases.
    /// Nothing on the host has been changed yet.
    Validated,

    /// Commit steps that create services are running
    Provisioning,

    /// Services exist; certificates, updates, restarts and registration
    Finalizing,

    /// Every commit step completed
    Done,

    /// A fatal error stopped the run. The host may be partly configured.
    Failed,
}

impl InstallState {
    pub fn new() -> Self {
        Self::Init
    }

    /// State name for observability
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Validated => "Validated",
            Self::Provisioning => "Provisioning",
            Self::Finalizing => "Finalizing",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Host state may have been changed in this state
    pub fn has_mutated(&self) -> bool {
        matches!(self, Self::Provisioning | Self::Finalizing | Self::Done)
    }

    /// Init → Validated
    pub fn validate(self) -> StateResult<Self> {
        match self {
            Self::Init => Ok(Self::Validated),
            _ => Err(StateError::forbidden_transition(self.state_name(), "Validated")),
        }
    }

    /// Validated → Provisioning
    ///
    /// The only way into the commit phase.
    pub fn begin_provisioning(self) -> StateResult<Self> {
        match self {
            Self::Validated => Ok(Self::Provisioning),
            _ => Err(StateError::forbidden_transition(self.state_name(), "Provisioning")),
        }
    }

    /// Provisioning → Finalizing
    pub fn begin_finalizing(self) -> StateResult<Self> {
        match self {
            Self::Provisioning => Ok(Self::Finalizing),
            _ => Err(StateError::forbidden_transition(self.state_name(), "Finalizing")),
        }
    }

    /// Finalizing → Done
    pub fn complete(self) -> StateResult<Self> {
        match self {
            Self::Finalizing => Ok(Self::Done),
            _ => Err(StateError::forbidden_transition(self.state_name(), "Done")),
        }
    }

    /// Any non-terminal state → Failed
    pub fn fail(self) -> StateResult<Self> {
        if self.is_terminal() {
            return Err(StateError::forbidden_transition(self.state_name(), "Failed"));
        }
        Ok(Self::Failed)
    }
}
