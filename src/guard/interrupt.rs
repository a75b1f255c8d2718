//! Process interrupt flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{ReplicaError, ReplicaResult};
use crate::observability::{log_event, Event};

/// Set once when the process is interrupted; checked between commit steps
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            log_event(Event::InterruptReceived);
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once the flag is raised
    pub fn check(&self) -> ReplicaResult<()> {
        if self.is_raised() {
            return Err(ReplicaError::Interrupted);
        }
        Ok(())
    }

    /// Raise this flag on SIGINT. Only one handler may be installed per process.
    pub fn install_handler(&self) -> ReplicaResult<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.raise()).map_err(|e| {
            ReplicaError::configuration(format!("failed to install interrupt handler: {}", e))
        })
    }
}
