//! Cleanup guard around the whole installation

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::SystemPaths;
use crate::errors::{ReplicaError, ReplicaResult};
use crate::observability::{log_event_with_fields, Event, Logger};

use super::interrupt::InterruptFlag;
use super::workdir::WorkDir;

/// Runs the check and commit phases inside one scoped working directory
///
/// On every exit the working directory is removed. A fault that may have
/// left the host partly configured gets the remediation message before
/// it is returned unchanged; interrupts and operator declines do not.
///
/// Any failure that happens once the interrupt flag is raised is reported
/// as `Interrupted`: a child program killed by the same SIGINT fails with
/// its own error first.
#[derive(Debug, Clone)]
pub struct CleanupGuard {
    tmp_root: PathBuf,
    uninstall_command: String,
    interrupt: InterruptFlag,
}

impl CleanupGuard {
    pub fn new(tmp_root: impl Into<PathBuf>, uninstall_command: impl Into<String>) -> Self {
        Self {
            tmp_root: tmp_root.into(),
            uninstall_command: uninstall_command.into(),
            interrupt: InterruptFlag::new(),
        }
    }

    /// Watch `interrupt` instead of a private flag.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn from_paths(paths: &SystemPaths) -> Self {
        Self::new(&paths.tmp_root, &paths.uninstall_command)
    }

    /// Text printed after a fault
    pub fn remediation_message(&self) -> String {
        format!(
            "Your system may be partly configured.\nRun {} --uninstall to clean up.",
            self.uninstall_command
        )
    }

    /// Run `body` with a fresh working directory, writing remediation
    /// text to `out` when the run fails.
    pub fn run<T, W, F>(&self, out: &mut W, body: F) -> ReplicaResult<T>
    where
        W: Write,
        F: FnOnce(&Path) -> ReplicaResult<T>,
    {
        let work_dir = WorkDir::create(&self.tmp_root)?;
        let result = body(work_dir.path()).map_err(|e| self.interrupted(e));
        work_dir.remove();

        match &result {
            Err(e) if e.needs_remediation() => {
                log_event_with_fields(Event::InstallFailed, &[("kind", e.kind()), ("reason", &e.to_string())]);
                // Nothing useful to do if the terminal is gone.
                let _ = writeln!(out, "{}", self.remediation_message());
            }
            Err(e) => {
                log_event_with_fields(Event::InstallCancelled, &[("reason", e.kind())]);
            }
            Ok(_) => {}
        }
        result
    }

    fn interrupted(&self, err: ReplicaError) -> ReplicaError {
        if !self.interrupt.is_raised() || err.is_clean_exit() {
            return err;
        }
        Logger::info(
            "FAILURE_AFTER_INTERRUPT",
            &[("kind", err.kind()), ("reason", &err.to_string())],
        );
        ReplicaError::Interrupted
    }
}
