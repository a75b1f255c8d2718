//! Observability for installation runs
//!
//! - Structured JSON logging (`Logger`)
//! - Phase scopes with begin/complete/failed events (`ObservationScope`)
//! - Fixed lifecycle milestones (`Event`)
//! - The per-run step journal written to the install log
//!
//! Nothing here affects the outcome of a run.
//!
//! ```ignore
//! use replica_install::observability::{Logger, ObservationScope};
//!
//! Logger::info("CLUSTER_QUERY", &[("op", "domain-level")]);
//!
//! let scope = ObservationScope::new("PREFLIGHT");
//! // ... checks ...
//! scope.complete();
//! ```

mod events;
mod journal;
mod logger;
mod scope;

pub use events::Event;
pub use journal::{
    FileStepJournal, MemoryStepJournal, NullStepJournal, Phase, StepJournal, StepOutcome,
    StepRecord, StepRecorder,
};
pub use logger::{Logger, Severity};
pub use scope::{ObservationScope, Timer};

fn event_severity(event: Event) -> Severity {
    if event.is_error() {
        Severity::Error
    } else if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event_severity(event), event.as_str(), fields);
}
