//! Step journal
//!
//! Append-only record of every preflight check and commit step of a run,
//! one JSON object per line. Operators read it after a failed run to see
//! exactly which steps touched the host before running the uninstaller.
//!
//! A journal write failure never fails the installation; the caller logs
//! it and carries on.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::logger::Logger;

/// Phase a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preflight,
    Commit,
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepOutcome {
    Succeeded,
    /// Did not apply to this run (mode or feature flags)
    Skipped,
    Failed,
    /// Failed, but the step is allowed to fail
    Tolerated,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
            Self::Tolerated => "TOLERATED",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Identifies the installation run
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub step: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepRecord {
    pub fn new(run_id: Uuid, phase: Phase, step: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            phase,
            step: step.into(),
            outcome,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Append-only step journal
pub trait StepJournal {
    /// Append and flush one record.
    fn append(&self, record: &StepRecord) -> io::Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Journal appended to the install log file
pub struct FileStepJournal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileStepJournal {
    /// Open or create the journal, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StepJournal for FileStepJournal {
    fn append(&self, record: &StepRecord) -> io::Result<()> {
        let json = record.to_json()?;
        let mut writer = lock(&self.writer);
        writeln!(writer, "{}", json)?;
        writer.flush()
    }
}

/// In-memory journal
#[derive(Debug, Default, Clone)]
pub struct MemoryStepJournal {
    records: Arc<Mutex<Vec<StepRecord>>>,
}

impl MemoryStepJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StepRecord> {
        lock(&self.records).clone()
    }

    /// `(step, outcome)` pairs in append order
    pub fn outcomes(&self) -> Vec<(String, StepOutcome)> {
        lock(&self.records)
            .iter()
            .map(|r| (r.step.clone(), r.outcome))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

impl StepJournal for MemoryStepJournal {
    fn append(&self, record: &StepRecord) -> io::Result<()> {
        lock(&self.records).push(record.clone());
        Ok(())
    }
}

/// Journal that drops every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStepJournal;

impl StepJournal for NullStepJournal {
    fn append(&self, _record: &StepRecord) -> io::Result<()> {
        Ok(())
    }
}

/// Journal writer for one run
///
/// Stamps every record with the run id. Append failures are logged and
/// otherwise ignored.
pub struct StepRecorder<'a> {
    run_id: Uuid,
    journal: &'a dyn StepJournal,
}

impl<'a> StepRecorder<'a> {
    pub fn new(journal: &'a dyn StepJournal) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            journal,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&self, phase: Phase, step: &str, outcome: StepOutcome, message: Option<&str>) {
        let mut record = StepRecord::new(self.run_id, phase, step, outcome);
        if let Some(message) = message {
            record = record.with_message(message);
        }

        if let Err(e) = self.journal.append(&record) {
            Logger::warn(
                "JOURNAL_WRITE_FAILED",
                &[("error", &e.to_string()), ("step", step)],
            );
        }
    }
}
