//! Scoped working directory
//!
//! Holds the extracted transfer bundle (bundle mode) or fetched key
//! material (promotion mode). Removed when the run ends, whatever the
//! outcome; removal errors are logged and ignored.

use std::fs;
use std::path::Path;

use tempfile::{Builder, TempDir};

use crate::errors::{ReplicaError, ReplicaResult};
use crate::observability::{log_event_with_fields, Event};

const WORK_DIR_PREFIX: &str = "ipa";

/// Working directory of one run
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Create a fresh directory under `tmp_root`, creating `tmp_root` if needed.
    pub fn create(tmp_root: &Path) -> ReplicaResult<Self> {
        fs::create_dir_all(tmp_root).map_err(|e| {
            ReplicaError::configuration(format!(
                "Failed to create temporary directory root {}: {}",
                tmp_root.display(),
                e
            ))
        })?;

        let dir = Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(tmp_root)
            .map_err(|e| {
                ReplicaError::configuration(format!(
                    "Failed to create working directory in {}: {}",
                    tmp_root.display(),
                    e
                ))
            })?;

        let path_text = dir.path().display().to_string();
        log_event_with_fields(Event::WorkDirCreated, &[("path", &path_text)]);
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now. Failure is logged, never returned.
    pub fn remove(self) {
        let path_text = self.dir.path().display().to_string();
        match self.dir.close() {
            Ok(()) => log_event_with_fields(Event::WorkDirRemoved, &[("path", &path_text)]),
            Err(e) => log_event_with_fields(
                Event::WorkDirRemoveFailed,
                &[("error", &e.to_string()), ("path", &path_text)],
            ),
        }
    }
}
