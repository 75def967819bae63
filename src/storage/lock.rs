//! Exclusive lock on the state file.
//!
//! A run creates `<state_file>.lock` with create-new semantics before it
//! reads the state and removes it when the guard drops. A second run that
//! overlaps the first finds the file and aborts instead of interleaving its
//! read-modify-write. A lock left behind by a killed process has to be
//! removed by hand; its contents name the owning pid and start time.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::types::ChronologError;

/// Held for the duration of a run; releases the lock on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// Lock path guarding `state_file`.
    pub fn path_for(state_file: &str) -> PathBuf {
        PathBuf::from(format!("{state_file}.lock"))
    }

    /// Take the lock, or fail with `ChronologError::StateLocked`.
    pub fn acquire(state_file: &str) -> Result<Self> {
        let path = Self::path_for(state_file);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ChronologError::StateLocked(path.display().to_string()).into());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create lock file {}", path.display()));
            }
        };

        writeln!(file, "pid {} since {}", std::process::id(), Local::now().to_rfc3339())
            .with_context(|| format!("Failed to write lock file {}", path.display()))?;

        debug!(path = %path.display(), "State lock acquired");
        Ok(Self { path })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release state lock");
        } else {
            debug!(path = %self.path.display(), "State lock released");
        }
    }
}
