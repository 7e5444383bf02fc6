//! Reconciliation journal.
//!
//! When a ledger write fails after the dispenser has already moved, the
//! resulting [`ReconciliationAlert`] must outlive the process so an operator
//! can correct the store by hand.  Alerts are appended to a JSON-lines file,
//! one alert per line, and never rewritten.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::error::JournalError;
use crate::model::ReconciliationAlert;

/// Append-only alert log.
#[derive(Debug, Clone)]
pub struct ReconciliationJournal {
    path: PathBuf,
}

impl ReconciliationJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `alert` as one line and flush it to disk.
    pub fn append(&self, alert: &ReconciliationAlert) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(alert).map_err(io::Error::from)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()?;
        error!(
            "journal: alert for {} written to {}",
            alert.patient,
            self.path.display()
        );
        Ok(())
    }

    /// Every alert recorded so far, oldest first.  A missing file is empty.
    pub fn read_all(&self) -> Result<Vec<ReconciliationAlert>, JournalError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let alerts = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                serde_json::from_str(l).map_err(|source| JournalError::Corrupted {
                    line: i + 1,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!("journal: {} alert(s) in {}", alerts.len(), self.path.display());
        Ok(alerts)
    }

    pub fn count(&self) -> Result<usize, JournalError> {
        self.read_all().map(|a| a.len())
    }
}
