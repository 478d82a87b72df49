//! Event logger for the append-only run history
//!
//! Writes one JSON line per completed operation to the event log at the
//! destination root and flushes immediately. A failing event write never
//! fails the operation it describes; callers treat it as best-effort.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use crate::error::BackupResult;

use super::entry::EventRecord;

/// Appends event records to the run history file
///
/// The log file uses a line-delimited JSON format (JSONL) where each line
/// is a complete JSON object representing one event.
pub struct EventLog {
    log_path: PathBuf,
}

impl EventLog {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Append one event record as a JSON line and flush
    pub fn record(&self, entry: &EventRecord) -> BackupResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        file.flush()?;

        Ok(())
    }

    /// Read all events, oldest first
    ///
    /// Blank lines are skipped so a partially written trailing line from
    /// a crashed run does not poison the history.
    pub fn read_all(&self) -> BackupResult<Vec<EventRecord>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.log_path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}
