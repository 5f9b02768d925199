//! Append-only JSONL event log: the durable record of emitted events.
//!
//! Records are written one-per-line. The log is an audit trail and is never
//! modified in place; write failures are logged and swallowed so they cannot
//! stall the tracker.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::sink::{EventRecord, EventSink};

pub const DEFAULT_EVENT_LOG: &str = ".gazeguard/events.jsonl";

/// Append-only JSONL writer for event records.
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    file: File,
    lines_written: u64,
}

impl JsonlEventLog {
    /// Open or create the log file, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        // Count existing lines for bookkeeping.
        let lines_written = count_lines(path);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            lines_written,
        })
    }

    /// Append one record to the log.
    pub fn append(&mut self, record: &EventRecord) -> io::Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.file, "{json}")?;
        self.file.flush()?;
        self.lines_written += 1;
        Ok(())
    }

    /// Number of records written (including pre-existing lines).
    #[must_use = "line count is only useful for assertions and logs"]
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Underlying file path.
    #[must_use = "path accessor has no side effects"]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventLog {
    fn handle(&mut self, record: &EventRecord) {
        if let Err(err) = self.append(record) {
            tracing::warn!(path = %self.path.display(), %err, "event log append failed");
        }
    }
}

/// Read all records from a JSONL file, skipping malformed lines for forward
/// compatibility.
pub fn read_all_records(path: &Path) -> io::Result<Vec<EventRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(_) => continue,
        }
    }
    Ok(records)
}

fn count_lines(path: &Path) -> u64 {
    let Ok(file) = File::open(path) else {
        return 0;
    };
    let reader = BufReader::new(file);
    reader.lines().count() as u64
}
