//! rollcall-ledger: Attendance log as a flat CSV file.
//!
//! Header `Name,Date,Time`, one row per person per day. Writes are a
//! read-check-append sequence with no file locking: callers that share a
//! ledger must funnel writes through a single writer.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const HEADER: [&str; 3] = ["Name", "Date", "Time"];

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One attendance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "Name")]
    pub name: String,
    /// `YYYY-MM-DD`
    #[serde(rename = "Date")]
    pub date: String,
    /// `HH:MM:SS`
    #[serde(rename = "Time")]
    pub time: String,
}

/// Handle to the attendance CSV.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Open the ledger, creating it (and its parent directory) with the
    /// header row if it is missing or empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let io_err = |source| LedgerError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let is_empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(io_err(e)),
        };

        if is_empty {
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(HEADER)?;
            writer.flush().map_err(io_err)?;
            tracing::info!(path = %path.display(), "created attendance ledger");
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All readable rows. Malformed rows (e.g. a torn last line) are skipped.
    pub fn entries(&self) -> Result<Vec<Entry>, LedgerError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let mut entries = Vec::new();
        for row in reader.deserialize::<Entry>() {
            match row {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "skipping malformed ledger row"),
            }
        }
        Ok(entries)
    }

    pub fn entries_on(&self, date: NaiveDate) -> Result<Vec<Entry>, LedgerError> {
        let date = date.format(DATE_FORMAT).to_string();
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| entry.date == date)
            .collect())
    }

    /// Append `name` at `at` unless it already has a row for that date.
    /// Returns `true` if a row was written.
    pub fn record(&self, name: &str, at: NaiveDateTime) -> Result<bool, LedgerError> {
        let date = at.format(DATE_FORMAT).to_string();

        let already = self
            .entries()?
            .iter()
            .any(|entry| entry.name == name && entry.date == date);
        if already {
            tracing::debug!(name, date = %date, "attendance already logged today");
            return Ok(false);
        }

        let io_err = |source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        terminate_last_line(&mut file).map_err(io_err)?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        let entry = Entry {
            name: name.to_string(),
            date,
            time: at.format(TIME_FORMAT).to_string(),
        };
        writer.serialize(&entry)?;
        writer.flush().map_err(io_err)?;

        tracing::info!(name, date = %entry.date, time = %entry.time, "attendance logged");
        Ok(true)
    }

    /// [`record`](Self::record) at the current local time.
    pub fn record_now(&self, name: &str) -> Result<bool, LedgerError> {
        self.record(name, Local::now().naive_local())
    }
}

/// A torn last row (or a header written without a newline) would otherwise
/// swallow the next appended row.
fn terminate_last_line(file: &mut File) -> std::io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        tracing::warn!("ledger did not end with a newline; terminating last row");
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Today's date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, time.2)
            .unwrap()
    }

    fn temp_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("attendance.csv")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_open_writes_header_once() {
        let (dir, ledger) = temp_ledger();
        ledger.record("KATRINA", at((2024, 3, 1), (9, 0, 0))).unwrap();
        Ledger::open(dir.path().join("attendance.csv")).unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "Name,Date,Time\nKATRINA,2024-03-01,09:00:00\n");
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path().join("logs/attendance.csv")).unwrap();
        assert!(ledger.path().exists());
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn test_same_name_same_day_logged_once() {
        let (_dir, ledger) = temp_ledger();
        assert!(ledger.record("KATRINA", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(!ledger.record("KATRINA", at((2024, 3, 1), (17, 30, 0))).unwrap());

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time, "09:00:00");
    }

    #[test]
    fn test_other_day_and_other_name_are_logged() {
        let (_dir, ledger) = temp_ledger();
        assert!(ledger.record("KATRINA", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(ledger.record("KATRINA", at((2024, 3, 2), (9, 5, 0))).unwrap());
        assert!(ledger.record("AMIR", at((2024, 3, 2), (9, 6, 0))).unwrap());

        assert_eq!(ledger.entries().unwrap().len(), 3);
        let day2 = ledger.entries_on(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()).unwrap();
        let names: Vec<&str> = day2.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["KATRINA", "AMIR"]);
    }

    #[test]
    fn test_existing_ledger_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Name,Date,Time\nAMIR,2024-03-01,08:15:00\n").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(!ledger.record("AMIR", at((2024, 3, 1), (10, 0, 0))).unwrap());
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_torn_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Name,Date,Time\nAMIR,2024-03-01,08:15:00\nKATR\n").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "AMIR");
    }

    #[test]
    fn test_unterminated_torn_row_does_not_swallow_next_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Name,Date,Time\nAMIR,2024-03-01,08:15:00\nKATR").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.record("LI", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(!ledger.record("LI", at((2024, 3, 1), (9, 5, 0))).unwrap());

        let names: Vec<String> = ledger.entries().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["AMIR", "LI"]);
    }

    #[test]
    fn test_header_without_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, "Name,Date,Time").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.record("LI", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(!ledger.record("LI", at((2024, 3, 1), (10, 0, 0))).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Name,Date,Time\nLI,2024-03-01,09:00:00\n");
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }
}
