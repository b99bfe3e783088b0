//! Append-only attendance table.
//!
//! The backing file is a flat `Name,Date,Time` table with no quoting. It is
//! opened per operation rather than held across the recognition loop, and
//! [`AttendanceLog::mark`] does its check-then-append on a single handle.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const HEADER: &str = "Name,Date,Time";
const DATE_FORMAT: &str = "%d/%m/%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("cannot open attendance file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("name {0:?} contains a comma or line break and cannot be stored in the table")]
    InvalidName(String),
}

/// What counts as "already logged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// A name is recorded once for the lifetime of the file.
    #[default]
    Once,
    /// A name is recorded once per calendar day.
    Daily,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(Self::Once),
            "daily" => Ok(Self::Daily),
            other => Err(format!("unknown dedup policy {other:?} (expected \"once\" or \"daily\")")),
        }
    }
}

/// One row of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    /// `DD/MM/YYYY`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
}

impl AttendanceRecord {
    pub fn new(name: &str, now: NaiveDateTime) -> Self {
        Self {
            name: name.to_string(),
            date: now.format(DATE_FORMAT).to_string(),
            time: now.format(TIME_FORMAT).to_string(),
        }
    }

    fn to_line(&self) -> String {
        format!("{},{},{}", self.name, self.date, self.time)
    }

    /// Parse a data row. The header and malformed lines yield `None`.
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\r');
        let mut fields = line.splitn(3, ',');
        let name = fields.next()?;
        let date = fields.next()?;
        let time = fields.next()?;
        if line == HEADER || name.is_empty() {
            return None;
        }
        Some(Self { name: name.to_string(), date: date.to_string(), time: time.to_string() })
    }
}

/// Handle to the attendance file.
#[derive(Debug, Clone)]
pub struct AttendanceLog {
    path: PathBuf,
    policy: DedupPolicy,
}

impl AttendanceLog {
    /// Open the log, creating it with the header row if it is absent or
    /// empty. Failure here means no attendance can be recorded.
    pub fn open(path: impl Into<PathBuf>, policy: DedupPolicy) -> Result<Self, AttendanceError> {
        let log = Self { path: path.into(), policy };
        let (_, contents) = log.open_handle()?;
        tracing::info!(
            path = %log.path.display(),
            rows = contents.lines().filter_map(AttendanceRecord::parse).count(),
            ?policy,
            "attendance log ready"
        );
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Whether `name` already appears in the table.
    ///
    /// Under [`DedupPolicy::Once`] this compares against the first field of
    /// every line, header included. Under [`DedupPolicy::Daily`] only rows
    /// dated today count.
    pub fn has_logged(&self, name: &str) -> Result<bool, AttendanceError> {
        let (_, contents) = self.open_handle()?;
        let today = chrono::Local::now().naive_local();
        Ok(self.contains(&contents, name, today))
    }

    /// Unconditionally append a row for `name` stamped with `now`.
    pub fn append(&self, name: &str, now: NaiveDateTime) -> Result<AttendanceRecord, AttendanceError> {
        validate_name(name)?;
        let (mut file, contents) = self.open_handle()?;
        self.write_record(&mut file, &contents, name, now)
    }

    /// Check-then-append on one file handle. Returns the new row, or `None`
    /// if `name` was already logged.
    pub fn mark(&self, name: &str, now: NaiveDateTime) -> Result<Option<AttendanceRecord>, AttendanceError> {
        validate_name(name)?;
        let (mut file, contents) = self.open_handle()?;
        if self.contains(&contents, name, now) {
            return Ok(None);
        }
        let record = self.write_record(&mut file, &contents, name, now)?;
        tracing::info!(name = %record.name, date = %record.date, time = %record.time, "attendance recorded");
        Ok(Some(record))
    }

    /// All data rows in file order.
    pub fn records(&self) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        read_records(&self.path)
    }

    fn contains(&self, contents: &str, name: &str, now: NaiveDateTime) -> bool {
        match self.policy {
            DedupPolicy::Once => contents.lines().any(|line| first_field(line) == name),
            DedupPolicy::Daily => {
                let today = now.format(DATE_FORMAT).to_string();
                contents
                    .lines()
                    .filter_map(AttendanceRecord::parse)
                    .any(|r| r.name == name && r.date == today)
            }
        }
    }

    /// Open for read + append, writing the header into a new or empty file.
    /// Returns the handle and the full contents (header included).
    fn open_handle(&self) -> Result<(std::fs::File, String), AttendanceError> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| AttendanceError::Open { path: self.path.clone(), source })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| self.io_err(e))?;

        if contents.is_empty() {
            writeln!(file, "{HEADER}").map_err(|e| self.io_err(e))?;
            contents = format!("{HEADER}\n");
        }
        Ok((file, contents))
    }

    fn write_record(
        &self,
        file: &mut std::fs::File,
        contents: &str,
        name: &str,
        now: NaiveDateTime,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let record = AttendanceRecord::new(name, now);
        let mut line = String::new();
        if !contents.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&record.to_line());
        line.push('\n');
        file.write_all(line.as_bytes()).map_err(|e| self.io_err(e))?;
        file.flush().map_err(|e| self.io_err(e))?;
        Ok(record)
    }

    fn io_err(&self, source: std::io::Error) -> AttendanceError {
        AttendanceError::Io { path: self.path.clone(), source }
    }
}

/// Read every data row of a table without creating it; a missing file has
/// no rows.
pub fn read_records(path: &Path) -> Result<Vec<AttendanceRecord>, AttendanceError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(AttendanceError::Io { path: path.to_path_buf(), source }),
    };
    Ok(contents.lines().filter_map(AttendanceRecord::parse).collect())
}

fn first_field(line: &str) -> &str {
    line.split(',').next().unwrap_or("").trim_end_matches('\r')
}

fn validate_name(name: &str) -> Result<(), AttendanceError> {
    if name.is_empty() || name.contains([',', '\n', '\r']) {
        return Err(AttendanceError::InvalidName(name.to_string()));
    }
    Ok(())
}
