//! Append-only JSONL activity log.
//!
//! Every line is one complete JSON object, assembled in memory and handed to
//! `write_all` in a single call so a tailing reader never sees half a record.
//! When a file cannot be written the writer steps down:
//! primary path, then fallback path, then stderr (`[CLB-JSONL]` prefix), then
//! silent discard. A column never fails because its log did.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::config::LoggingConfig;
use crate::core::errors::{ClbError, Result};

const WRITE_BUFFER_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Kind of activity recorded on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FetchStarted,
    FetchCompleted,
    FetchFailed,
    SourceForbidden,
    PendingFlushed,
    TierAscended,
    Recalibrated,
    MeasurementMissing,
    StaleResponse,
    BufferSaved,
    BufferRestored,
    Error,
}

/// One JSONL record. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Column (source) identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Fetch status label after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Delay until the next poll, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_secs: Option<u64>,
    /// Item count touched by the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_amount: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_amount: Option<usize>,
    /// `CLB-xxxx` code when the event reports a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Empty entry stamped with the current time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            column: None,
            status: None,
            backoff_secs: None,
            items: None,
            tier: None,
            base_amount: None,
            tier_amount: None,
            error_code: None,
            details: None,
        }
    }

    #[must_use]
    pub fn column(mut self, id: impl Into<String>) -> Self {
        self.column = Some(id.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Where lines are currently going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl Sink {
    const fn label(self) -> &'static str {
        match self {
            Self::Primary => "normal",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

/// File and rotation settings for [`JsonlWriter`].
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1` .. `<path>.N`.
    pub max_rotated_files: u32,
    pub fsync_interval: Duration,
}

impl JsonlConfig {
    pub fn from_logging(config: &LoggingConfig) -> Self {
        Self {
            path: config.jsonl_path.clone(),
            fallback_path: config.fallback_path.clone(),
            max_size_bytes: config.max_size_bytes,
            max_rotated_files: config.max_rotated_files,
            fsync_interval: Duration::from_secs(config.fsync_interval_secs),
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self::from_logging(&LoggingConfig::default())
    }
}

/// Rotating JSONL writer with a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    /// Open the primary path, stepping down the chain if it is unusable.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        if !writer.attach(Sink::Primary) {
            writer.step_down_from(Sink::Primary);
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(err) => {
                let _ = writeln!(io::stderr(), "[CLB-JSONL] serialize error: {err}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// `normal`, `fallback`, `stderr` or `discard`.
    pub fn state(&self) -> &'static str {
        self.sink.label()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Return to the primary path if it has become writable again.
    pub fn try_recover(&mut self) {
        if self.sink != Sink::Primary {
            self.flush();
            if self.attach(Sink::Primary) {
                let _ = writeln!(
                    io::stderr(),
                    "[CLB-JSONL] recovered to primary path: {}",
                    self.config.path.display()
                );
            }
        }
    }

    // ──────────────────── internals ────────────────────

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.file.is_some() && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }

        loop {
            match self.sink {
                Sink::Primary | Sink::Fallback => {
                    let written = self
                        .file
                        .as_mut()
                        .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                    if written {
                        self.bytes_written += len;
                        if self.last_fsync.elapsed() >= self.config.fsync_interval {
                            self.fsync();
                        }
                        return;
                    }
                    self.step_down_from(self.sink);
                }
                Sink::Stderr => {
                    if write!(io::stderr(), "[CLB-JSONL] {line}").is_err() {
                        self.sink = Sink::Discard;
                    }
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    fn sink_path(&self, sink: Sink) -> Option<&Path> {
        match sink {
            Sink::Primary => Some(&self.config.path),
            Sink::Fallback => self.config.fallback_path.as_deref(),
            Sink::Stderr | Sink::Discard => None,
        }
    }

    /// Point the writer at a file sink. Returns false when it cannot be opened.
    fn attach(&mut self, sink: Sink) -> bool {
        let Some(path) = self.sink_path(sink) else {
            return false;
        };
        match open_append(path) {
            Ok((file, size)) => {
                self.file = Some(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file));
                self.sink = sink;
                self.bytes_written = size;
                true
            }
            Err(_) => false,
        }
    }

    fn step_down_from(&mut self, failed: Sink) {
        self.file = None;
        if failed == Sink::Primary && self.attach(Sink::Fallback) {
            let _ = writeln!(
                io::stderr(),
                "[CLB-JSONL] primary path failed, using fallback: {}",
                self.sink_path(Sink::Fallback)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
            return;
        }
        self.sink = match failed {
            Sink::Primary | Sink::Fallback => {
                let _ = writeln!(io::stderr(), "[CLB-JSONL] log files unwritable, using stderr");
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }

    fn rotate(&mut self) {
        let sink = self.sink;
        let Some(base) = self.sink_path(sink).map(Path::to_path_buf) else {
            return;
        };
        self.flush();
        self.file = None;

        let keep = self.config.max_rotated_files;
        if keep == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for generation in (1..keep).rev() {
                let _ = fs::rename(
                    rotated_name(&base, generation),
                    rotated_name(&base, generation + 1),
                );
            }
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }

        if !self.attach(sink) {
            self.step_down_from(sink);
        }
    }
}

// ──────────────────── helpers ────────────────────

/// Open `path` for appending, creating parent directories. Returns the file
/// and its current length.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ClbError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ClbError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `activity.jsonl` -> `activity.jsonl.2`
fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}
