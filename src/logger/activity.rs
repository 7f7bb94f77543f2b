//! Activity logger: columns send [`ActivityEvent`]s through a bounded
//! crossbeam channel to a dedicated thread that owns the [`JsonlWriter`].
//!
//! `send()` uses `try_send()`; a full channel drops the event and bumps a
//! counter that the logger thread reports as a warning line. Column handlers
//! never wait on the log.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{ClbError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// How often a degraded writer retries its primary path.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(60);

// ──────────────────── events ────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    FetchStarted {
        column: String,
        status: String,
    },
    FetchCompleted {
        column: String,
        status: String,
        items: usize,
        /// Seconds until the next poll when the source went back to sleep.
        next_poll_secs: Option<u64>,
    },
    FetchFailed {
        column: String,
        status: String,
        details: String,
        next_poll_secs: Option<u64>,
    },
    SourceForbidden {
        column: String,
        details: String,
    },
    PendingFlushed {
        column: String,
        count: usize,
    },
    TierAscended {
        column: String,
        tier: u32,
    },
    Recalibrated {
        column: String,
        base_amount: usize,
        tier_amount: usize,
    },
    MeasurementMissing {
        column: String,
        request: String,
        details: String,
    },
    StaleResponse {
        column: String,
        request: String,
        seq: u64,
    },
    BufferSaved {
        column: String,
        items: usize,
    },
    BufferRestored {
        column: String,
        items: usize,
        status: String,
    },
    Error {
        column: Option<String>,
        code: String,
        message: String,
    },
    /// Asks the logger thread to flush and exit.
    Shutdown,
}

impl ActivityEvent {
    /// Wrap a crate error for logging.
    pub fn error(column: Option<&str>, err: &ClbError) -> Self {
        Self::Error {
            column: column.map(str::to_string),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ──────────────────── handle ────────────────────

/// Cloneable, non-blocking sender for activity events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl std::fmt::Debug for ActivityLoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLoggerHandle")
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

impl ActivityLoggerHandle {
    fn with_capacity(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        let handle = Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        };
        (handle, rx)
    }

    /// Handle whose events land on the returned receiver instead of a file.
    pub fn capture(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        Self::with_capacity(capacity)
    }

    /// Queue an event. Drops it when the channel is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events dropped since the logger thread last reported them.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to finish. Blocks only until the sentinel is queued.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(ActivityEvent::Shutdown)
            .map_err(|_| ClbError::ChannelClosed { component: "logger" })
    }
}

// ──────────────────── thread ────────────────────

/// Start the logger thread writing to the configured JSONL file.
pub fn spawn_logger(
    config: &LoggingConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (handle, rx) = ActivityLoggerHandle::with_capacity(config.channel_capacity);
    let dropped = Arc::clone(&handle.dropped_events);
    let jsonl = JsonlConfig::from_logging(config);

    let join = thread::Builder::new()
        .name("clb-logger".to_string())
        .spawn(move || run_logger(&rx, jsonl, &dropped))
        .map_err(|e| ClbError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn run_logger(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut writer = JsonlWriter::open(config);

    loop {
        let event = match rx.recv_timeout(RECOVERY_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                writer.try_recover();
                writer.flush();
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            writer.write_entry(
                &LogEntry::new(EventType::Error, Severity::Warning)
                    .details(format!("{lost} activity events dropped under back-pressure")),
            );
        }

        if event == ActivityEvent::Shutdown {
            break;
        }
        if let Some(entry) = to_log_entry(&event) {
            writer.write_entry(&entry);
        }
    }

    writer.fsync();
}

// ──────────────────── conversion ────────────────────

/// JSONL representation of an event. `None` for the shutdown sentinel.
#[allow(clippy::too_many_lines)]
pub fn to_log_entry(event: &ActivityEvent) -> Option<LogEntry> {
    let entry = match event {
        ActivityEvent::FetchStarted { column, status } => {
            let mut e = LogEntry::new(EventType::FetchStarted, Severity::Info).column(column);
            e.status = Some(status.clone());
            e
        }
        ActivityEvent::FetchCompleted {
            column,
            status,
            items,
            next_poll_secs,
        } => {
            let mut e = LogEntry::new(EventType::FetchCompleted, Severity::Info).column(column);
            e.status = Some(status.clone());
            e.items = Some(*items);
            e.backoff_secs = *next_poll_secs;
            e
        }
        ActivityEvent::FetchFailed {
            column,
            status,
            details,
            next_poll_secs,
        } => {
            let mut e = LogEntry::new(EventType::FetchFailed, Severity::Warning)
                .column(column)
                .details(details.clone());
            e.status = Some(status.clone());
            e.backoff_secs = *next_poll_secs;
            e
        }
        ActivityEvent::SourceForbidden { column, details } => {
            let mut e = LogEntry::new(EventType::SourceForbidden, Severity::Warning)
                .column(column)
                .details(details.clone());
            e.status = Some("forbidden".to_string());
            e
        }
        ActivityEvent::PendingFlushed { column, count } => {
            let mut e = LogEntry::new(EventType::PendingFlushed, Severity::Info).column(column);
            e.items = Some(*count);
            e
        }
        ActivityEvent::TierAscended { column, tier } => {
            let mut e = LogEntry::new(EventType::TierAscended, Severity::Info).column(column);
            e.tier = Some(*tier);
            e
        }
        ActivityEvent::Recalibrated {
            column,
            base_amount,
            tier_amount,
        } => {
            let mut e = LogEntry::new(EventType::Recalibrated, Severity::Info).column(column);
            e.base_amount = Some(*base_amount);
            e.tier_amount = Some(*tier_amount);
            e
        }
        ActivityEvent::MeasurementMissing {
            column,
            request,
            details,
        } => LogEntry::new(EventType::MeasurementMissing, Severity::Info)
            .column(column)
            .details(format!("{request}: {details}")),
        ActivityEvent::StaleResponse {
            column,
            request,
            seq,
        } => LogEntry::new(EventType::StaleResponse, Severity::Info)
            .column(column)
            .details(format!("{request} seq={seq}")),
        ActivityEvent::BufferSaved { column, items } => {
            let mut e = LogEntry::new(EventType::BufferSaved, Severity::Info).column(column);
            e.items = Some(*items);
            e
        }
        ActivityEvent::BufferRestored {
            column,
            items,
            status,
        } => {
            let mut e = LogEntry::new(EventType::BufferRestored, Severity::Info).column(column);
            e.items = Some(*items);
            e.status = Some(status.clone());
            e
        }
        ActivityEvent::Error {
            column,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical).details(message.clone());
            e.column.clone_from(column);
            e.error_code = Some(code.clone());
            e
        }
        ActivityEvent::Shutdown => return None,
    };
    Some(entry)
}
