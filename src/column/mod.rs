//! A column: one external source, its scroll buffer and its polling state.
//!
//! [`Column`] is the single owner that ties a [`ScrollBuffer`] to a
//! [`FetchStatus`]. It routes viewport messages, turns buffer notices into
//! activity log events, and runs the synchronous request/reply loop against a
//! [`ViewportProvider`]. [`ColumnSet`] schedules fetches across many columns.

#![allow(missing_docs)]

pub mod set;
pub mod sim;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::buffer::ring_limiter::RingLimiter;
use crate::buffer::scroll::{ScrollBuffer, ScrollConfig};
use crate::buffer::update::{ScrollCmd, ScrollMsg, ScrollNotice};
use crate::buffer::viewport::ViewportProvider;
use crate::core::config::ColumnConfig;
use crate::fetch::backoff::BackoffSchedule;
use crate::fetch::status::{FetchError, FetchOutcome, FetchStatus};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

pub use set::{ColumnSet, FetchExecutor, PollReport};

/// Requests a single `drive` call may serve before giving up.
const MAX_DRIVE_REQUESTS: usize = 64;

/// Summary of one [`Column::drive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveReport {
    /// Provider requests served.
    pub requests: usize,
    /// False when the request budget ran out with commands still queued.
    pub settled: bool,
}

pub struct Column<T> {
    id: String,
    buffer: ScrollBuffer<T>,
    fetch: FetchStatus,
    notices: RingLimiter<String>,
    logger: Option<ActivityLoggerHandle>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("id", &self.id)
            .field("buffer", &self.buffer)
            .field("fetch", &self.fetch)
            .field("notices", &self.notices)
            .finish_non_exhaustive()
    }
}

impl<T> Column<T> {
    /// Empty column that has never been fetched.
    pub fn new(id: impl Into<String>, column: &ColumnConfig, scroll: ScrollConfig) -> Self {
        Self::from_parts(
            id,
            ScrollBuffer::new(column.capacity, scroll),
            FetchStatus::Waiting,
            column.notice_history,
        )
    }

    /// Assemble a column from an existing buffer and status.
    pub fn from_parts(
        id: impl Into<String>,
        buffer: ScrollBuffer<T>,
        fetch: FetchStatus,
        notice_history: usize,
    ) -> Self {
        Self {
            id: id.into(),
            buffer,
            fetch,
            notices: RingLimiter::new(notice_history),
            logger: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn buffer(&self) -> &ScrollBuffer<T> {
        &self.buffer
    }

    pub const fn fetch_status(&self) -> &FetchStatus {
        &self.fetch
    }

    /// Recent human-readable notices, newest first.
    pub fn notices(&self) -> impl Iterator<Item = &str> {
        self.notices.iter().map(String::as_str)
    }

    /// Visible slice, newest first.
    pub fn visible(&self) -> Vec<&T> {
        self.buffer.to_list()
    }

    pub(crate) fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }

    // ──────────────────── viewport ────────────────────

    /// Apply one message and return the requests the host must serve.
    pub fn handle(&mut self, msg: ScrollMsg<T>) -> Vec<ScrollCmd> {
        let update = self.buffer.update(msg);
        for notice in &update.notices {
            self.record(notice);
        }
        update.commands
    }

    /// Apply `msg`, then serve every resulting request against `provider`
    /// until the buffer stops asking.
    pub fn drive<P>(&mut self, provider: &mut P, msg: ScrollMsg<T>) -> DriveReport
    where
        P: ViewportProvider + ?Sized,
    {
        let mut queue: VecDeque<ScrollCmd> = self.handle(msg).into();
        let mut requests = 0;

        while let Some(cmd) = queue.pop_front() {
            if requests == MAX_DRIVE_REQUESTS {
                queue.push_front(cmd);
                break;
            }
            requests += 1;
            provider.render(&self.id, self.buffer.to_list().len());
            let reply = match cmd {
                ScrollCmd::Measure { seq } => ScrollMsg::Measured {
                    seq,
                    result: provider.measure(&self.id),
                },
                ScrollCmd::MeasureRendered { seq } => ScrollMsg::AdjustExec {
                    seq,
                    result: provider.measure_rendered(&self.id),
                },
                ScrollCmd::ReturnStep { seq, offset, .. } => {
                    let result = provider
                        .set_scroll_offset(&self.id, offset)
                        .and_then(|()| {
                            provider.render(&self.id, self.buffer.to_list().len());
                            provider.measure(&self.id)
                        });
                    ScrollMsg::ReturnStep { seq, result }
                }
            };
            queue.extend(self.handle(reply));
        }

        let settled = queue.is_empty();
        if !settled {
            self.log(ActivityEvent::Error {
                column: Some(self.id.clone()),
                code: "CLB-3900".to_string(),
                message: format!(
                    "viewport loop still busy after {MAX_DRIVE_REQUESTS} requests, {} dropped",
                    queue.len()
                ),
            });
        }
        DriveReport { requests, settled }
    }

    fn record(&mut self, notice: &ScrollNotice) {
        let id = self.id.clone();
        let (text, event) = match notice {
            ScrollNotice::Flushed { count } => (
                format!("{count} new items shown"),
                ActivityEvent::PendingFlushed {
                    column: id,
                    count: *count,
                },
            ),
            ScrollNotice::TierAscended { tier } => (
                format!("expanded to tier {tier}"),
                ActivityEvent::TierAscended {
                    column: id,
                    tier: *tier,
                },
            ),
            ScrollNotice::Recalibrated {
                base_amount,
                tier_amount,
            } => (
                format!("now taking {base_amount} + {tier_amount} per tier"),
                ActivityEvent::Recalibrated {
                    column: id,
                    base_amount: *base_amount,
                    tier_amount: *tier_amount,
                },
            ),
            ScrollNotice::MeasurementMissing { request, details } => (
                format!("{} skipped: {details}", request.label()),
                ActivityEvent::MeasurementMissing {
                    column: id,
                    request: request.label().to_string(),
                    details: details.clone(),
                },
            ),
            ScrollNotice::StaleResponse { request, seq } => (
                format!("dropped stale {} #{seq}", request.label()),
                ActivityEvent::StaleResponse {
                    column: id,
                    request: request.label().to_string(),
                    seq: *seq,
                },
            ),
        };
        self.note(text);
        self.log(event);
    }

    fn note(&mut self, text: String) {
        self.notices.push_if_distinct_from_head(text, |head, item| head == item);
    }

    // ──────────────────── fetching ────────────────────

    /// Mark a fetch as started. False when the source is not due.
    pub fn begin_fetch(&mut self, now: DateTime<Utc>) -> bool {
        let Some(next) = self.fetch.begin(now) else {
            return false;
        };
        self.fetch = next;
        self.log(ActivityEvent::FetchStarted {
            column: self.id.clone(),
            status: next.label().to_string(),
        });
        true
    }

    /// Fold a fetch result into the status and stage or commit the new items.
    ///
    /// `result` items are newest first. A result with no fetch in flight is
    /// discarded and the status is returned unchanged.
    pub fn complete_fetch(
        &mut self,
        result: Result<Vec<T>, FetchError>,
        now: DateTime<Utc>,
        schedule: &BackoffSchedule,
    ) -> FetchStatus {
        if !self.fetch.fetching() {
            return self.fetch;
        }
        let outcome = FetchOutcome::from_result(&result);
        self.fetch = self.fetch.complete(&outcome, now, schedule);
        let next_poll_secs = self
            .fetch
            .wake_at()
            .filter(|_| self.fetch.dormant())
            .map(|at| u64::try_from((at - now).num_seconds()).unwrap_or(0));

        match result {
            Ok(items) => {
                let count = items.len();
                if count > 0 {
                    self.handle(ScrollMsg::NewItems(items));
                }
                self.log(ActivityEvent::FetchCompleted {
                    column: self.id.clone(),
                    status: self.fetch.label().to_string(),
                    items: count,
                    next_poll_secs,
                });
            }
            Err(FetchError::Forbidden { details }) => {
                self.note(format!("source forbidden: {details}"));
                self.log(ActivityEvent::SourceForbidden {
                    column: self.id.clone(),
                    details,
                });
            }
            Err(FetchError::Transient { details }) => {
                self.note(format!("fetch failed: {details}"));
                self.log(ActivityEvent::FetchFailed {
                    column: self.id.clone(),
                    status: self.fetch.label().to_string(),
                    details,
                    next_poll_secs,
                });
            }
        }
        self.fetch
    }
}
