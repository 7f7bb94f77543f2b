//! Polling lifecycle of one external source (channel or conversation).
//!
//! # Transitions
//!
//! ```text
//! Waiting ──begin──► InitialFetching ──new items──► Available
//!                         │  └──empty / transient──► NextFetchAt
//!                         └──forbidden──► Forbidden (terminal)
//!
//! Available ──begin──► Fetching(since, MIN)
//! NextFetchAt(at, b) ──begin, once due──► Fetching(now, b)
//! Fetching(since, b) ──new items──► Available
//!                    ──empty / transient──► NextFetchAt(now + delay(escalate(b)), escalate(b))
//!                    ──forbidden──► Forbidden
//! ```
//!
//! # Urgency order
//!
//! [`FetchStatus::compare`] ranks `Waiting < NextFetchAt < InitialFetching <
//! Fetching < Available < Forbidden`; the smallest status is the most urgent.
//! Ties within a variant go to the earlier timestamp. Backoff never takes part
//! in the comparison, which is why `FetchStatus` does not implement `Ord`
//! (two structurally different statuses may compare equal).

#![allow(missing_docs)]

use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::backoff::{Backoff, BackoffSchedule};

/// Failure reported by the fetch executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Authentication or permission failure. Not retried automatically.
    #[error("access forbidden: {details}")]
    Forbidden { details: String },
    /// Network hiccup, rate limit, server error: retried after backoff.
    #[error("transient fetch failure: {details}")]
    Transient { details: String },
}

/// What a completed fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    NewItems(usize),
    Empty,
    Failed(FetchError),
}

impl FetchOutcome {
    /// Fold an executor result into an outcome by batch size.
    #[must_use]
    pub fn from_result<T>(result: &Result<Vec<T>, FetchError>) -> Self {
        match result {
            Ok(items) if items.is_empty() => Self::Empty,
            Ok(items) => Self::NewItems(items.len()),
            Err(err) => Self::Failed(err.clone()),
        }
    }
}

/// Polling state of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    /// Never fetched.
    #[default]
    Waiting,
    /// Idle until `at`.
    NextFetchAt {
        at: DateTime<Utc>,
        backoff: Backoff,
    },
    /// First fetch in flight.
    InitialFetching { started_at: DateTime<Utc> },
    /// Regular poll in flight.
    Fetching {
        since: DateTime<Utc>,
        backoff: Backoff,
    },
    /// Last poll produced items; ready to poll again.
    Available,
    /// Access denied. Only a manual reset leaves this state.
    Forbidden,
}

impl FetchStatus {
    /// Priority rank of the variant; lower is more urgent.
    const fn rank(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::NextFetchAt { .. } => 1,
            Self::InitialFetching { .. } => 2,
            Self::Fetching { .. } => 3,
            Self::Available => 4,
            Self::Forbidden => 5,
        }
    }

    /// Timestamp used to break ties within a variant.
    const fn tie_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::NextFetchAt { at, .. } => Some(at),
            Self::InitialFetching { started_at } => Some(started_at),
            Self::Fetching { since, .. } => Some(since),
            Self::Waiting | Self::Available | Self::Forbidden => None,
        }
    }

    /// Total urgency order: variant rank, then earlier timestamp first.
    #[must_use]
    pub fn compare(a: &Self, b: &Self) -> Ordering {
        a.rank()
            .cmp(&b.rank())
            .then_with(|| a.tie_time().cmp(&b.tie_time()))
    }

    #[must_use]
    pub fn less_than(a: &Self, b: &Self) -> bool {
        Self::compare(a, b) == Ordering::Less
    }

    /// Not in flight and not terminal.
    #[must_use]
    pub const fn dormant(&self) -> bool {
        matches!(self, Self::Waiting | Self::NextFetchAt { .. })
    }

    #[must_use]
    pub const fn fetching(&self) -> bool {
        matches!(self, Self::InitialFetching { .. } | Self::Fetching { .. })
    }

    /// Has been picked up by the poller and not shut out.
    #[must_use]
    pub const fn subscribed(&self) -> bool {
        !matches!(self, Self::Waiting | Self::Forbidden)
    }

    /// Whether `begin(now)` would start a fetch.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Waiting | Self::Available => true,
            Self::NextFetchAt { at, .. } => *at <= now,
            Self::InitialFetching { .. } | Self::Fetching { .. } | Self::Forbidden => false,
        }
    }

    /// Scheduled wake time, if the status carries one.
    #[must_use]
    pub const fn wake_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::NextFetchAt { at, .. } => Some(*at),
            Self::Fetching { since, .. } => Some(*since),
            Self::InitialFetching { started_at } => Some(*started_at),
            Self::Waiting | Self::Available | Self::Forbidden => None,
        }
    }

    /// Start a fetch. `None` when the source is not due (in flight, waiting on
    /// its backoff, or forbidden).
    #[must_use]
    pub fn begin(&self, now: DateTime<Utc>) -> Option<Self> {
        match *self {
            Self::Waiting => Some(Self::InitialFetching { started_at: now }),
            Self::Available => Some(Self::Fetching {
                since: now,
                backoff: Backoff::MIN,
            }),
            Self::NextFetchAt { at, backoff } if at <= now => Some(Self::Fetching {
                since: now,
                backoff,
            }),
            Self::NextFetchAt { .. }
            | Self::InitialFetching { .. }
            | Self::Fetching { .. }
            | Self::Forbidden => None,
        }
    }

    /// Fold a finished fetch into the next status.
    ///
    /// Statuses with no fetch in flight are returned unchanged.
    #[must_use]
    pub fn complete(
        &self,
        outcome: &FetchOutcome,
        now: DateTime<Utc>,
        schedule: &BackoffSchedule,
    ) -> Self {
        let current = match *self {
            Self::InitialFetching { .. } => None,
            Self::Fetching { backoff, .. } => Some(backoff),
            _ => return *self,
        };
        match outcome {
            FetchOutcome::NewItems(n) if *n > 0 => Self::Available,
            FetchOutcome::Failed(FetchError::Forbidden { .. }) => Self::Forbidden,
            FetchOutcome::NewItems(_) | FetchOutcome::Empty => {
                let next = current.map_or(Backoff::MIN, |b| schedule.escalate(b));
                Self::sleep(now, next, schedule)
            }
            FetchOutcome::Failed(FetchError::Transient { .. }) => {
                let next = schedule.escalate(current.unwrap_or(Backoff::MIN));
                Self::sleep(now, next, schedule)
            }
        }
    }

    fn sleep(now: DateTime<Utc>, backoff: Backoff, schedule: &BackoffSchedule) -> Self {
        let delay = TimeDelta::from_std(schedule.delay(backoff)).unwrap_or(TimeDelta::MAX);
        Self::NextFetchAt {
            at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
            backoff,
        }
    }

    /// A persisted status with a fetch in flight cannot survive a restart;
    /// demote it to the equivalent dormant state.
    #[must_use]
    pub const fn rehydrated(self) -> Self {
        match self {
            Self::InitialFetching { .. } => Self::Waiting,
            Self::Fetching { since, backoff } => Self::NextFetchAt { at: since, backoff },
            other => other,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::NextFetchAt { .. } => "next_fetch_at",
            Self::InitialFetching { .. } => "initial_fetching",
            Self::Fetching { .. } => "fetching",
            Self::Available => "available",
            Self::Forbidden => "forbidden",
        }
    }

    #[must_use]
    pub const fn backoff(&self) -> Option<Backoff> {
        match self {
            Self::NextFetchAt { backoff, .. } | Self::Fetching { backoff, .. } => Some(*backoff),
            _ => None,
        }
    }
}
