//! Fetch scheduling across many columns.
//!
//! Only one fetch runs at a time: [`ColumnSet::poll_once`] picks the single
//! most urgent due column by [`FetchStatus::compare`], runs it through the
//! executor, and folds the result back before returning. Columns of equal
//! urgency take turns: the one polled least recently goes first.

#![allow(missing_docs)]

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::buffer::update::{ScrollCmd, ScrollMsg};
use crate::fetch::backoff::BackoffSchedule;
use crate::fetch::status::{FetchError, FetchStatus};

use super::Column;

/// Host side of a source fetch. Batches are returned newest first.
pub trait FetchExecutor<T> {
    fn fetch(&mut self, source_id: &str) -> Result<Vec<T>, FetchError>;
}

impl<T, F> FetchExecutor<T> for F
where
    F: FnMut(&str) -> Result<Vec<T>, FetchError>,
{
    fn fetch(&mut self, source_id: &str) -> Result<Vec<T>, FetchError> {
        self(source_id)
    }
}

/// What one [`ColumnSet::poll_once`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub column: String,
    pub status: FetchStatus,
    /// Items delivered by the fetch (0 on failure).
    pub items: usize,
}

/// Columns keyed by id, iterated in id order.
#[derive(Debug)]
pub struct ColumnSet<T> {
    columns: BTreeMap<String, Column<T>>,
    /// Poll counter value at each column's latest `poll_once`.
    last_polled: BTreeMap<String, u64>,
    polls: u64,
}

impl<T> Default for ColumnSet<T> {
    fn default() -> Self {
        Self {
            columns: BTreeMap::new(),
            last_polled: BTreeMap::new(),
            polls: 0,
        }
    }
}

impl<T> ColumnSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, replacing (and returning) any column with the same id.
    pub fn insert(&mut self, column: Column<T>) -> Option<Column<T>> {
        self.last_polled.remove(column.id());
        self.columns.insert(column.id().to_string(), column)
    }

    /// Destroy a column. Replies still in flight for it are dropped by [`route`](Self::route).
    pub fn remove(&mut self, id: &str) -> Option<Column<T>> {
        self.last_polled.remove(id);
        self.columns.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Column<T>> {
        self.columns.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Column<T>> {
        self.columns.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column<T>> {
        self.columns.values()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Deliver a message to a column. `None` when the column no longer exists.
    pub fn route(&mut self, id: &str, msg: ScrollMsg<T>) -> Option<Vec<ScrollCmd>> {
        self.columns.get_mut(id).map(|column| column.handle(msg))
    }

    /// Id of the most urgent column that is due at `now`.
    ///
    /// Equal urgency goes to the column polled least recently (never polled
    /// first), then to the lower id.
    pub fn most_due(&self, now: DateTime<Utc>) -> Option<&str> {
        self.columns
            .values()
            .filter(|column| column.fetch_status().is_due(now))
            .min_by(|a, b| self.urgency(a, b))
            .map(Column::id)
    }

    fn urgency(&self, a: &Column<T>, b: &Column<T>) -> Ordering {
        FetchStatus::compare(a.fetch_status(), b.fetch_status()).then_with(|| {
            self.last_polled
                .get(a.id())
                .cmp(&self.last_polled.get(b.id()))
        })
    }

    /// Earliest scheduled wake among sleeping columns.
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.columns
            .values()
            .filter_map(|column| match column.fetch_status() {
                FetchStatus::NextFetchAt { at, .. } => Some(*at),
                _ => None,
            })
            .min()
    }

    /// Run one fetch for the most due column, if any.
    pub fn poll_once<E>(
        &mut self,
        now: DateTime<Utc>,
        executor: &mut E,
        schedule: &BackoffSchedule,
    ) -> Option<PollReport>
    where
        E: FetchExecutor<T> + ?Sized,
    {
        let id = self.most_due(now)?.to_string();
        let column = self.columns.get_mut(&id)?;
        if !column.begin_fetch(now) {
            return None;
        }
        self.polls += 1;
        self.last_polled.insert(id.clone(), self.polls);
        let result = executor.fetch(&id);
        let items = result.as_ref().map_or(0, Vec::len);
        let status = column.complete_fetch(result, now, schedule);
        Some(PollReport {
            column: id,
            status,
            items,
        })
    }
}
