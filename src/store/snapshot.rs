//! Persisted form of a column.
//!
//! Only the committed items (newest first) and the fetch status survive a
//! restart. Pending items, tier and viewport status are rebuilt: a restored
//! column starts unmeasured and asks for a fresh measurement like a newly
//! revealed one.

#![allow(missing_docs)]

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::buffer::scroll::{ScrollBuffer, ScrollConfig};
use crate::buffer::update::{ScrollCmd, ScrollMsg};
use crate::column::Column;
use crate::core::config::ColumnConfig;
use crate::core::errors::{ClbError, Result};
use crate::fetch::status::FetchStatus;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

use super::kv::KeyValueStore;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSnapshot<T> {
    pub version: u32,
    /// Committed items, newest first.
    pub items: Vec<T>,
    pub fetch_status: FetchStatus,
}

impl<T: Clone> ColumnSnapshot<T> {
    pub fn capture(column: &Column<T>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            items: column.buffer().iter().cloned().collect(),
            fetch_status: *column.fetch_status(),
        }
    }
}

impl<T: DeserializeOwned> ColumnSnapshot<T> {
    /// Parse a stored snapshot. Any failure rejects the whole snapshot.
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_slice(bytes).map_err(|err| ClbError::corrupt(key, err))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ClbError::corrupt(
                key,
                format!("unsupported snapshot version {}", snapshot.version),
            ));
        }
        Ok(snapshot)
    }
}

/// Persist the column's committed items and fetch status under its id.
pub fn save_column<T, S>(store: &S, column: &Column<T>) -> Result<()>
where
    T: Clone + Serialize,
    S: KeyValueStore + ?Sized,
{
    let snapshot = ColumnSnapshot::capture(column);
    let bytes = serde_json::to_vec(&snapshot)?;
    store.save(column.id(), &bytes)?;
    column.log(ActivityEvent::BufferSaved {
        column: column.id().to_string(),
        items: snapshot.items.len(),
    });
    Ok(())
}

/// A column rebuilt from the store, with the measurement it needs first.
#[derive(Debug)]
pub struct Restored<T> {
    pub column: Column<T>,
    /// Requests produced by the initial reveal; serve them like any other.
    pub commands: Vec<ScrollCmd>,
}

/// Rebuild the column stored under `key`. `Ok(None)` when nothing is stored.
///
/// An in-flight fetch status cannot outlive the process that started it, so
/// it comes back dormant.
pub fn restore_column<T, S>(
    store: &S,
    key: &str,
    column: &ColumnConfig,
    scroll: ScrollConfig,
    logger: Option<ActivityLoggerHandle>,
) -> Result<Option<Restored<T>>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(bytes) = store.load(key)? else {
        return Ok(None);
    };
    let snapshot = ColumnSnapshot::<T>::decode(key, &bytes)?;
    let items = snapshot.items.len();
    let status = snapshot.fetch_status.rehydrated();

    let buffer = ScrollBuffer::init_with(column.capacity, scroll, snapshot.items);
    let mut restored = Column::from_parts(key, buffer, status, column.notice_history);
    if let Some(logger) = logger {
        restored = restored.with_logger(logger);
    }
    restored.log(ActivityEvent::BufferRestored {
        column: key.to_string(),
        items,
        status: status.label().to_string(),
    });
    let commands = restored.handle(ScrollMsg::Reveal);
    Ok(Some(Restored {
        column: restored,
        commands,
    }))
}
