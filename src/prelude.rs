//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use column_buffer::prelude::*;
//! ```

// Core
pub use crate::core::config::{ColumnConfig, Config, ScrollConfig};
pub use crate::core::errors::{ClbError, Result};

// Buffer
pub use crate::buffer::ring_limiter::RingLimiter;
pub use crate::buffer::scroll::ScrollBuffer;
pub use crate::buffer::update::{ScrollCmd, ScrollMsg, ScrollNotice, ScrollUpdate};
pub use crate::buffer::viewport::{
    MeasureError, Measurement, RenderedSample, ViewportProvider, ViewportStatus,
};

// Fetch
pub use crate::fetch::backoff::{Backoff, BackoffSchedule};
pub use crate::fetch::status::{FetchError, FetchOutcome, FetchStatus};

// Column
pub use crate::column::{Column, ColumnSet, DriveReport, FetchExecutor, PollReport};

// Store
pub use crate::store::kv::{FileStore, KeyValueStore, MemoryStore};
pub use crate::store::snapshot::{ColumnSnapshot, Restored, restore_column, save_column};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
