#![forbid(unsafe_code)]

//! Column Buffer (clb): viewport-aware scroll buffering and fetch scheduling
//! for feed columns that aggregate many polled sources.
//!
//! Two state machines do the work:
//! 1. **Scroll buffer** ([`buffer`]): a bounded, newest-first buffer that
//!    stages arrivals while the reader is scrolled away, reveals items in
//!    tiers as the reader goes deeper, and recalibrates its take size from
//!    real rendered heights.
//! 2. **Fetch status** ([`fetch`]): the polling lifecycle of one source with
//!    exponential backoff and a total urgency order for picking the next
//!    source to poll.
//!
//! [`column`] ties one of each together per source, [`store`] persists them,
//! and [`logger`] records what happened as JSONL.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use column_buffer::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use column_buffer::buffer::scroll::ScrollBuffer;
//! use column_buffer::fetch::status::FetchStatus;
//! ```

pub mod prelude;

pub mod buffer;
pub mod column;
pub mod core;
pub mod fetch;
pub mod logger;
pub mod store;
