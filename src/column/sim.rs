//! Scripted replay of viewport and arrival events against one column.
//!
//! Backs `clb simulate`. A script is JSON:
//!
//! ```json
//! {
//!   "capacity": 20,
//!   "viewport": { "height": 400, "item_height": 40 },
//!   "events": [
//!     { "items": ["b", "a"] },
//!     { "scroll": 300 },
//!     { "item": "c" },
//!     "back_to_top",
//!     "load_more"
//!   ]
//! }
//! ```

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::buffer::scroll::ScrollConfig;
use crate::buffer::update::ScrollMsg;
use crate::buffer::viewport::{MeasureError, Measurement, RenderedSample, ViewportProvider};
use crate::core::config::ColumnConfig;
use crate::logger::activity::ActivityLoggerHandle;

use super::Column;

const SIM_COLUMN: &str = "sim";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Committed capacity; the configured column capacity when absent.
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub viewport: SimViewportConfig,
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimViewportConfig {
    pub height: f64,
    pub item_height: f64,
}

impl Default for SimViewportConfig {
    fn default() -> Self {
        Self {
            height: 400.0,
            item_height: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptEvent {
    /// One arriving item.
    Item(String),
    /// Newest-first batch.
    Items(Vec<String>),
    /// User scrolls to this offset (clamped to the scene).
    Scroll(f64),
    /// User holds the viewport at its current offset; programmatic scrolls are ignored.
    Hold,
    Release,
    BackToTop,
    Reveal,
    LoadMore,
    Adjust,
    /// Scroll container disappears; measurements fail until `attach`.
    Detach,
    Attach,
}

/// In-memory scroll container with fixed-height items.
#[derive(Debug, Clone)]
pub struct SimViewport {
    config: SimViewportConfig,
    offset: f64,
    rendered: usize,
    held: bool,
    attached: bool,
}

impl SimViewport {
    pub fn new(config: SimViewportConfig) -> Self {
        Self {
            config,
            offset: 0.0,
            rendered: 0,
            held: false,
            attached: true,
        }
    }

    pub const fn offset(&self) -> f64 {
        self.offset
    }

    fn scene(&self) -> f64 {
        self.rendered as f64 * self.config.item_height
    }

    fn max_offset(&self) -> f64 {
        (self.scene() - self.config.height).max(0.0)
    }

    /// User-driven scroll; ignores `hold`.
    pub fn scroll_to(&mut self, offset: f64) {
        self.offset = offset.clamp(0.0, self.max_offset());
    }

    fn check(&self, element_id: &str) -> Result<(), MeasureError> {
        if self.attached {
            Ok(())
        } else {
            Err(MeasureError::NotFound {
                element_id: element_id.to_string(),
            })
        }
    }

    fn reading(&self) -> Measurement {
        Measurement::new(self.offset, self.config.height, self.scene())
    }
}

impl ViewportProvider for SimViewport {
    fn render(&mut self, _element_id: &str, visible_items: usize) {
        self.rendered = visible_items;
        self.offset = self.offset.min(self.max_offset());
    }

    fn measure(&mut self, element_id: &str) -> Result<Measurement, MeasureError> {
        self.check(element_id)?;
        Ok(self.reading())
    }

    fn measure_rendered(&mut self, element_id: &str) -> Result<RenderedSample, MeasureError> {
        self.check(element_id)?;
        Ok(RenderedSample {
            rendered_height: self.scene(),
            measurement: self.reading(),
        })
    }

    fn set_scroll_offset(&mut self, element_id: &str, offset: f64) -> Result<(), MeasureError> {
        self.check(element_id)?;
        if !self.held {
            self.offset = offset.clamp(0.0, self.max_offset());
        }
        Ok(())
    }
}

/// Column state after a replay.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimReport {
    pub visible: Vec<String>,
    pub committed: usize,
    pub pending: usize,
    pub tier: u32,
    pub amount_to_take: usize,
    pub viewport: &'static str,
    pub offset: f64,
    /// Recent notices, newest first.
    pub notices: Vec<String>,
    /// Requests that hit the per-event budget without settling.
    pub unsettled_events: usize,
}

/// Replay `script` and report where the column ended up.
pub fn run_script(
    script: &Script,
    column: &ColumnConfig,
    scroll: ScrollConfig,
    logger: Option<ActivityLoggerHandle>,
) -> SimReport {
    let column_config = ColumnConfig {
        capacity: script.capacity.unwrap_or(column.capacity),
        ..column.clone()
    };
    let mut col = Column::new(SIM_COLUMN, &column_config, scroll);
    if let Some(logger) = logger {
        col = col.with_logger(logger);
    }
    let mut viewport = SimViewport::new(script.viewport);
    let mut unsettled_events = 0;

    let mut drive = |col: &mut Column<String>, viewport: &mut SimViewport, msg: ScrollMsg<String>| {
        if !col.drive(viewport, msg).settled {
            unsettled_events += 1;
        }
    };

    drive(&mut col, &mut viewport, ScrollMsg::Reveal);
    for event in &script.events {
        match event {
            ScriptEvent::Item(item) => drive(&mut col, &mut viewport, ScrollMsg::NewItem(item.clone())),
            ScriptEvent::Items(items) => {
                drive(&mut col, &mut viewport, ScrollMsg::NewItems(items.clone()));
            }
            ScriptEvent::Scroll(offset) => {
                viewport.render(SIM_COLUMN, col.visible().len());
                viewport.scroll_to(*offset);
                let reading = viewport.reading();
                if viewport.attached {
                    drive(&mut col, &mut viewport, ScrollMsg::Scrolled(reading));
                }
            }
            ScriptEvent::Hold => viewport.held = true,
            ScriptEvent::Release => viewport.held = false,
            ScriptEvent::BackToTop => drive(&mut col, &mut viewport, ScrollMsg::BackToTop),
            ScriptEvent::Reveal => drive(&mut col, &mut viewport, ScrollMsg::Reveal),
            ScriptEvent::LoadMore => drive(&mut col, &mut viewport, ScrollMsg::LoadMore),
            ScriptEvent::Adjust => drive(&mut col, &mut viewport, ScrollMsg::AdjustReq),
            ScriptEvent::Detach => viewport.attached = false,
            ScriptEvent::Attach => viewport.attached = true,
        }
    }

    let buffer = col.buffer();
    SimReport {
        visible: col.visible().into_iter().cloned().collect(),
        committed: buffer.committed_size(),
        pending: buffer.pending_size(),
        tier: buffer.tier(),
        amount_to_take: buffer.amount_to_take(),
        viewport: buffer.status().label(),
        offset: viewport.offset(),
        notices: col.notices().map(str::to_string).collect(),
        unsettled_events,
    }
}
