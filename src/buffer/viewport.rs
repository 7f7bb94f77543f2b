//! Viewport measurements, the viewport status machine, and the measurement provider seam.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One reading of a scroll container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Distance scrolled from the top anchor, in pixels.
    pub scroll_offset: f64,
    /// Visible height of the container.
    pub viewport_size: f64,
    /// Total scrollable height of the content.
    pub scene_size: f64,
}

impl Measurement {
    #[must_use]
    pub const fn new(scroll_offset: f64, viewport_size: f64, scene_size: f64) -> Self {
        Self {
            scroll_offset,
            viewport_size,
            scene_size,
        }
    }

    /// Offset zero (or negative overscroll) counts as the top anchor.
    #[must_use]
    pub fn is_at_top(&self) -> bool {
        self.scroll_offset <= 0.0
    }

    /// Fraction of the scene above the visible bottom edge.
    ///
    /// An empty scene is fully visible, so it reports 1.0.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.scene_size <= 0.0 {
            return 1.0;
        }
        (self.scroll_offset + self.viewport_size) / self.scene_size
    }
}

/// Where the user's viewport sits relative to the top anchor.
///
/// Carrying the measurement inside the variants keeps "returning without a
/// prior measurement" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ViewportStatus {
    /// Never measured (fresh, restored, or just revealed).
    #[default]
    Initial,
    AtTop(Measurement),
    OffTop(Measurement),
    /// Animated return to the top in progress.
    Returning(Measurement),
}

impl ViewportStatus {
    /// Arriving items are staged rather than committed in these states.
    #[must_use]
    pub const fn is_scrolled(&self) -> bool {
        matches!(self, Self::OffTop(_) | Self::Returning(_))
    }

    #[must_use]
    pub const fn measurement(&self) -> Option<&Measurement> {
        match self {
            Self::Initial => None,
            Self::AtTop(m) | Self::OffTop(m) | Self::Returning(m) => Some(m),
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::AtTop(_) => "at_top",
            Self::OffTop(_) => "off_top",
            Self::Returning(_) => "returning",
        }
    }
}

/// Measurement or scroll command target is gone (e.g. the column was closed).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    #[error("viewport element {element_id} not found")]
    NotFound { element_id: String },
}

/// Result of measuring the rendered slice for recalibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedSample {
    /// Pixel height of the items currently taken by `to_list`.
    pub rendered_height: f64,
    pub measurement: Measurement,
}

/// Host-side access to a column's scroll container.
pub trait ViewportProvider {
    /// Render pass for the current slice, run before every request.
    fn render(&mut self, _element_id: &str, _visible_items: usize) {}

    fn measure(&mut self, element_id: &str) -> Result<Measurement, MeasureError>;

    fn measure_rendered(&mut self, element_id: &str) -> Result<RenderedSample, MeasureError>;

    fn set_scroll_offset(&mut self, element_id: &str, offset: f64) -> Result<(), MeasureError>;
}
