//! Bounded, newest-first scroll buffer with a committed ring and a pending staging area.
//!
//! # Regions
//!
//! ```text
//!   push ──► [ pending ]  (viewport scrolled away: staged, invisible)
//!                │ flush (wholesale, on return to top)
//!                ▼
//!   push ──► [ committed ]  (viewport at top: capacity-bounded, FIFO eviction)
//!                │ to_list / to_list_with_filter (tiered take)
//!                ▼
//!              visible slice
//! ```
//!
//! The visible slice length is `max(min_take, base_amount + tier_amount × tier)`.
//! `base_amount`/`tier_amount` start from an assumed viewport height and are
//! recalibrated whenever a real rendered height arrives.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::collections::VecDeque;

pub use crate::core::config::ScrollConfig;

use super::update::InFlight;
use super::viewport::{Measurement, ViewportStatus};

/// Viewport-aware, tiered scroll buffer owned by one column.
#[derive(Debug, Clone)]
pub struct ScrollBuffer<T> {
    capacity: usize,
    committed: VecDeque<T>,
    pending: VecDeque<T>,
    pending_count: usize,
    status: ViewportStatus,
    tier: u32,
    base_amount: usize,
    tier_amount: usize,
    config: ScrollConfig,
    pub(super) in_flight: InFlight,
}

impl<T> ScrollBuffer<T> {
    /// Empty buffer. A capacity of 0 is clamped to 1.
    #[must_use]
    pub fn new(capacity: usize, config: ScrollConfig) -> Self {
        let fill = config.assumed_viewport_height / config.minimum_item_height;
        let (base_amount, tier_amount) = amounts_for_fill(fill, &config);
        let capacity = capacity.max(1);
        Self {
            capacity,
            committed: VecDeque::with_capacity(capacity.min(1_024)),
            pending: VecDeque::new(),
            pending_count: 0,
            status: ViewportStatus::Initial,
            tier: 0,
            base_amount,
            tier_amount,
            config,
            in_flight: InFlight::default(),
        }
    }

    /// Rehydrate from persisted items ordered newest-first.
    ///
    /// Items past `capacity` are the oldest and are evicted immediately.
    #[must_use]
    pub fn init_with<I>(capacity: usize, config: ScrollConfig, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut buffer = Self::new(capacity, config);
        buffer
            .committed
            .extend(items.into_iter().take(buffer.capacity));
        buffer
    }

    /// Override the derived take amounts until the next recalibration.
    #[must_use]
    pub fn with_take_amounts(mut self, base_amount: usize, tier_amount: usize) -> Self {
        self.base_amount = base_amount;
        self.tier_amount = tier_amount;
        self
    }

    // ──────────────────── arrival ────────────────────

    /// Insert one item at the front.
    ///
    /// At (or never moved from) the top the item is committed, evicting the
    /// oldest committed item when full. Scrolled away, it is staged in pending
    /// so the user's view does not shift. Pending holds at most `capacity`
    /// items; older staged items could not survive the flush anyway.
    pub fn push(&mut self, item: T) {
        if self.status.is_scrolled() {
            self.pending.push_front(item);
            self.pending_count += 1;
            self.bound_pending();
        } else {
            self.flush();
            self.committed.push_front(item);
            self.committed.truncate(self.capacity);
        }
    }

    /// Insert a newest-first batch as one contiguous block.
    ///
    /// Eviction happens once after the whole block lands, so only the oldest
    /// items overall are dropped.
    pub fn prepend_list(&mut self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        if self.status.is_scrolled() {
            self.pending_count += items.len();
            for item in items.into_iter().rev() {
                self.pending.push_front(item);
            }
            self.bound_pending();
        } else {
            self.flush();
            for item in items.into_iter().rev() {
                self.committed.push_front(item);
            }
            self.committed.truncate(self.capacity);
        }
    }

    /// Remove the front item of the active region (pending while scrolled,
    /// committed otherwise).
    pub fn pop(&mut self) -> Option<T> {
        if self.status.is_scrolled() {
            let item = self.pending.pop_front()?;
            self.pending_count -= 1;
            Some(item)
        } else {
            self.flush();
            self.committed.pop_front()
        }
    }

    /// Merge every pending item into committed, preserving newest-first order.
    ///
    /// Returns the number of items moved.
    pub fn flush(&mut self) -> usize {
        let moved = self.pending_count;
        if moved == 0 {
            return 0;
        }
        while let Some(item) = self.pending.pop_back() {
            self.committed.push_front(item);
        }
        self.pending_count = 0;
        self.committed.truncate(self.capacity);
        moved
    }

    fn bound_pending(&mut self) {
        if self.pending_count > self.capacity {
            self.pending.truncate(self.capacity);
            self.pending_count = self.capacity;
        }
    }

    // ──────────────────── retrieval ────────────────────

    /// Number of committed items exposed by the visible slice.
    #[must_use]
    pub fn amount_to_take(&self) -> usize {
        let tiered = self
            .tier_amount
            .saturating_mul(self.tier as usize)
            .saturating_add(self.base_amount);
        tiered.max(self.config.min_take)
    }

    /// Visible slice: the first `amount_to_take()` committed items.
    ///
    /// Never reads pending and never flushes.
    #[must_use]
    pub fn to_list(&self) -> Vec<&T> {
        self.committed.iter().take(self.amount_to_take()).collect()
    }

    /// Up to `amount_to_take()` matching committed items, scanning front to
    /// back and stopping at the last one needed.
    pub fn to_list_with_filter<F>(&self, mut predicate: F) -> Vec<&T>
    where
        F: FnMut(&T) -> bool,
    {
        self.committed
            .iter()
            .filter(|item| predicate(item))
            .take(self.amount_to_take())
            .collect()
    }

    /// All committed items, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.committed.iter()
    }

    // ──────────────────── accounting ────────────────────

    #[must_use]
    pub fn size(&self) -> usize {
        self.committed.len() + self.pending_count
    }

    #[must_use]
    pub fn pending_size(&self) -> usize {
        self.pending_count
    }

    #[must_use]
    pub fn committed_size(&self) -> usize {
        self.committed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether the viewport is away from the top anchor.
    #[must_use]
    pub fn scrolled(&self) -> bool {
        self.status.is_scrolled()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn tier(&self) -> u32 {
        self.tier
    }

    #[must_use]
    pub const fn base_amount(&self) -> usize {
        self.base_amount
    }

    #[must_use]
    pub const fn tier_amount(&self) -> usize {
        self.tier_amount
    }

    #[must_use]
    pub const fn status(&self) -> &ViewportStatus {
        &self.status
    }

    #[must_use]
    pub const fn config(&self) -> &ScrollConfig {
        &self.config
    }

    // ──────────────────── maintenance ────────────────────

    /// Rebound both regions, evicting the oldest items if the bound shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.committed.truncate(self.capacity);
        self.bound_pending();
    }

    /// Drop every item in both regions. Capacity, config and viewport state are kept.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.pending.clear();
        self.pending_count = 0;
    }

    /// Rederive take amounts from the real rendered height of the visible slice.
    ///
    /// Returns `false` (state untouched) when nothing was rendered or the
    /// sample is not a usable height.
    pub fn recalibrate(&mut self, rendered_height: f64, measurement: &Measurement) -> bool {
        let rendered_items = self.amount_to_take().min(self.committed.len());
        if rendered_items == 0
            || !rendered_height.is_finite()
            || rendered_height <= 0.0
            || measurement.viewport_size <= 0.0
        {
            return false;
        }
        let approx_item_height =
            (rendered_height / rendered_items as f64).max(self.config.minimum_item_height);
        let fill = measurement.viewport_size / approx_item_height;
        let (base_amount, tier_amount) = amounts_for_fill(fill, &self.config);
        self.base_amount = base_amount;
        self.tier_amount = tier_amount;
        true
    }

    /// Reveal one more tier.
    pub fn ascend(&mut self) {
        self.tier = self.tier.saturating_add(1);
    }

    // ──────────────────── viewport transitions ────────────────────

    /// Back to an unmeasured state: flush and reset the tier.
    pub(super) fn enter_initial(&mut self) -> usize {
        self.status = ViewportStatus::Initial;
        self.tier = 0;
        self.flush()
    }

    /// Land on the top anchor: flush and reset the tier.
    pub(super) fn enter_at_top(&mut self, measurement: Measurement) -> usize {
        self.status = ViewportStatus::AtTop(measurement);
        self.tier = 0;
        self.flush()
    }

    /// Move (or stay) away from the top. Returns whether the tier ascended.
    pub(super) fn enter_off_top(&mut self, measurement: Measurement) -> bool {
        self.status = ViewportStatus::OffTop(measurement);
        self.ascend_if_deep(&measurement)
    }

    /// Begin the animated return from the current off-top reading.
    pub(super) fn start_returning(&mut self, measurement: Measurement) {
        self.status = ViewportStatus::Returning(measurement);
    }

    /// Record an intermediate return-to-top position. Returns whether the tier ascended.
    pub(super) fn enter_returning(&mut self, measurement: Measurement) -> bool {
        self.status = ViewportStatus::Returning(measurement);
        self.ascend_if_deep(&measurement)
    }

    /// Drop an unfinished return and stay where the last reading was taken.
    pub(super) fn restore_off_top(&mut self, measurement: Measurement) {
        self.status = ViewportStatus::OffTop(measurement);
    }

    fn ascend_if_deep(&mut self, measurement: &Measurement) -> bool {
        if measurement.progress() >= self.config.ascend_threshold {
            self.ascend();
            true
        } else {
            false
        }
    }
}

fn amounts_for_fill(fill: f64, config: &ScrollConfig) -> (usize, usize) {
    let fill = if fill.is_finite() { fill.max(0.0) } else { 0.0 };
    (
        (fill * config.base_ratio).ceil() as usize,
        (fill * config.tier_ratio).ceil() as usize,
    )
}
