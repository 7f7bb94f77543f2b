//! Event handler for a column's scroll buffer.
//!
//! The host feeds [`ScrollMsg`]s in one at a time and executes the returned
//! [`ScrollCmd`]s, replying with the matching response message. Every request
//! carries a sequence number; only the most recently issued request of each
//! kind is honored, so a slow reply that lands after a newer request (or after
//! a `Reveal`) is dropped instead of being applied to state it no longer
//! describes.

#![allow(missing_docs)]

use super::scroll::ScrollBuffer;
use super::viewport::{MeasureError, Measurement, RenderedSample, ViewportStatus};

/// Inputs to [`ScrollBuffer::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollMsg<T> {
    /// Debounced scroll-listener reading.
    Scrolled(Measurement),
    /// Reply to [`ScrollCmd::Measure`].
    Measured {
        seq: u64,
        result: Result<Measurement, MeasureError>,
    },
    /// User asked to jump back to the newest items.
    BackToTop,
    /// Reply to [`ScrollCmd::ReturnStep`] after the offset was applied.
    ReturnStep {
        seq: u64,
        result: Result<Measurement, MeasureError>,
    },
    /// Column became visible again.
    Reveal,
    NewItem(T),
    /// Newest-first batch.
    NewItems(Vec<T>),
    /// Manual request for one more tier.
    LoadMore,
    /// Host rendered a slice and wants the buffer recalibrated.
    AdjustReq,
    /// Reply to [`ScrollCmd::MeasureRendered`].
    AdjustExec {
        seq: u64,
        result: Result<RenderedSample, MeasureError>,
    },
}

/// Follow-up work for the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollCmd {
    /// Measure the container; reply with [`ScrollMsg::Measured`].
    Measure { seq: u64 },
    /// Measure the rendered slice height; reply with [`ScrollMsg::AdjustExec`].
    MeasureRendered { seq: u64 },
    /// Wait one frame, set the scroll offset, re-measure; reply with
    /// [`ScrollMsg::ReturnStep`].
    ReturnStep { seq: u64, offset: f64, iteration: u32 },
}

/// Which kind of request a response belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Measure,
    Rendered,
    ReturnStep,
}

impl RequestKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Measure => "measure",
            Self::Rendered => "measure_rendered",
            Self::ReturnStep => "return_step",
        }
    }
}

/// Observable side effects worth logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollNotice {
    Flushed { count: usize },
    TierAscended { tier: u32 },
    Recalibrated { base_amount: usize, tier_amount: usize },
    MeasurementMissing { request: RequestKind, details: String },
    StaleResponse { request: RequestKind, seq: u64 },
}

/// Outcome of one [`ScrollBuffer::update`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollUpdate {
    pub commands: Vec<ScrollCmd>,
    pub notices: Vec<ScrollNotice>,
}

impl ScrollUpdate {
    fn command(&mut self, cmd: ScrollCmd) {
        self.commands.push(cmd);
    }

    fn notice(&mut self, notice: ScrollNotice) {
        self.notices.push(notice);
    }

    fn flushed(&mut self, count: usize) {
        if count > 0 {
            self.notice(ScrollNotice::Flushed { count });
        }
    }
}

/// Outstanding request sequence numbers, one slot per kind.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    next_seq: u64,
    measure: Option<u64>,
    rendered: Option<u64>,
    return_step: Option<(u64, u32)>,
}

impl InFlight {
    fn issue(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Forget everything outstanding; sequence numbers keep counting up.
    fn invalidate(&mut self) {
        self.measure = None;
        self.rendered = None;
        self.return_step = None;
    }

    /// Whether any request is awaiting a reply.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.measure.is_none() && self.rendered.is_none() && self.return_step.is_none()
    }
}

fn take_matching(slot: &mut Option<u64>, seq: u64) -> bool {
    if *slot == Some(seq) {
        *slot = None;
        true
    } else {
        false
    }
}

impl<T> ScrollBuffer<T> {
    /// Apply one message and return the follow-up commands and notices.
    pub fn update(&mut self, msg: ScrollMsg<T>) -> ScrollUpdate {
        let mut out = ScrollUpdate::default();
        match msg {
            ScrollMsg::Scrolled(measurement) => {
                // The return animation owns the viewport until it settles.
                if !matches!(self.status(), ViewportStatus::Returning(_)) {
                    self.apply_measurement(measurement, &mut out);
                }
            }
            ScrollMsg::Measured { seq, result } => {
                if !take_matching(&mut self.in_flight.measure, seq) {
                    out.notice(ScrollNotice::StaleResponse {
                        request: RequestKind::Measure,
                        seq,
                    });
                    return out;
                }
                match result {
                    Ok(measurement) => self.apply_measurement(measurement, &mut out),
                    Err(err) => out.notice(missing(RequestKind::Measure, &err)),
                }
            }
            ScrollMsg::BackToTop => self.begin_return(&mut out),
            ScrollMsg::ReturnStep { seq, result } => self.continue_return(seq, result, &mut out),
            ScrollMsg::Reveal => {
                self.in_flight.invalidate();
                let flushed = self.enter_initial();
                out.flushed(flushed);
                let seq = self.in_flight.issue();
                self.in_flight.measure = Some(seq);
                out.command(ScrollCmd::Measure { seq });
            }
            ScrollMsg::NewItem(item) => self.push(item),
            ScrollMsg::NewItems(items) => self.prepend_list(items),
            ScrollMsg::LoadMore => {
                self.ascend();
                out.notice(ScrollNotice::TierAscended { tier: self.tier() });
                self.request_rendered(&mut out);
            }
            ScrollMsg::AdjustReq => self.request_rendered(&mut out),
            ScrollMsg::AdjustExec { seq, result } => {
                if !take_matching(&mut self.in_flight.rendered, seq) {
                    out.notice(ScrollNotice::StaleResponse {
                        request: RequestKind::Rendered,
                        seq,
                    });
                    return out;
                }
                match result {
                    Ok(sample) => {
                        if self.recalibrate(sample.rendered_height, &sample.measurement) {
                            out.notice(ScrollNotice::Recalibrated {
                                base_amount: self.base_amount(),
                                tier_amount: self.tier_amount(),
                            });
                        }
                    }
                    Err(err) => out.notice(missing(RequestKind::Rendered, &err)),
                }
            }
        }
        out
    }

    fn apply_measurement(&mut self, measurement: Measurement, out: &mut ScrollUpdate) {
        if measurement.is_at_top() {
            let flushed = self.enter_at_top(measurement);
            out.flushed(flushed);
        } else if self.enter_off_top(measurement) {
            out.notice(ScrollNotice::TierAscended { tier: self.tier() });
        }
    }

    fn request_rendered(&mut self, out: &mut ScrollUpdate) {
        let seq = self.in_flight.issue();
        self.in_flight.rendered = Some(seq);
        out.command(ScrollCmd::MeasureRendered { seq });
    }

    fn begin_return(&mut self, out: &mut ScrollUpdate) {
        let ViewportStatus::OffTop(measurement) = *self.status() else {
            return;
        };
        self.start_returning(measurement);
        // The animation owns the viewport; an older reading must not end it.
        self.in_flight.measure = None;
        self.issue_return_step(measurement.scroll_offset, 1, out);
    }

    fn continue_return(
        &mut self,
        seq: u64,
        result: Result<Measurement, MeasureError>,
        out: &mut ScrollUpdate,
    ) {
        let accepted = match self.in_flight.return_step {
            Some((expected, iteration)) if expected == seq => {
                self.in_flight.return_step = None;
                Some(iteration)
            }
            _ => None,
        };
        let returning = matches!(self.status(), ViewportStatus::Returning(_));
        let Some(iteration) = accepted.filter(|_| returning) else {
            out.notice(ScrollNotice::StaleResponse {
                request: RequestKind::ReturnStep,
                seq,
            });
            return;
        };

        let measurement = match result {
            Ok(measurement) => measurement,
            Err(err) => {
                out.notice(missing(RequestKind::ReturnStep, &err));
                // Abandon the animation so scroll events are honored again.
                if let ViewportStatus::Returning(last) = *self.status() {
                    self.restore_off_top(last);
                }
                return;
            }
        };

        if measurement.is_at_top() {
            let flushed = self.enter_at_top(measurement);
            out.flushed(flushed);
        } else if iteration >= self.config().max_return_steps {
            // Something (usually the user) held the viewport away from the top.
            if self.enter_off_top(measurement) {
                out.notice(ScrollNotice::TierAscended { tier: self.tier() });
            }
        } else {
            if self.enter_returning(measurement) {
                out.notice(ScrollNotice::TierAscended { tier: self.tier() });
            }
            self.issue_return_step(measurement.scroll_offset, iteration + 1, out);
        }
    }

    fn issue_return_step(&mut self, current_offset: f64, iteration: u32, out: &mut ScrollUpdate) {
        let offset = if iteration >= self.config().max_return_steps {
            0.0
        } else {
            let next = (current_offset * self.config().return_step_ratio).floor();
            if next < 1.0 { 0.0 } else { next }
        };
        let seq = self.in_flight.issue();
        self.in_flight.return_step = Some((seq, iteration));
        out.command(ScrollCmd::ReturnStep {
            seq,
            offset,
            iteration,
        });
    }

    /// Whether any measurement or animation reply is still outstanding.
    #[must_use]
    pub const fn awaiting_reply(&self) -> bool {
        !self.in_flight.is_idle()
    }
}

fn missing(request: RequestKind, err: &MeasureError) -> ScrollNotice {
    ScrollNotice::MeasurementMissing {
        request,
        details: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::scroll::ScrollConfig;

    fn buffer() -> ScrollBuffer<char> {
        let config = ScrollConfig {
            min_take: 4,
            max_return_steps: 4,
            return_step_ratio: 0.5,
            ascend_threshold: 0.8,
            ..ScrollConfig::default()
        };
        ScrollBuffer::new(5, config).with_take_amounts(2, 1)
    }

    fn visible(buf: &ScrollBuffer<char>) -> Vec<char> {
        buf.to_list().into_iter().copied().collect()
    }

    fn top() -> Measurement {
        Measurement::new(0.0, 400.0, 1_000.0)
    }

    fn away(offset: f64) -> Measurement {
        Measurement::new(offset, 400.0, 4_000.0)
    }

    fn not_found() -> MeasureError {
        MeasureError::NotFound {
            element_id: "col".to_string(),
        }
    }

    fn only_measure_seq(update: &ScrollUpdate) -> u64 {
        match update.commands.as_slice() {
            [ScrollCmd::Measure { seq }] => *seq,
            other => panic!("expected a single Measure command, got {other:?}"),
        }
    }

    fn only_rendered_seq(update: &ScrollUpdate) -> u64 {
        match update.commands.as_slice() {
            [ScrollCmd::MeasureRendered { seq }] => *seq,
            other => panic!("expected a single MeasureRendered command, got {other:?}"),
        }
    }

    #[test]
    fn staged_items_land_on_reveal() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(top()));
        for c in ['A', 'B', 'C'] {
            buf.update(ScrollMsg::NewItem(c));
        }
        assert_eq!(visible(&buf), vec!['C', 'B', 'A']);

        buf.update(ScrollMsg::Scrolled(away(300.0)));
        buf.update(ScrollMsg::NewItem('D'));
        assert_eq!(visible(&buf), vec!['C', 'B', 'A']);

        let update = buf.update(ScrollMsg::Reveal);
        assert_eq!(visible(&buf), vec!['D', 'C', 'B', 'A']);
        assert!(update.notices.contains(&ScrollNotice::Flushed { count: 1 }));
        only_measure_seq(&update);
    }

    #[test]
    fn returning_to_top_by_scrolling_flushes() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(away(100.0)));
        buf.update(ScrollMsg::NewItems(vec!['B', 'A']));
        assert!(visible(&buf).is_empty());
        let update = buf.update(ScrollMsg::Scrolled(top()));
        assert_eq!(visible(&buf), vec!['B', 'A']);
        assert_eq!(update.notices, vec![ScrollNotice::Flushed { count: 2 }]);
    }

    #[test]
    fn deep_scroll_ascends_tier() {
        let mut buf = buffer();
        let update = buf.update(ScrollMsg::Scrolled(Measurement::new(3_300.0, 400.0, 4_000.0)));
        assert_eq!(buf.tier(), 1);
        assert_eq!(update.notices, vec![ScrollNotice::TierAscended { tier: 1 }]);
        buf.update(ScrollMsg::Scrolled(top()));
        assert_eq!(buf.tier(), 0);
    }

    #[test]
    fn back_to_top_only_from_off_top() {
        let mut buf = buffer();
        assert!(buf.update(ScrollMsg::BackToTop).commands.is_empty());
        buf.update(ScrollMsg::Scrolled(top()));
        assert!(buf.update(ScrollMsg::BackToTop).commands.is_empty());
    }

    #[test]
    fn back_to_top_animation_converges() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(away(800.0)));
        buf.update(ScrollMsg::NewItem('Z'));

        let mut update = buf.update(ScrollMsg::BackToTop);
        assert!(matches!(buf.status(), ViewportStatus::Returning(_)));
        let mut offsets = Vec::new();
        loop {
            let Some(ScrollCmd::ReturnStep { seq, offset, .. }) = update.commands.first().copied()
            else {
                break;
            };
            offsets.push(offset);
            update = buf.update(ScrollMsg::ReturnStep {
                seq,
                result: Ok(away(offset)),
            });
        }
        assert_eq!(offsets, vec![400.0, 200.0, 100.0, 0.0]);
        assert!(matches!(buf.status(), ViewportStatus::AtTop(_)));
        assert_eq!(visible(&buf), vec!['Z']);
        assert!(!buf.awaiting_reply());
    }

    #[test]
    fn scroll_events_ignored_while_returning() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(away(800.0)));
        buf.update(ScrollMsg::BackToTop);
        buf.update(ScrollMsg::Scrolled(away(600.0)));
        assert!(matches!(buf.status(), ViewportStatus::Returning(_)));
    }

    #[test]
    fn held_viewport_gives_up_after_step_cap() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(away(800.0)));
        let mut update = buf.update(ScrollMsg::BackToTop);
        while let Some(ScrollCmd::ReturnStep { seq, .. }) = update.commands.first().copied() {
            update = buf.update(ScrollMsg::ReturnStep {
                seq,
                result: Ok(away(800.0)),
            });
        }
        assert!(matches!(buf.status(), ViewportStatus::OffTop(_)));
    }

    #[test]
    fn not_found_leaves_state_unchanged() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(away(200.0)));
        let seq = only_measure_seq(&buf.update(ScrollMsg::Reveal));
        buf.update(ScrollMsg::NewItem('X'));
        let status = *buf.status();
        let tier = buf.tier();

        let update = buf.update(ScrollMsg::Measured {
            seq,
            result: Err(not_found()),
        });
        assert_eq!(*buf.status(), status);
        assert_eq!(buf.tier(), tier);
        assert_eq!(visible(&buf), vec!['X']);
        assert!(matches!(
            update.notices.as_slice(),
            [ScrollNotice::MeasurementMissing {
                request: RequestKind::Measure,
                ..
            }]
        ));
        assert!(!buf.awaiting_reply());
    }

    #[test]
    fn missing_element_abandons_return() {
        let mut buf = buffer();
        buf.update(ScrollMsg::Scrolled(away(800.0)));
        let update = buf.update(ScrollMsg::BackToTop);
        let Some(ScrollCmd::ReturnStep { seq, .. }) = update.commands.first().copied() else {
            panic!("expected a return step");
        };
        buf.update(ScrollMsg::ReturnStep {
            seq,
            result: Err(not_found()),
        });
        assert_eq!(*buf.status(), ViewportStatus::OffTop(away(800.0)));
        assert!(!buf.awaiting_reply());

        buf.update(ScrollMsg::Scrolled(top()));
        assert!(matches!(buf.status(), ViewportStatus::AtTop(_)));
    }

    #[test]
    fn measurement_from_before_back_to_top_cannot_end_the_return() {
        let mut buf = buffer();
        let measure = only_measure_seq(&buf.update(ScrollMsg::Reveal));
        buf.update(ScrollMsg::Scrolled(away(800.0)));
        buf.update(ScrollMsg::NewItem('Z'));

        let update = buf.update(ScrollMsg::BackToTop);
        let Some(ScrollCmd::ReturnStep { seq, offset, .. }) = update.commands.first().copied()
        else {
            panic!("expected a return step");
        };
        assert_eq!(offset, 400.0);

        let late = buf.update(ScrollMsg::Measured {
            seq: measure,
            result: Ok(away(800.0)),
        });
        assert_eq!(
            late.notices,
            vec![ScrollNotice::StaleResponse {
                request: RequestKind::Measure,
                seq: measure
            }]
        );
        assert!(matches!(buf.status(), ViewportStatus::Returning(_)));
        assert_eq!(buf.pending_size(), 1);

        let update = buf.update(ScrollMsg::ReturnStep {
            seq,
            result: Ok(away(400.0)),
        });
        let Some(ScrollCmd::ReturnStep { seq, offset, .. }) = update.commands.first().copied()
        else {
            panic!("expected the animation to continue");
        };
        assert_eq!(offset, 200.0);

        let update = buf.update(ScrollMsg::ReturnStep {
            seq,
            result: Ok(top()),
        });
        assert!(matches!(buf.status(), ViewportStatus::AtTop(_)));
        assert_eq!(buf.pending_size(), 0);
        assert_eq!(visible(&buf).first(), Some(&'Z'));
        assert_eq!(update.notices, vec![ScrollNotice::Flushed { count: 1 }]);
        assert!(!buf.awaiting_reply());
    }

    #[test]
    fn missing_rendered_sample_keeps_take_amounts() {
        let mut buf = buffer();
        buf.update(ScrollMsg::NewItem('A'));
        let base = buf.base_amount();
        let per_tier = buf.tier_amount();

        let seq = only_rendered_seq(&buf.update(ScrollMsg::AdjustReq));
        let update = buf.update(ScrollMsg::AdjustExec {
            seq,
            result: Err(not_found()),
        });
        assert_eq!(buf.base_amount(), base);
        assert_eq!(buf.tier_amount(), per_tier);
        assert!(matches!(
            update.notices.as_slice(),
            [ScrollNotice::MeasurementMissing {
                request: RequestKind::Rendered,
                ..
            }]
        ));
        assert!(update.commands.is_empty());
        assert!(!buf.awaiting_reply());
    }

    #[test]
    fn reveal_drops_in_flight_replies() {
        let mut buf = buffer();
        buf.update(ScrollMsg::NewItem('A'));
        let stale = only_rendered_seq(&buf.update(ScrollMsg::AdjustReq));
        buf.update(ScrollMsg::Reveal);

        let base = buf.base_amount();
        let update = buf.update(ScrollMsg::AdjustExec {
            seq: stale,
            result: Ok(RenderedSample {
                rendered_height: 10.0,
                measurement: top(),
            }),
        });
        assert_eq!(buf.base_amount(), base);
        assert_eq!(
            update.notices,
            vec![ScrollNotice::StaleResponse {
                request: RequestKind::Rendered,
                seq: stale
            }]
        );
    }

    #[test]
    fn newer_measure_supersedes_older() {
        let mut buf = buffer();
        let first = only_measure_seq(&buf.update(ScrollMsg::Reveal));
        let second = only_measure_seq(&buf.update(ScrollMsg::Reveal));
        assert!(second > first);
        let update = buf.update(ScrollMsg::Measured {
            seq: first,
            result: Ok(away(50.0)),
        });
        assert!(matches!(buf.status(), ViewportStatus::Initial));
        assert!(matches!(
            update.notices.as_slice(),
            [ScrollNotice::StaleResponse { .. }]
        ));
        buf.update(ScrollMsg::Measured {
            seq: second,
            result: Ok(away(50.0)),
        });
        assert!(matches!(buf.status(), ViewportStatus::OffTop(_)));
    }

    #[test]
    fn load_more_ascends_and_requests_adjust() {
        let mut buf = buffer();
        let update = buf.update(ScrollMsg::LoadMore);
        assert_eq!(buf.tier(), 1);
        assert!(matches!(
            update.commands.as_slice(),
            [ScrollCmd::MeasureRendered { .. }]
        ));
    }

    #[test]
    fn adjust_exec_recalibrates() {
        let mut buf = buffer();
        for c in ['A', 'B', 'C', 'D'] {
            buf.update(ScrollMsg::NewItem(c));
        }
        let seq = only_rendered_seq(&buf.update(ScrollMsg::AdjustReq));
        // 4 items in 400px => 100px each; 1000px viewport => 10 fill.
        let update = buf.update(ScrollMsg::AdjustExec {
            seq,
            result: Ok(RenderedSample {
                rendered_height: 400.0,
                measurement: Measurement::new(0.0, 1_000.0, 400.0),
            }),
        });
        assert_eq!(buf.base_amount(), 20);
        assert_eq!(buf.tier_amount(), 10);
        assert_eq!(
            update.notices,
            vec![ScrollNotice::Recalibrated {
                base_amount: 20,
                tier_amount: 10
            }]
        );
    }
}
