//! Property-based tests for scroll buffer invariants.
//!
//! Arbitrary interleavings of arrivals, pops and viewport events are replayed
//! against both the buffer and a plain `Vec` model; capacity, size accounting
//! and newest-first ordering must agree after every step.

use proptest::prelude::*;

use super::scroll::{ScrollBuffer, ScrollConfig};
use super::update::ScrollMsg;
use super::viewport::Measurement;

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    Prepend(Vec<u32>),
    Pop,
    ScrollTop,
    ScrollAway(f64),
    Reveal,
    LoadMore,
    Resize(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::Push),
        2 => prop::collection::vec(any::<u32>(), 0..6).prop_map(Op::Prepend),
        1 => Just(Op::Pop),
        2 => Just(Op::ScrollTop),
        2 => (1.0f64..5_000.0).prop_map(Op::ScrollAway),
        1 => Just(Op::Reveal),
        1 => Just(Op::LoadMore),
        1 => (0usize..12).prop_map(Op::Resize),
    ]
}

/// Reference model: committed and pending as newest-first vectors.
#[derive(Debug, Default)]
struct Model {
    capacity: usize,
    committed: Vec<u32>,
    pending: Vec<u32>,
    scrolled: bool,
}

impl Model {
    fn flush(&mut self) {
        let mut merged = std::mem::take(&mut self.pending);
        merged.append(&mut self.committed);
        merged.truncate(self.capacity);
        self.committed = merged;
    }

    fn prepend(&mut self, items: &[u32]) {
        if self.scrolled {
            let mut merged = items.to_vec();
            merged.append(&mut self.pending);
            merged.truncate(self.capacity);
            self.pending = merged;
        } else {
            self.flush();
            let mut merged = items.to_vec();
            merged.append(&mut self.committed);
            merged.truncate(self.capacity);
            self.committed = merged;
        }
    }

    fn pop(&mut self) -> Option<u32> {
        if self.scrolled {
            (!self.pending.is_empty()).then(|| self.pending.remove(0))
        } else {
            self.flush();
            (!self.committed.is_empty()).then(|| self.committed.remove(0))
        }
    }
}

fn config() -> ScrollConfig {
    ScrollConfig {
        min_take: 3,
        ..ScrollConfig::default()
    }
}

fn apply(buf: &mut ScrollBuffer<u32>, model: &mut Model, op: &Op) {
    match op {
        Op::Push(n) => {
            buf.update(ScrollMsg::NewItem(*n));
            model.prepend(&[*n]);
        }
        Op::Prepend(items) => {
            buf.update(ScrollMsg::NewItems(items.clone()));
            model.prepend(items);
        }
        Op::Pop => {
            assert_eq!(buf.pop(), model.pop());
        }
        Op::ScrollTop => {
            buf.update(ScrollMsg::Scrolled(Measurement::new(0.0, 400.0, 2_000.0)));
            model.scrolled = false;
            model.flush();
        }
        Op::ScrollAway(offset) => {
            buf.update(ScrollMsg::Scrolled(Measurement::new(*offset, 400.0, 6_000.0)));
            model.scrolled = true;
        }
        Op::Reveal => {
            buf.update(ScrollMsg::Reveal);
            model.scrolled = false;
            model.flush();
        }
        Op::LoadMore => {
            buf.update(ScrollMsg::LoadMore);
        }
        Op::Resize(capacity) => {
            buf.set_capacity(*capacity);
            model.capacity = (*capacity).max(1);
            model.committed.truncate(model.capacity);
            model.pending.truncate(model.capacity);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn buffer_matches_model(
        capacity in 1usize..12,
        ops in prop::collection::vec(arb_op(), 1..80),
    ) {
        let mut buf = ScrollBuffer::new(capacity, config());
        let mut model = Model { capacity, ..Model::default() };

        for op in &ops {
            apply(&mut buf, &mut model, op);

            prop_assert!(buf.committed_size() <= buf.capacity());
            prop_assert!(buf.pending_size() <= buf.capacity());
            prop_assert_eq!(buf.size(), buf.committed_size() + buf.pending_size());
            prop_assert_eq!(buf.pending_size(), model.pending.len());
            prop_assert_eq!(buf.scrolled(), model.scrolled);
            let committed: Vec<u32> = buf.iter().copied().collect();
            prop_assert_eq!(&committed, &model.committed);
        }
    }

    #[test]
    fn amount_to_take_is_monotonic_in_tier(
        base in 0usize..200,
        per_tier in 0usize..200,
        min_take in 1usize..50,
        tiers in 1u32..40,
    ) {
        let cfg = ScrollConfig { min_take, ..ScrollConfig::default() };
        let mut buf: ScrollBuffer<u32> =
            ScrollBuffer::new(10, cfg).with_take_amounts(base, per_tier);
        let mut previous = buf.amount_to_take();
        prop_assert!(previous >= min_take);
        for _ in 0..tiers {
            buf.ascend();
            let current = buf.amount_to_take();
            prop_assert!(current >= previous);
            prop_assert!(current >= min_take);
            previous = current;
        }
    }

    #[test]
    fn staged_items_surface_in_push_order(
        initial in prop::collection::vec(any::<u32>(), 0..20),
        staged in prop::collection::vec(any::<u32>(), 1..20),
    ) {
        let capacity = 64;
        let mut buf = ScrollBuffer::new(capacity, config()).with_take_amounts(capacity, 0);
        for n in &initial {
            buf.push(*n);
        }
        let before: Vec<u32> = buf.to_list().into_iter().copied().collect();

        buf.update(ScrollMsg::Scrolled(Measurement::new(250.0, 400.0, 6_000.0)));
        for n in &staged {
            buf.push(*n);
        }
        let during: Vec<u32> = buf.to_list().into_iter().copied().collect();
        prop_assert_eq!(&during, &before);

        buf.update(ScrollMsg::Scrolled(Measurement::new(0.0, 400.0, 6_000.0)));
        let after: Vec<u32> = buf.iter().copied().collect();
        let expected_front: Vec<u32> = staged.iter().rev().copied().collect();
        prop_assert_eq!(&after[..staged.len()], expected_front.as_slice());
        prop_assert_eq!(&after[staged.len()..], before.as_slice());
    }

    #[test]
    fn eviction_is_fifo(capacity in 1usize..10, count in 0u32..40) {
        let mut buf = ScrollBuffer::new(capacity, config());
        for n in 0..count {
            buf.push(n);
        }
        let kept: Vec<u32> = buf.iter().copied().collect();
        let expected: Vec<u32> = (0..count).rev().take(capacity).collect();
        prop_assert_eq!(kept, expected);
    }
}
