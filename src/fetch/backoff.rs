//! Exponential backoff steps between empty or failed polls.
//!
//! A [`Backoff`] is only a step index; the delay it maps to comes from a
//! [`BackoffSchedule`] so the step sequence stays configuration. With the
//! defaults (5 s base, 6 h cap) the delays run
//! 5, 10, 20, 40, ..., 10240, 20480, 21600 seconds.

#![allow(missing_docs)]

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::BackoffConfig;

/// Position in the doubling sequence. Step 0 is the shortest delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Backoff(u8);

impl Backoff {
    pub const MIN: Self = Self(0);

    #[must_use]
    pub const fn step(self) -> u8 {
        self.0
    }
}

/// Doubling delays from `base`, clamped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base: Duration,
    max: Duration,
    max_step: u8,
}

impl BackoffSchedule {
    /// Build a schedule. `base` is raised to at least 1 s and `max` to at least `base`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_secs(1));
        let max = max.max(base);
        let mut max_step = 0u8;
        let mut delay = base;
        while delay < max && max_step < u8::MAX {
            delay = delay.saturating_mul(2);
            max_step += 1;
        }
        Self {
            base,
            max,
            max_step,
        }
    }

    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs(config.base_secs),
            Duration::from_secs(config.max_secs),
        )
    }

    /// Highest step; its delay equals `max`.
    #[must_use]
    pub const fn max_backoff(&self) -> Backoff {
        Backoff(self.max_step)
    }

    /// Delay for a step, never above `max`.
    #[must_use]
    pub fn delay(&self, backoff: Backoff) -> Duration {
        let mut delay = self.base;
        for _ in 0..backoff.0 {
            if delay >= self.max {
                break;
            }
            delay = delay.saturating_mul(2);
        }
        delay.min(self.max)
    }

    /// Next step after another empty or failed poll, saturating at the cap.
    #[must_use]
    pub fn escalate(&self, backoff: Backoff) -> Backoff {
        if backoff.0 >= self.max_step {
            Backoff(self.max_step)
        } else {
            Backoff(backoff.0 + 1)
        }
    }

    /// Every (step, delay) pair up to the cap.
    pub fn steps(&self) -> impl Iterator<Item = (Backoff, Duration)> + '_ {
        (0..=self.max_step).map(|step| (Backoff(step), self.delay(Backoff(step))))
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
