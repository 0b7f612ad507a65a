//! # Jitter policy for respawn and retry delays.
//!
//! When several workers crash together (a poisoned batch of tasks, a dependency outage),
//! identical backoff delays make all replacements hit the queue at the same instant.
//! [`JitterPolicy`] spreads them out.
//!
//! - [`JitterPolicy::None`]: exact delays
//! - [`JitterPolicy::Full`]: random in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`]: random in `[base, prev × 3]`, capped

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact backoff delay. Predictable; fine for a single pool in tests.
    #[default]
    None,

    /// Random delay in `[0, delay]`. Widest spread, may shorten delays a lot.
    Full,

    /// `delay/2 + random[0, delay/2]`. Keeps roughly 75% of the delay on average.
    Equal,

    /// Random delay in `[base, prev × 3]`, capped at `max`.
    ///
    /// Needs extra context; see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns `delay` unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => Self::full(delay),
            JitterPolicy::Equal => Self::equal(delay),
        }
    }

    /// Applies decorrelated jitter: random in `[base, min(prev × 3, max)]`.
    ///
    /// Falls back to [`apply`](Self::apply) for other variants.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }

    fn full(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ms))
    }

    fn equal(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        let half = ms / 2;
        if half == 0 {
            return delay;
        }
        Duration::from_millis(half + rand::rng().random_range(0..=half))
    }
}
