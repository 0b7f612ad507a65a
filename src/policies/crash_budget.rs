//! # Crash budget: sliding-window circuit breaker.
//!
//! [`CrashBudget`] counts worker crashes inside a sliding window. Once the count
//! goes **above** the budget the supervisor stops respawning and degrades the pool.
//!
//! ```text
//! budget = 2, window = 10s
//!
//!   t=0s  crash → [0]          2 ≥ 1 → respawn
//!   t=3s  crash → [0,3]        2 ≥ 2 → respawn
//!   t=11s crash → [3,11]       (0 slid out) → respawn
//!   t=12s crash → [3,11,12]    3 > 2 → exceeded
//! ```
//!
//! Time is passed in explicitly so the breaker is deterministic under test.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding-window crash counter.
#[derive(Debug, Clone)]
pub struct CrashBudget {
    budget: u32,
    window: Duration,
    crashes: VecDeque<Instant>,
}

impl CrashBudget {
    /// Creates an empty budget allowing `budget` crashes per `window`.
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            budget,
            window,
            crashes: VecDeque::new(),
        }
    }

    /// Records a crash at `now`. Returns `true` if the budget is now exceeded.
    pub fn record(&mut self, now: Instant) -> bool {
        self.crashes.push_back(now);
        self.evict(now);
        self.is_exceeded()
    }

    /// Crashes currently inside the window (as of the last `record`/`evict`).
    pub fn in_window(&self) -> usize {
        self.crashes.len()
    }

    /// True while more than `budget` crashes sit inside the window.
    pub fn is_exceeded(&self) -> bool {
        self.crashes.len() > self.budget as usize
    }

    /// Drops crashes older than the window relative to `now`.
    pub fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.crashes.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.crashes.pop_front();
            } else {
                break;
            }
        }
    }

    /// Forgets every recorded crash (operator restart).
    pub fn reset(&mut self) {
        self.crashes.clear();
    }

    /// Configured budget.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Configured window.
    pub fn window(&self) -> Duration {
        self.window
    }
}
