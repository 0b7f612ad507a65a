//! # Pool configuration.
//!
//! Provides [`PoolConfig`], the immutable settings a [`Pool`](crate::Pool) is built with.
//!
//! ## Sentinel values
//! - `task_timeout = 0s` → no per-attempt timeout (and no stall watchdog)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::error::PoolError;
use crate::policies::{BackoffPolicy, JitterPolicy};

/// Settings for a worker pool.
///
/// ## Field semantics
/// - `size`: number of workers kept alive (`>= 1`)
/// - `queue_capacity`: tasks that may wait for a worker (`0` = hand-off only)
/// - `task_timeout`: per-attempt timeout (`0s` = none)
/// - `max_retries`: extra attempts after the first one fails or its worker crashes
/// - `crash_budget`: crashes tolerated inside `crash_window` before the pool degrades
/// - `crash_window`: sliding window for the crash budget (`> 0`)
/// - `shutdown_grace`: default drain deadline for [`Pool::shutdown`](crate::Pool::shutdown)
/// - `respawn_backoff`: delay before a replacement worker starts pulling tasks
/// - `retry_backoff`: delay between attempts of a failing task
/// - `bus_capacity`: event bus ring buffer size
///
/// ## Notes
/// All fields are public. Prefer the accessors to avoid sprinkling sentinel checks.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of workers.
    pub size: usize,

    /// Maximum number of tasks waiting in the queue.
    ///
    /// Tasks handed straight to a parked idle worker do not count against it.
    pub queue_capacity: usize,

    /// Per-attempt timeout.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = each attempt is bounded, and a worker stuck past it is treated as crashed
    pub task_timeout: Duration,

    /// Retries after the first attempt (`0` = run once).
    pub max_retries: u32,

    /// Crashes allowed inside `crash_window`; one more degrades the pool.
    pub crash_budget: u32,

    /// Sliding window for counting crashes.
    pub crash_window: Duration,

    /// Default shutdown deadline.
    pub shutdown_grace: Duration,

    /// Respawn delay policy, indexed by the slot's consecutive crash count minus one:
    /// the n-th consecutive crash waits `first * factor^(n-1)`, so the first waits `first`.
    pub respawn_backoff: BackoffPolicy,

    /// Delay policy between attempts of a failing task.
    pub retry_backoff: BackoffPolicy,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
}

impl PoolConfig {
    /// Creates the default configuration with `size` workers.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Returns the per-attempt timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied per attempt
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        if self.task_timeout == Duration::ZERO {
            None
        } else {
            Some(self.task_timeout)
        }
    }

    /// Total attempts a task may get (`max_retries + 1`).
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Checks the configuration, returning [`PoolError::InvalidConfig`] on the first problem.
    ///
    /// # Example
    /// ```
    /// use poolvisor::PoolConfig;
    ///
    /// assert!(PoolConfig::with_size(4).validate().is_ok());
    /// assert!(PoolConfig::with_size(0).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.size < 1 {
            return Err(invalid("size must be at least 1"));
        }
        if self.crash_window == Duration::ZERO {
            return Err(invalid("crash_window must be greater than zero"));
        }
        for (name, backoff) in [
            ("respawn_backoff", &self.respawn_backoff),
            ("retry_backoff", &self.retry_backoff),
        ] {
            if !backoff.factor.is_finite() || backoff.factor < 0.0 {
                return Err(invalid(format!(
                    "{name}.factor must be finite and non-negative"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> PoolError {
    PoolError::InvalidConfig {
        reason: reason.into(),
    }
}

impl Default for PoolConfig {
    /// Default configuration:
    ///
    /// - `size = 4`, `queue_capacity = 64`
    /// - `task_timeout = 0s` (no timeout)
    /// - `max_retries = 2`
    /// - `crash_budget = 5` per `crash_window = 60s`
    /// - `shutdown_grace = 30s`
    /// - `respawn_backoff`: 100ms doubling up to 10s, no jitter
    /// - `retry_backoff`: 50ms doubling up to 5s, no jitter
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            size: 4,
            queue_capacity: 64,
            task_timeout: Duration::ZERO,
            max_retries: 2,
            crash_budget: 5,
            crash_window: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            respawn_backoff: BackoffPolicy {
                first: Duration::from_millis(100),
                max: Duration::from_secs(10),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            retry_backoff: BackoffPolicy {
                first: Duration::from_millis(50),
                max: Duration::from_secs(5),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            bus_capacity: 1024,
        }
    }
}
