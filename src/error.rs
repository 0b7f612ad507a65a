//! Error types used by the poolvisor runtime, handlers and pending results.
//!
//! This module defines three error enums:
//!
//! - [`PoolError`]: errors raised by pool operations (`new`, `submit`, `shutdown`, `recover`).
//! - [`TaskError`]: errors returned by a [`Handler`](crate::Handler) for one attempt.
//! - [`JobError`]: the terminal error a [`PendingResult`](crate::PendingResult) resolves with.
//!
//! All types provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::jobs::TaskId;

/// # Errors produced by pool operations.
///
/// These represent failures of the pool itself (backpressure, lifecycle, configuration),
/// never failures of an individual task.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The queue is at capacity and no idle worker is parked on it.
    ///
    /// Recoverable: retry later or shed load.
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The pool is draining or stopped and no longer accepts work.
    #[error("pool closed")]
    Closed,

    /// Too many worker crashes inside the crash window; the pool stopped self-healing.
    ///
    /// Reported by every `submit` and by `stats` until [`Pool::recover`](crate::Pool::recover).
    #[error("crash budget exceeded: more than {budget} crashes within {window:?}")]
    CrashBudgetExceeded {
        /// Configured crash budget.
        budget: u32,
        /// Configured sliding window.
        window: Duration,
    },

    /// Construction-time validation failure.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Shutdown grace period was exceeded; stragglers were force-terminated.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forced termination")]
    ShutdownTimeout {
        /// The grace duration that elapsed.
        grace: Duration,
        /// Tasks that were still unresolved at the deadline.
        stuck: Vec<TaskId>,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::PoolError;
    ///
    /// let err = PoolError::QueueFull { capacity: 8 };
    /// assert_eq!(err.as_label(), "pool_queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::QueueFull { .. } => "pool_queue_full",
            PoolError::Closed => "pool_closed",
            PoolError::CrashBudgetExceeded { .. } => "pool_crash_budget_exceeded",
            PoolError::InvalidConfig { .. } => "pool_invalid_config",
            PoolError::ShutdownTimeout { .. } => "pool_shutdown_timeout",
        }
    }
}

/// # Errors produced by a handler attempt.
///
/// Returned by [`Handler::call`](crate::Handler::call) (or synthesized by the runner for
/// timeouts and panics). Some are retryable (`Fail`, `Timeout`, `Panicked`), others are final.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Attempt exceeded its timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable failure (never retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Attempt failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The handler panicked; the panic was caught by the worker.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The handler observed cancellation and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use poolvisor::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Indicates whether another attempt may succeed.
    ///
    /// # Example
    /// ```
    /// use poolvisor::TaskError;
    ///
    /// assert!(TaskError::Fail { error: "boom".into() }.is_retryable());
    /// assert!(!TaskError::Fatal { error: "nope".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Fail { .. } | TaskError::Timeout { .. } | TaskError::Panicked { .. }
        )
    }
}

/// # Terminal error of a submitted task.
///
/// Exactly one of these (or a success value) is delivered through each
/// [`PendingResult`](crate::PendingResult).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The task's own work failed and no attempts are left.
    #[error("task failed after {attempts} attempt(s): {error}")]
    Failed {
        /// Last failure message.
        error: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The last attempt exceeded the task timeout.
    #[error("task timed out after {timeout:?} ({attempts} attempt(s))")]
    TimedOut {
        /// The timeout that was exceeded.
        timeout: Duration,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The task's own deadline passed before it could finish.
    #[error("task deadline exceeded")]
    DeadlineExceeded,

    /// The task was still queued or running when the shutdown grace elapsed.
    #[error("task did not finish within the shutdown deadline")]
    ShutdownTimeout,

    /// The task was abandoned because the pool ran out of its crash budget.
    #[error("pool degraded: crash budget exceeded")]
    PoolDegraded,

    /// The task was dropped by the runtime without a resolution.
    #[error("task abandoned by the runtime")]
    Abandoned,
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Failed { .. } => "job_failed",
            JobError::TimedOut { .. } => "job_timed_out",
            JobError::DeadlineExceeded => "job_deadline_exceeded",
            JobError::ShutdownTimeout => "job_shutdown_timeout",
            JobError::PoolDegraded => "job_pool_degraded",
            JobError::Abandoned => "job_abandoned",
        }
    }

    /// Maps the final handler error of a task into its terminal error.
    pub(crate) fn from_final(err: TaskError, attempts: u32) -> Self {
        match err {
            TaskError::Timeout { timeout } => JobError::TimedOut { timeout, attempts },
            other => JobError::Failed {
                error: other.to_string(),
                attempts,
            },
        }
    }
}
